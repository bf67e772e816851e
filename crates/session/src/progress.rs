//! Progress notifier and the consumer-facing progress stream.
//!
//! Each progress callback from the engine publishes the session's
//! running callback count, not a frame identity: the first callback is
//! event 0, the second event 1, and so on, regardless of which frame
//! the engine just completed.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use gifstream_common::config::ProgressDelivery;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Notification that the engine finished processing one more frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressEvent {
    /// Number of progress callbacks received before this one.
    pub frame_index: u32,
}

/// An event in flight. For blocking delivery the publisher waits until
/// the acknowledgement sender is dropped, which happens when the
/// consumer takes the envelope out of the channel.
struct Envelope {
    event: ProgressEvent,
    _ack: Option<oneshot::Sender<()>>,
}

/// Create a notifier/stream pair for one session.
pub(crate) fn channel(delivery: ProgressDelivery) -> (ProgressNotifier, ProgressStream) {
    let capacity = match delivery {
        ProgressDelivery::Blocking => 1,
        ProgressDelivery::Buffered { capacity } | ProgressDelivery::Lossy { capacity } => {
            capacity.max(1)
        }
    };
    let (tx, rx) = mpsc::channel(capacity);
    let notifier = ProgressNotifier {
        delivery,
        next_index: AtomicU32::new(0),
        published: AtomicU64::new(0),
        dropped: AtomicU64::new(0),
        tx: Mutex::new(Some(tx)),
    };
    (notifier, ProgressStream { rx: Some(rx) })
}

/// Publishes engine progress callbacks into the session's stream.
pub(crate) struct ProgressNotifier {
    delivery: ProgressDelivery,
    next_index: AtomicU32,
    published: AtomicU64,
    dropped: AtomicU64,
    tx: Mutex<Option<mpsc::Sender<Envelope>>>,
}

impl ProgressNotifier {
    /// Called on the engine's worker thread, once per progress callback.
    ///
    /// Must not be called from inside an async runtime context.
    pub fn notify(&self) {
        let frame_index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let event = ProgressEvent { frame_index };

        let Some(tx) = self.sender() else {
            tracing::debug!(frame_index, "Progress stream already closed");
            return;
        };

        let delivered = match self.delivery {
            ProgressDelivery::Blocking => {
                let (ack, acked) = oneshot::channel();
                let envelope = Envelope {
                    event,
                    _ack: Some(ack),
                };
                if tx.blocking_send(envelope).is_ok() {
                    // Resolves once the consumer has taken the envelope.
                    let _ = acked.blocking_recv();
                    true
                } else {
                    false
                }
            }
            ProgressDelivery::Buffered { .. } => tx
                .blocking_send(Envelope { event, _ack: None })
                .is_ok(),
            ProgressDelivery::Lossy { .. } => match tx.try_send(Envelope { event, _ack: None }) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(frame_index, "Progress buffer full; event dropped");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
        };

        if delivered {
            self.published.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(frame_index, "Progress event published");
        }
    }

    /// Close the stream. Consumers see end-of-stream after draining.
    pub fn close(&self) {
        let closed = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if closed.is_some() {
            tracing::debug!(
                published = self.published(),
                dropped = self.dropped.load(Ordering::Relaxed),
                "Progress stream closed"
            );
        }
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn sender(&self) -> Option<mpsc::Sender<Envelope>> {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Ordered, single-consumer stream of progress events.
///
/// Ends once the session has finished and every queued event was read.
/// Use [`ProgressStream::recv`] from async code and
/// [`ProgressStream::blocking_recv`] (or the `Iterator` impl) from a
/// plain thread.
pub struct ProgressStream {
    rx: Option<mpsc::Receiver<Envelope>>,
}

impl ProgressStream {
    /// A stream that is already at its end.
    pub(crate) fn closed() -> Self {
        Self { rx: None }
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        let rx = self.rx.as_mut()?;
        rx.recv().await.map(|envelope| envelope.event)
    }

    /// Wait for the next event on a thread outside any async runtime.
    pub fn blocking_recv(&mut self) -> Option<ProgressEvent> {
        let rx = self.rx.as_mut()?;
        rx.blocking_recv().map(|envelope| envelope.event)
    }

    /// Take an event if one is ready.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        let rx = self.rx.as_mut()?;
        rx.try_recv().ok().map(|envelope| envelope.event)
    }

    /// Whether this stream was never connected to a notifier.
    pub fn is_detached(&self) -> bool {
        self.rx.is_none()
    }
}

impl Iterator for ProgressStream {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.blocking_recv()
    }
}

impl std::fmt::Debug for ProgressStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStream")
            .field("detached", &self.is_detached())
            .finish()
    }
}
