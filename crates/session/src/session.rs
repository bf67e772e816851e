//! Encoding session management.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gifstream_common::config::EncoderSettings;
use gifstream_common::error::{GifstreamError, GifstreamResult, StatusCode};
use gifstream_engine::{EngineSettings, GifEngine, NativeEngine};

use crate::frame::Frame;
use crate::output::OutputBridge;
use crate::progress::{self, ProgressStream};
use crate::registry::{self, SessionBridges, Token};

/// State of an encoding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Engine allocated, callbacks not yet registered. `open` completes
    /// this phase before returning, so callers never observe it.
    Created,
    /// Accepting frames.
    Active,
    /// Finished; every further operation fails.
    Finished,
}

/// Runtime statistics for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames the engine accepted.
    pub frames_submitted: u64,

    /// Bytes delivered to the sink.
    pub bytes_written: u64,

    /// Progress events handed to the stream.
    pub progress_events: u64,
}

/// Session over the bundled GIF engine.
pub type GifSession = Session<GifEngine>;

/// Open a session over the bundled GIF engine.
pub fn open<W>(settings: EncoderSettings, sink: W) -> GifstreamResult<GifSession>
where
    W: Write + Send + 'static,
{
    GifSession::open(settings, sink)
}

/// One encode-to-completion lifecycle over a native engine.
///
/// All methods take `&self`; engine calls are serialized internally, so a
/// session can be shared across threads behind an `Arc`.
pub struct Session<E: NativeEngine = GifEngine> {
    settings: EncoderSettings,
    inner: Mutex<SessionInner<E>>,
    bridges: Arc<SessionBridges>,
    progress: Mutex<Option<ProgressStream>>,
}

struct SessionInner<E> {
    state: SessionState,
    engine: Option<E>,
    token: Option<Token>,
    frames_submitted: u64,
}

impl<E: NativeEngine> Session<E> {
    /// Allocate the engine and bind the output (and optionally progress)
    /// bridges to it.
    ///
    /// On any failure the engine is finalized and the registration
    /// released before the error is returned.
    pub fn open<W>(settings: EncoderSettings, sink: W) -> GifstreamResult<Self>
    where
        W: Write + Send + 'static,
    {
        let engine_settings = EngineSettings::from(&settings);
        let mut engine = E::create(&engine_settings).ok_or_else(|| {
            GifstreamError::engine_init(format!("engine refused settings {engine_settings:?}"))
        })?;

        let (notifier, stream) = if settings.report_progress {
            let (notifier, stream) = progress::channel(settings.progress_delivery);
            (Some(notifier), Some(stream))
        } else {
            (None, None)
        };

        let bridges = Arc::new(SessionBridges {
            output: OutputBridge::new(Box::new(sink)),
            progress: notifier,
        });
        let token = registry::register(Arc::clone(&bridges));

        let status = engine.set_write_callback(registry::write_trampoline, token.as_user_data());
        if let Err(err) = GifstreamError::check(status) {
            tracing::warn!(error = %err, "Write callback registration failed; releasing engine");
            let finish_status = StatusCode::from_raw(engine.finish());
            if !finish_status.is_success() {
                tracing::warn!(status = %finish_status, "Engine finish after failed open");
            }
            bridges.close_progress();
            registry::release(token);
            return Err(err);
        }

        if bridges.progress.is_some() {
            engine.set_progress_callback(registry::progress_trampoline, token.as_user_data());
        }

        tracing::info!(
            quality = settings.quality,
            width = ?settings.width,
            height = ?settings.height,
            report_progress = settings.report_progress,
            "Encoding session opened"
        );

        Ok(Self {
            settings,
            inner: Mutex::new(SessionInner {
                state: SessionState::Active,
                engine: Some(engine),
                token: Some(token),
                frames_submitted: 0,
            }),
            bridges,
            progress: Mutex::new(stream),
        })
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    /// Settings the session was opened with.
    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Submit one frame and wait for the engine to process it.
    ///
    /// Output for the frame may be written to the sink, and a progress
    /// event published, before this returns. With blocking progress
    /// delivery this call stalls until the progress stream is read.
    pub fn add_frame(&self, frame: &Frame) -> GifstreamResult<()> {
        let mut inner = self.lock_inner();
        if inner.state != SessionState::Active {
            return Err(GifstreamError::invalid_state("add_frame called after finish"));
        }
        frame.validate()?;

        let Some(engine) = inner.engine.as_mut() else {
            return Err(GifstreamError::invalid_state("engine already released"));
        };
        let status = engine.add_frame_rgba(
            frame.index,
            frame.width,
            frame.height,
            &frame.pixels,
            frame.timestamp,
        );
        if let Err(err) = GifstreamError::check(status) {
            tracing::debug!(index = frame.index, error = %err, "Engine rejected frame");
            return Err(err);
        }

        inner.frames_submitted += 1;
        tracing::debug!(index = frame.index, timestamp = frame.timestamp, "Frame submitted");
        Ok(())
    }

    /// Take the progress stream.
    ///
    /// Single consumer: the first call gets the live stream, later calls
    /// (and sessions opened without `report_progress`) get an empty one.
    pub fn progress_stream(&self) -> ProgressStream {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_else(ProgressStream::closed)
    }

    /// Flush remaining output, release the engine and close the progress
    /// stream. Terminal: a second call fails with an invalid-state error.
    pub fn finish(&self) -> GifstreamResult<()> {
        let mut inner = self.lock_inner();
        if inner.state == SessionState::Finished {
            return Err(GifstreamError::invalid_state("finish called twice"));
        }
        let result = Self::teardown(&mut inner, &self.bridges);
        tracing::info!(
            frames = inner.frames_submitted,
            bytes = self.bridges.output.bytes_written(),
            ok = result.is_ok(),
            "Encoding session finished"
        );
        result
    }

    /// Session statistics so far.
    pub fn stats(&self) -> SessionStats {
        let frames_submitted = self.lock_inner().frames_submitted;
        SessionStats {
            frames_submitted,
            bytes_written: self.bridges.output.bytes_written(),
            progress_events: self
                .bridges
                .progress
                .as_ref()
                .map(|p| p.published())
                .unwrap_or(0),
        }
    }

    /// Finalize the engine, then close progress, then drop the registration.
    fn teardown(inner: &mut SessionInner<E>, bridges: &SessionBridges) -> GifstreamResult<()> {
        inner.state = SessionState::Finished;

        // The engine fires no callbacks once finish returns.
        let status = inner
            .engine
            .take()
            .map(|engine| engine.finish())
            .unwrap_or(StatusCode::OK);

        bridges.close_progress();
        if let Some(token) = inner.token.take() {
            registry::release(token);
        }

        let flushed = bridges.output.flush();
        GifstreamError::check(status)?;
        flushed?;
        Ok(())
    }

    fn lock_inner(&self) -> MutexGuard<'_, SessionInner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn token(&self) -> Option<Token> {
        self.lock_inner().token
    }
}

impl<E: NativeEngine + 'static> Session<E> {
    /// Async wrapper around [`Session::add_frame`] for tokio callers.
    pub async fn add_frame_async(self: &Arc<Self>, frame: Frame) -> GifstreamResult<()> {
        let session = Arc::clone(self);
        tokio::task::spawn_blocking(move || session.add_frame(&frame))
            .await
            .map_err(|e| GifstreamError::Other(anyhow::Error::new(e)))?
    }

    /// Async wrapper around [`Session::finish`] for tokio callers.
    pub async fn finish_async(self: &Arc<Self>) -> GifstreamResult<()> {
        let session = Arc::clone(self);
        tokio::task::spawn_blocking(move || session.finish())
            .await
            .map_err(|e| GifstreamError::Other(anyhow::Error::new(e)))?
    }
}

impl<E: NativeEngine> Drop for Session<E> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.state != SessionState::Finished {
            tracing::warn!("Session dropped without finish; finalizing");
            if let Err(e) = Self::teardown(inner, &self.bridges) {
                tracing::warn!(error = %e, "Implicit finish failed");
            }
        }
    }
}
