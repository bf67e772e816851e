//! Output sink bridge.
//!
//! The engine hands over each chunk on its worker thread and waits for a
//! status before it continues, so every chunk is written to the sink in
//! full before the callback returns.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gifstream_common::error::StatusCode;

/// Forwards engine output chunks to the caller's sink.
pub(crate) struct OutputBridge {
    sink: Mutex<Box<dyn Write + Send>>,
    bytes_written: AtomicU64,
    chunks: AtomicU64,
}

impl OutputBridge {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(sink),
            bytes_written: AtomicU64::new(0),
            chunks: AtomicU64::new(0),
        }
    }

    /// Write one chunk, resuming short writes from where they stopped.
    ///
    /// Any sink error is reported as [`StatusCode::Other`], which makes
    /// the engine abort the operation in flight.
    pub fn deliver(&self, chunk: &[u8]) -> StatusCode {
        if chunk.is_empty() {
            return StatusCode::Success;
        }

        let mut sink = self.lock_sink();
        let mut written = 0;
        while written < chunk.len() {
            match sink.write(&chunk[written..]) {
                Ok(0) => {
                    tracing::warn!(written, len = chunk.len(), "Sink accepted zero bytes");
                    return StatusCode::Other;
                }
                Ok(n) => written += n,
                Err(e) => {
                    tracing::warn!(error = %e, written, len = chunk.len(), "Sink write failed");
                    return StatusCode::Other;
                }
            }
        }

        self.bytes_written
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        let chunks = self.chunks.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(len = chunk.len(), chunks, "Chunk forwarded to sink");
        StatusCode::Success
    }

    pub fn flush(&self) -> io::Result<()> {
        self.lock_sink().flush()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    fn lock_sink(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A sink the caller can keep a handle on while a session writes to it.
///
/// Clones share the same underlying writer.
#[derive(Debug, Default)]
pub struct SharedSink<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for SharedSink<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W> SharedSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Run `f` with exclusive access to the writer.
    pub fn with<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Recover the writer once no other handle remains.
    pub fn try_into_inner(self) -> Result<W, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => Ok(mutex.into_inner().unwrap_or_else(PoisonError::into_inner)),
            Err(inner) => Err(Self { inner }),
        }
    }
}

impl SharedSink<Vec<u8>> {
    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.with(|buf| buf.clone())
    }
}

impl<W: Write> Write for SharedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with(|w| w.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with(|w| w.flush())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Accepts at most `limits[i]` bytes on the i-th call (cycling).
    struct ShortWriter {
        limits: Vec<usize>,
        calls: usize,
        data: Vec<u8>,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let limit = self.limits[self.calls % self.limits.len()];
            self.calls += 1;
            let n = limit.min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct StalledWriter;

    impl Write for StalledWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let bridge = OutputBridge::new(Box::new(FailingWriter));
        assert_eq!(bridge.deliver(&[]), StatusCode::Success);
        assert_eq!(bridge.bytes_written(), 0);
    }

    #[test]
    fn test_write_error_reports_other() {
        let bridge = OutputBridge::new(Box::new(FailingWriter));
        assert_eq!(bridge.deliver(b"GIF89a"), StatusCode::Other);
        assert_eq!(bridge.bytes_written(), 0);
    }

    #[test]
    fn test_zero_length_write_reports_other() {
        let bridge = OutputBridge::new(Box::new(StalledWriter));
        assert_eq!(bridge.deliver(b"GIF89a"), StatusCode::Other);
    }

    #[test]
    fn test_chunks_append_in_order() {
        let sink = SharedSink::new(Vec::<u8>::new());
        let bridge = OutputBridge::new(Box::new(sink.clone()));
        assert_eq!(bridge.deliver(b"abc"), StatusCode::Success);
        assert_eq!(bridge.deliver(b"def"), StatusCode::Success);
        assert_eq!(sink.contents(), b"abcdef");
        assert_eq!(bridge.bytes_written(), 6);
    }

    #[test]
    fn test_shared_sink_recovers_writer() {
        let sink = SharedSink::new(Vec::<u8>::new());
        let handle = sink.clone();
        let sink = sink.try_into_inner().unwrap_err();
        drop(handle);
        assert!(sink.try_into_inner().unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn short_writes_resume_at_the_right_offset(
            chunk in proptest::collection::vec(any::<u8>(), 1..512),
            limits in proptest::collection::vec(1usize..17, 1..8),
        ) {
            let writer = SharedSink::new(ShortWriter { limits, calls: 0, data: Vec::new() });
            let bridge = OutputBridge::new(Box::new(writer.clone()));
            prop_assert_eq!(bridge.deliver(&chunk), StatusCode::Success);
            let recorded = writer.with(|w| w.data.clone());
            prop_assert_eq!(recorded, chunk);
        }
    }
}
