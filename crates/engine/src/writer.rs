//! Chunked output through the registered write callback.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use gifstream_common::error::StatusCode;

use crate::ffi::{Registered, WriteCallback};

/// Chunks larger than this are emitted before the frame is complete.
const MAX_CHUNK_BYTES: usize = 64 * 1024;

/// Output state shared between the GIF encoder and the worker.
pub(crate) struct CallbackOutput {
    callback: Registered<WriteCallback>,
    pending: Vec<u8>,
    failure: Option<StatusCode>,
    chunks_emitted: u64,
}

impl CallbackOutput {
    pub fn new(callback: Registered<WriteCallback>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            callback,
            pending: Vec::with_capacity(MAX_CHUNK_BYTES),
            failure: None,
            chunks_emitted: 0,
        }))
    }

    /// Hand everything buffered so far to the write callback as one chunk.
    pub fn emit(&mut self) -> Result<(), StatusCode> {
        if let Some(code) = self.failure {
            return Err(code);
        }
        if self.pending.is_empty() {
            return Ok(());
        }

        let status = self.callback.write(&self.pending);
        let len = self.pending.len();
        self.pending.clear();

        if status != StatusCode::OK {
            tracing::debug!(status, len, "Write callback rejected chunk; aborting output");
            self.failure = Some(StatusCode::Aborted);
            return Err(StatusCode::Aborted);
        }

        self.chunks_emitted += 1;
        tracing::trace!(len, chunk = self.chunks_emitted, "Chunk delivered");
        Ok(())
    }

    /// Stop all further output, discarding anything buffered.
    pub fn abort(&mut self) {
        self.pending.clear();
        self.failure.get_or_insert(StatusCode::Aborted);
    }

    pub fn failure(&self) -> Option<StatusCode> {
        self.failure
    }
}

/// `io::Write` adapter handed to the GIF encoder.
#[derive(Clone)]
pub(crate) struct CallbackWriter(pub Rc<RefCell<CallbackOutput>>);

impl Write for CallbackWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut output = self.0.borrow_mut();
        if output.failure.is_some() {
            return Err(io::Error::other("output callback aborted"));
        }
        output.pending.extend_from_slice(buf);
        if output.pending.len() >= MAX_CHUNK_BYTES {
            output
                .emit()
                .map_err(|code| io::Error::other(code.to_string()))?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0
            .borrow_mut()
            .emit()
            .map_err(|code| io::Error::other(code.to_string()))
    }
}
