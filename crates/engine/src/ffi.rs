//! C ABI callback shapes.

use libc::{c_int, c_void, size_t};

/// Receives one chunk of encoded output.
///
/// Returns `0` to continue; any other value aborts the engine.
pub type WriteCallback =
    unsafe extern "C" fn(buffer_length: size_t, buffer: *const u8, user_data: *mut c_void) -> c_int;

/// Signals that one more frame has been processed.
///
/// Returns [`PROGRESS_CONTINUE`] to continue or [`PROGRESS_ABORT`] to abort.
pub type ProgressCallback = unsafe extern "C" fn(user_data: *mut c_void) -> c_int;

pub const PROGRESS_CONTINUE: c_int = 1;
pub const PROGRESS_ABORT: c_int = 0;

/// A registered callback together with its `user_data`.
///
/// The engine never dereferences `user_data`; it only hands it back.
#[derive(Clone, Copy)]
pub(crate) struct Registered<F> {
    pub callback: F,
    pub user_data: *mut c_void,
}

// SAFETY: `user_data` is an opaque value owned by whoever registered the
// callback; the engine only passes it back through the callback.
unsafe impl<F: Send> Send for Registered<F> {}

impl Registered<WriteCallback> {
    pub fn write(&self, chunk: &[u8]) -> c_int {
        // SAFETY: `chunk` is valid for `chunk.len()` bytes for the duration
        // of the call, which is all the callback contract allows it to assume.
        unsafe { (self.callback)(chunk.len(), chunk.as_ptr(), self.user_data) }
    }
}

impl Registered<ProgressCallback> {
    pub fn notify(&self) -> c_int {
        // SAFETY: the callback only receives the `user_data` it registered with.
        unsafe { (self.callback)(self.user_data) }
    }
}
