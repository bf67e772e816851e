//! Token registry and the `extern "C"` trampolines handed to the engine.
//!
//! The engine only carries an opaque `user_data` value back into its
//! callbacks. Sessions register their bridges here under a small integer
//! token and pass that token as `user_data`; the trampolines resolve it
//! back to the bridges. No Rust object address crosses the boundary.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use gifstream_common::error::StatusCode;
use gifstream_engine::PROGRESS_CONTINUE;
use libc::{c_int, c_void, size_t};

use crate::output::OutputBridge;
use crate::progress::ProgressNotifier;

/// Everything the engine's callbacks need from one session.
pub(crate) struct SessionBridges {
    pub output: OutputBridge,
    pub progress: Option<ProgressNotifier>,
}

impl SessionBridges {
    pub fn close_progress(&self) {
        if let Some(progress) = &self.progress {
            progress.close();
        }
    }
}

/// Registry key passed to the engine as `user_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Token(NonZeroUsize);

impl Token {
    pub fn as_user_data(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    pub fn from_user_data(user_data: *mut c_void) -> Option<Self> {
        NonZeroUsize::new(user_data as usize).map(Self)
    }
}

type Registry = Mutex<HashMap<Token, Arc<SessionBridges>>>;

static NEXT_TOKEN: AtomicUsize = AtomicUsize::new(1);

fn registry() -> MutexGuard<'static, HashMap<Token, Arc<SessionBridges>>> {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Insert a session's bridges and return its token.
pub(crate) fn register(bridges: Arc<SessionBridges>) -> Token {
    let raw = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    // Tokens start at 1; a wrap past usize::MAX skips zero.
    let token = Token(NonZeroUsize::new(raw).unwrap_or(NonZeroUsize::MIN));
    registry().insert(token, bridges);
    tracing::trace!(token = raw, "Session bridges registered");
    token
}

/// Resolve a token. The registry lock is released before returning.
pub(crate) fn lookup(token: Token) -> Option<Arc<SessionBridges>> {
    registry().get(&token).cloned()
}

/// Remove a session's entry. Returns the bridges if they were present.
pub(crate) fn release(token: Token) -> Option<Arc<SessionBridges>> {
    let released = registry().remove(&token);
    if released.is_some() {
        tracing::trace!(token = token.0.get(), "Session bridges released");
    }
    released
}

#[cfg(test)]
pub(crate) fn is_registered(token: Token) -> bool {
    registry().contains_key(&token)
}

/// Output callback registered with the engine.
///
/// # Safety
///
/// `buffer` must be valid for reads of `buffer_length` bytes for the
/// duration of the call.
pub(crate) unsafe extern "C" fn write_trampoline(
    buffer_length: size_t,
    buffer: *const u8,
    user_data: *mut c_void,
) -> c_int {
    if buffer_length == 0 {
        return StatusCode::OK;
    }
    if buffer.is_null() {
        return StatusCode::NullArgument.to_raw();
    }
    let Some(bridges) = Token::from_user_data(user_data).and_then(lookup) else {
        tracing::warn!("Write callback for an unregistered session");
        return StatusCode::InvalidState.to_raw();
    };

    let chunk = std::slice::from_raw_parts(buffer, buffer_length);
    // Unwinding into the engine is undefined behaviour; convert to a status.
    match panic::catch_unwind(AssertUnwindSafe(|| bridges.output.deliver(chunk))) {
        Ok(status) => status.to_raw(),
        Err(_) => {
            tracing::warn!("Output bridge panicked");
            StatusCode::Other.to_raw()
        }
    }
}

/// Progress callback registered with the engine. Always asks it to continue.
pub(crate) unsafe extern "C" fn progress_trampoline(user_data: *mut c_void) -> c_int {
    let Some(bridges) = Token::from_user_data(user_data).and_then(lookup) else {
        tracing::warn!("Progress callback for an unregistered session");
        return PROGRESS_CONTINUE;
    };
    let Some(progress) = bridges.progress.as_ref() else {
        return PROGRESS_CONTINUE;
    };

    if panic::catch_unwind(AssertUnwindSafe(|| progress.notify())).is_err() {
        tracing::warn!("Progress notifier panicked");
    }
    PROGRESS_CONTINUE
}
