//! gifstream Engine
//!
//! The boundary between the session layer and a callback-driven GIF
//! engine. The contract is shaped like a C library: the engine owns its
//! own worker thread, and reports output and progress by calling plain
//! `extern "C"` function pointers with an opaque `user_data` value.
//!
//! ```text
//!  caller thread                 engine worker thread
//!  ─────────────                 ────────────────────
//!  add_frame_rgba ──frame──▶  resize ─▶ quantize ─▶ progress cb
//!        ▲                                  │
//!        └────────status─────────  write frames ─▶ write cb
//! ```
//!
//! [`GifEngine`] is the bundled implementation. Anything else that
//! implements [`NativeEngine`] (for example a binding to a system
//! library) can be driven by the session layer unchanged.

pub mod ffi;
pub mod gif_engine;
mod worker;
mod writer;

pub use ffi::{ProgressCallback, WriteCallback, PROGRESS_ABORT, PROGRESS_CONTINUE};
pub use gif_engine::GifEngine;

use gifstream_common::config::EncoderSettings;
use libc::{c_int, c_void};

/// Engine-level settings, laid out the way the native API takes them.
///
/// Zero means "unset" for the dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Resize to this width if non-zero.
    pub width: u32,
    /// Resize to this height if `width` is non-zero. Aspect ratio is not preserved.
    pub height: u32,
    /// 1-100.
    pub quality: u8,
    /// Disable looping.
    pub once: bool,
    /// Lower quality, faster encode.
    pub fast: bool,
}

impl From<&EncoderSettings> for EngineSettings {
    fn from(settings: &EncoderSettings) -> Self {
        Self {
            width: settings.width.unwrap_or(0),
            height: settings.height.unwrap_or(0),
            quality: settings.quality,
            once: !settings.looping,
            fast: settings.fast,
        }
    }
}

/// Trait for a callback-driven encoding engine.
///
/// Every fallible call returns a raw status code (see
/// [`gifstream_common::StatusCode`]). Callbacks may be invoked from a
/// thread the engine owns, but only while `add_frame_rgba` or `finish`
/// is running. After `finish` returns, no callback fires again.
///
/// Implementations are not required to be reentrant: callers must not
/// invoke two methods concurrently.
pub trait NativeEngine: Send + Sized {
    /// Allocate an engine. `None` means the engine refused the settings.
    fn create(settings: &EngineSettings) -> Option<Self>;

    /// Register the output callback. Must happen before the first frame.
    fn set_write_callback(&mut self, callback: WriteCallback, user_data: *mut c_void) -> c_int;

    /// Register the progress callback. Must happen before the first frame.
    fn set_progress_callback(&mut self, callback: ProgressCallback, user_data: *mut c_void);

    /// Submit one RGBA8 frame. Blocks while the engine processes it.
    fn add_frame_rgba(
        &mut self,
        index: u32,
        width: u32,
        height: u32,
        pixels: &[u8],
        timestamp: f64,
    ) -> c_int;

    /// Flush all buffered output and release the engine.
    fn finish(self) -> c_int;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_encoder_settings() {
        let settings = EncoderSettings {
            width: Some(320),
            height: None,
            quality: 80,
            looping: false,
            fast: true,
            ..EncoderSettings::default()
        };
        let engine = EngineSettings::from(&settings);
        assert_eq!(engine.width, 320);
        assert_eq!(engine.height, 0);
        assert_eq!(engine.quality, 80);
        assert!(engine.once);
        assert!(engine.fast);
    }
}
