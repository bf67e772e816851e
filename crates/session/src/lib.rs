//! gifstream Session
//!
//! Drives a callback-driven GIF engine from ordinary Rust code. The
//! engine pushes output and progress from its own worker thread; this
//! crate turns those pushes into writes against a caller-supplied sink
//! and an ordered, pull-based progress stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                    Session                       │
//! │   add_frame ─▶ NativeEngine ─▶ (worker thread)   │
//! │                     │               │            │
//! │            write cb │               │ progress cb│
//! │                     ▼               ▼            │
//! │   ┌──────────────── token registry ───────────┐  │
//! │   │  OutputBridge            ProgressNotifier │  │
//! │   └──────┬───────────────────────────┬────────┘  │
//! └──────────┼───────────────────────────┼───────────┘
//!            ▼                           ▼
//!       caller's sink              ProgressStream
//! ```
//!
//! # Progress backpressure
//!
//! With the default [`ProgressDelivery::Blocking`] policy, each progress
//! event blocks the engine worker until the consumer takes it. A session
//! opened with `report_progress` must therefore have its
//! [`ProgressStream`] drained (or dropped), otherwise `add_frame` stalls.

pub mod frame;
pub mod output;
pub mod progress;
mod registry;
pub mod session;

#[cfg(test)]
mod testing;

pub use frame::Frame;
pub use output::SharedSink;
pub use progress::{ProgressEvent, ProgressStream};
pub use session::*;

pub use gifstream_common::config::{EncoderSettings, ProgressDelivery};
pub use gifstream_common::error::{GifstreamError, GifstreamResult, StatusCode};
pub use gifstream_engine::{GifEngine, NativeEngine};
