//! gifstream Common Utilities
//!
//! Shared infrastructure for all gifstream crates:
//! - Engine status taxonomy, error types and result aliases
//! - Encoder and logging configuration
//! - Tracing/logging initialization

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
