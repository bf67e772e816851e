//! Tracing subscriber setup.
//!
//! Engine callbacks log from the encoder worker thread inside an
//! `encoder` span, so the subscriber records thread names and, for JSON
//! output, the current span.

use crate::config::LoggingConfig;

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.level`. Returns `false` if a
/// global subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(true);

    let installed = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.compact().try_init()
    };
    if let Err(e) = &installed {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
    installed.is_ok()
}

/// Install the default subscriber (info level, human-readable).
pub fn init_default_logging() -> bool {
    init_logging(&LoggingConfig::default())
}
