//! Process-wide `tracing` setup for the CLI and for embedders that want the
//! crate's events on stderr.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The filter directive did not parse.
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter {
        /// Directive as given.
        filter: String,
        /// Parser message.
        message: String,
    },
    /// A global subscriber is already installed.
    #[error("logging already initialized")]
    AlreadyInitialized,
}

/// Installs a fmt subscriber filtered by `filter` (`EnvFilter` syntax, e.g.
/// `"info"` or `"sqlstage::stage=debug"`), writing to stderr.
pub fn init_logging(filter: &str) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_new(filter).map_err(|e| LoggingError::InvalidFilter {
        filter: filter.to_string(),
        message: e.to_string(),
    })?;
    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)
}
