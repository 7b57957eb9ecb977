//! Errors from the shared utilities

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Log level or `RUST_LOG` directive that does not parse
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidLogFilter { filter: String, reason: String },

    /// A global subscriber was installed earlier in this process
    #[error("logging already initialized: {0}")]
    LoggingInitialized(String),
}

pub type Result<T> = std::result::Result<T, Error>;
