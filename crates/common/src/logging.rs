//! Logging setup shared by the portal and relay binaries

use crate::{Error, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `default_level`. Output goes to stderr so
/// CLI subcommands can print results on stdout.
pub fn setup_logging(default_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level).map_err(|e| Error::InvalidLogFilter {
            filter: default_level.to_string(),
            reason: e.to_string(),
        })?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|e| Error::LoggingInitialized(e.to_string()))
}
