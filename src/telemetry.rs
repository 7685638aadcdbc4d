//! Logging setup for the `hms` binary

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{HmsError, Result};

/// Install the global subscriber; `RUST_LOG` overrides the configured level
///
/// Logs go to stderr so result documents on stdout stay machine-readable.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            HmsError::Config(format!("Invalid log level '{}': {}", config.level, e))
        })?,
    };

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| HmsError::Config(format!("Failed to install logger: {}", e)))
}
