//! Logging via the tracing crate.

use std::io;

use serde::{Deserialize, Serialize};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;

/// Logging configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Output format for the log.
    format: LoggingFormat,
}

/// Logging output format.
///
/// Defaults to "text".
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
enum LoggingFormat {
    /// Text format.
    #[default]
    Text,
    /// JSON format.
    Json,
}

/// Initializes the global tracing subscriber.
///
/// This function should only be called once during the lifetime of the
/// application; the installed logger is global.  The filter is taken from
/// the standard `RUST_LOG` environment variable.
pub fn init_with_config(config: &LoggingConfig) -> Result<(), SetGlobalDefaultError> {
    match config.format {
        LoggingFormat::Text => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_writer(io::stdout)
                .with_env_filter(EnvFilter::from_default_env())
                .finish(),
        ),
        LoggingFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_writer(io::stdout)
                .with_env_filter(EnvFilter::from_default_env())
                .json()
                .finish(),
        ),
    }
}

/// Initializes logging with the default configuration.
pub fn init() -> Result<(), SetGlobalDefaultError> {
    init_with_config(&LoggingConfig::default())
}
