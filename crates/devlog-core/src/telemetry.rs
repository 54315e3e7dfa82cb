//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events; binaries and tests that want
//! to see them call [`init_tracing`] once at startup.

use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, LoggingConfig};

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Installing a
/// second subscriber is reported as an error instead of panicking.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|_| ConfigError::InvalidValue {
            key: "LOG_LEVEL".to_string(),
            value: config.level.clone(),
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    let installed = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ConfigError::Telemetry(e.to_string()))
}
