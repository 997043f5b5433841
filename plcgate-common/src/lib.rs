//! plcgate Common Library
//!
//! This crate provides shared types and utilities for plcgate fieldbus bridges:
//!
//! - [`config`] - Broker and logging configuration sections
//! - [`session`] - MQTT client construction
//! - [`topics`] - Topic builders, discovery topics and identifier slugs
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod session;
pub mod topics;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, MqttConfig};
pub use error::{Error, Result};
pub use session::{REQUEST_CHANNEL_CAPACITY, Will, connect, mqtt_options};
pub use topics::{
    AVAILABILITY_TOPIC, DISCOVERY_PREFIX, PAYLOAD_OFFLINE, PAYLOAD_ONLINE, TOPIC_PREFIX,
    TopicBuilder, discovery_topic, slugify,
};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// # Example
///
/// ```ignore
/// use plcgate_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Tracing(e.to_string()))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Tracing(e.to_string()))?;
        }
    }

    Ok(())
}
