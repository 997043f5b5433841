//! Error types for the bridge framework.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures raised while loading a bridge or talking to the broker.
///
/// Configuration variants end the process at startup; bus variants are
/// reported per operation and never stop the bridge loop.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Settings rejected outside of file loading (logging, session options).
    #[error("Invalid bridge setup: {0}")]
    Config(String),

    #[error("Config file {path} does not exist")]
    ConfigNotFound { path: String },

    #[error("Config file is not valid JSON5: {0}")]
    ConfigParse(String),

    #[error("Config rejected: {0}")]
    ConfigValidation(String),

    /// The MQTT client request queue refused a request.
    #[error("MQTT request failed: {0}")]
    Mqtt(String),

    #[error("Cannot encode payload: {0}")]
    Serialization(String),

    #[error("Publish on {topic} failed: {message}")]
    Publish { topic: String, message: String },

    #[error("Subscribe to {filter} failed: {message}")]
    Subscribe { filter: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }
}

impl From<plcgate_common::Error> for BridgeError {
    fn from(err: plcgate_common::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        Self::Mqtt(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<json5::Error> for BridgeError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}
