use thiserror::Error;

/// Common error type for plcgate components.
#[derive(Debug, Error)]
pub enum Error {
    /// Unusable connection or logging settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The global tracing subscriber could not be installed.
    #[error("Failed to initialize tracing: {0}")]
    Tracing(String),
}

/// Result type alias using plcgate's Error.
pub type Result<T> = std::result::Result<T, Error>;
