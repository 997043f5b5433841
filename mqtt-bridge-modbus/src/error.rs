//! Recoverable gateway errors.

use thiserror::Error;

use crate::transport::TransportError;

/// Failures that make the device count as unreachable.
///
/// Both variants are routed to the availability monitor; neither ends the
/// process.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A read or write failed or timed out.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(#[from] TransportError),

    /// The device returned a window of the wrong width.
    #[error("Group '{group}': expected {expected} values, got {actual}")]
    DataLengthMismatch {
        group: String,
        expected: usize,
        actual: usize,
    },
}
