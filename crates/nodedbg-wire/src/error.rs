//! Wire-level error types.

use thiserror::Error;

/// Errors from the transport and protocol session.
#[derive(Debug, Error)]
pub enum WireError {
    /// Stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent something that is not a valid frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection has already been closed.
    #[error("connection closed")]
    Closed,

    /// A message body could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
