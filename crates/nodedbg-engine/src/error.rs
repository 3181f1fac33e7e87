//! Engine error types.

use nodedbg_config::ConfigError;
use thiserror::Error;

/// Errors from the process orchestrator and value model.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The session config could not be loaded or resolved.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The engine process could not be started.
    #[error("failed to start engine: {0}")]
    Spawn(String),

    /// The debug socket could not be opened.
    #[error("cannot connect to debuggee at {address}: {message}")]
    Connect {
        /// `host:port` that was tried.
        address: String,
        /// Last failure seen.
        message: String,
    },

    /// No handshake arrived before the attach deadline.
    #[error("cannot attach: no handshake within {0} seconds")]
    AttachTimeout(u64),

    /// The operation needs an attached session.
    #[error("not attached to a debuggee")]
    NotAttached,

    /// The operation is not valid in the current process state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A request got no answer in time, or the connection closed first.
    #[error("no response to {0}")]
    NoResponse(String),

    /// The engine rejected an expression.
    #[error("{0}")]
    Evaluation(String),

    /// A value descriptor carried a type tag outside the known set.
    #[error("unknown value type: {0}")]
    UnknownValueType(String),

    /// A handle could not be resolved.
    #[error("lookup of handle {0} failed")]
    LookupFailed(i64),

    /// A response was missing a field the request guarantees.
    #[error("malformed {command} response: {message}")]
    MalformedResponse {
        /// Command whose response was malformed.
        command: String,
        /// What was wrong.
        message: String,
    },

    /// Local file system or process I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn malformed(command: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            command: command.to_string(),
            message: message.into(),
        }
    }
}
