use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or resolving a session config.
///
/// All of these are fatal: they are reported to the caller before any
/// debuggee is spawned and are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file is not valid JSON or has the wrong shape.
    #[error("malformed config file: {0}")]
    Parse(String),

    /// A config value failed validation.
    #[error("validation error: {field}: {message}")]
    Validation {
        /// The config key that was rejected (e.g. `port`).
        field: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// Run mode without a main module that exists on disk.
    #[error("main module not found. Specified: {0}")]
    MainNotFound(String),

    /// Run mode without a usable engine executable.
    #[error("engine executable not found{}", .0.as_ref().map(|p| format!(": {}", p.display())).unwrap_or_default())]
    EngineNotFound(Option<PathBuf>),

    /// An I/O error occurred while reading the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
