//! nodedbg-config — session configuration for the debugger bridge.
//!
//! Reads the per-project `.nodedbg` file, validates it, and resolves it into
//! a [`SessionConfig`] before any debuggee process is spawned.
pub mod config;
pub mod discover;
pub mod error;
pub mod load;
pub mod validate;

pub use config::{DebugMode, MappingEntry, RawConfig, SessionConfig, CONFIG_FILE_NAME, DEFAULT_DEBUG_PORT, DEFAULT_HOST};
pub use discover::discover_engine;
pub use error::ConfigError;
pub use load::{load_session_config, parse_session_config};
