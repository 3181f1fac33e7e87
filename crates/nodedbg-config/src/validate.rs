use crate::config::RawConfig;
use crate::error::ConfigError;

/// Modes accepted in the `mode` key.
pub const KNOWN_MODES: &[&str] = &["run", "connect", "off"];

/// Validate a [`RawConfig`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found. Existence of the main
/// module is checked later, during resolution.
pub fn validate(raw: &RawConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if let Some(mode) = raw.mode.as_deref() {
        if !KNOWN_MODES.contains(&mode) {
            errors.push(ConfigError::Validation {
                field: "mode".to_string(),
                message: format!("unknown \"mode\": {mode:?}"),
            });
        }
    }

    // port: 1-65535
    if let Some(port) = raw.port {
        if !(1..=i64::from(u16::MAX)).contains(&port) {
            errors.push(ConfigError::Validation {
                field: "port".to_string(),
                message: format!("must be 1-65535, got {port}"),
            });
        }
    }

    if raw.host.as_deref().is_some_and(|h| h.trim().is_empty()) {
        errors.push(ConfigError::Validation {
            field: "host".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    if raw.node.as_deref().is_some_and(|n| n.trim().is_empty()) {
        errors.push(ConfigError::Validation {
            field: "node".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    for entry in &raw.mappings {
        if entry.local.is_empty() || entry.remote.is_empty() {
            errors.push(ConfigError::Validation {
                field: "mappings".to_string(),
                message: format!(
                    "prefixes must not be empty, got {:?} -> {:?}",
                    entry.local, entry.remote
                ),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
