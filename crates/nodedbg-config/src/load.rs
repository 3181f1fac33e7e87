use std::path::{Path, PathBuf};

use crate::config::{DebugMode, RawConfig, SessionConfig, CONFIG_FILE_NAME, DEFAULT_DEBUG_PORT, DEFAULT_HOST};
use crate::discover::discover_engine;
use crate::error::ConfigError;
use crate::validate::validate;

/// Load the session config for a project.
///
/// 1. Reads `project_dir/.nodedbg`. A missing file means the project
///    did not ask for debugging and yields `Ok(None)`.
/// 2. Parses and validates it.
/// 3. Resolves the main module and engine executable for run mode.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, validation
/// failure, or when run mode cannot find its main module or engine.
pub fn load_session_config(project_dir: &Path) -> Result<Option<SessionConfig>, ConfigError> {
    let path = project_dir.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        tracing::debug!("no {} in {}", CONFIG_FILE_NAME, project_dir.display());
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let config = parse_session_config(&content, project_dir)?;
    tracing::info!("loaded session config from {}", path.display());
    Ok(Some(config))
}

/// Parse config text directly into a resolved [`SessionConfig`].
///
/// Relative paths are resolved against `project_dir`.
///
/// # Errors
///
/// Returns [`ConfigError`] on parse, validation, or resolution failure.
pub fn parse_session_config(content: &str, project_dir: &Path) -> Result<SessionConfig, ConfigError> {
    let raw: RawConfig = serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    validate(&raw).map_err(combine_violations)?;

    // validate() already bounded the port to u16.
    let port = raw.port.and_then(|p| u16::try_from(p).ok());

    let mode = match raw.mode.as_deref() {
        None | Some("run") => resolve_run_mode(&raw, project_dir)?,
        Some("connect") => DebugMode::Connect {
            host: raw.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
        },
        _ => DebugMode::Disabled,
    };

    let port = match mode {
        DebugMode::Connect { .. } => Some(port.unwrap_or(DEFAULT_DEBUG_PORT)),
        _ => port,
    };

    let working_dir = match &mode {
        DebugMode::Run { main, .. } => main.parent().map(Path::to_path_buf).unwrap_or_else(|| project_dir.to_path_buf()),
        _ => project_dir.to_path_buf(),
    };

    Ok(SessionConfig {
        mode,
        port,
        mappings: raw.mappings,
        working_dir,
    })
}

fn resolve_run_mode(raw: &RawConfig, project_dir: &Path) -> Result<DebugMode, ConfigError> {
    let main_raw = raw.main.as_deref().unwrap_or_default();
    let main = resolve_path(main_raw, project_dir);
    if main_raw.is_empty() || !main.is_file() {
        return Err(ConfigError::MainNotFound(format!("{main_raw:?}")));
    }

    let engine = match raw.node.as_deref() {
        Some(node) => {
            let engine = resolve_path(node, project_dir);
            if !engine.is_file() {
                return Err(ConfigError::EngineNotFound(Some(engine)));
            }
            engine
        }
        None => discover_engine().ok_or(ConfigError::EngineNotFound(None))?,
    };

    Ok(DebugMode::Run { main, engine })
}

/// Fold every violation into one error so all of them reach the user.
fn combine_violations(mut errors: Vec<ConfigError>) -> ConfigError {
    if errors.len() == 1 {
        return errors.remove(0);
    }
    let mut fields = Vec::with_capacity(errors.len());
    let mut messages = Vec::with_capacity(errors.len());
    for error in errors {
        match error {
            ConfigError::Validation { field, message } => {
                fields.push(field);
                messages.push(message);
            }
            other => messages.push(other.to_string()),
        }
    }
    if messages.is_empty() {
        messages.push("validation failed".to_string());
    }
    ConfigError::Validation {
        field: if fields.is_empty() { "unknown".to_string() } else { fields.join(", ") },
        message: messages.join("; "),
    }
}

fn resolve_path(raw: &str, project_dir: &Path) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingEntry;
    use tempfile::TempDir;

    fn project_with_main() -> TempDir {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("lib")).unwrap();
        std::fs::write(tmp.path().join("lib").join("app.js"), "console.log(1);\n").unwrap();
        std::fs::write(tmp.path().join("fake-node"), "").unwrap();
        tmp
    }

    #[test]
    fn missing_file_means_no_debugging() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(load_session_config(tmp.path()).unwrap(), None);
    }

    #[test]
    fn off_mode_is_disabled() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), r#"{"mode":"off"}"#).unwrap();
        let cfg = load_session_config(tmp.path()).unwrap().unwrap();
        assert_eq!(cfg.mode, DebugMode::Disabled);
        assert!(!cfg.is_enabled());
    }

    #[test]
    fn run_mode_resolves_main_relative_to_project() {
        let tmp = project_with_main();
        let text = r#"{"main":"lib/app.js","node":"fake-node","mappings":{"/srv/":"app/"}}"#;
        let cfg = parse_session_config(text, tmp.path()).unwrap();
        match &cfg.mode {
            DebugMode::Run { main, engine } => {
                assert_eq!(main, &tmp.path().join("lib").join("app.js"));
                assert_eq!(engine, &tmp.path().join("fake-node"));
            }
            other => panic!("expected run mode, got {other:?}"),
        }
        assert_eq!(cfg.working_dir, tmp.path().join("lib"));
        assert_eq!(cfg.port, None);
        assert_eq!(cfg.mappings, vec![MappingEntry::new("/srv/", "app/")]);
    }

    #[test]
    fn explicit_run_mode_keeps_port() {
        let tmp = project_with_main();
        let text = r#"{"mode":"run","main":"lib/app.js","node":"fake-node","port":6000}"#;
        let cfg = parse_session_config(text, tmp.path()).unwrap();
        assert!(cfg.spawns_engine());
        assert_eq!(cfg.port, Some(6000));
    }

    #[test]
    fn run_mode_missing_main_is_fatal() {
        let tmp = project_with_main();
        let err = parse_session_config(r#"{"main":"nope.js","node":"fake-node"}"#, tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MainNotFound(_)));
        assert!(err.to_string().contains("nope.js"));
    }

    #[test]
    fn run_mode_without_main_key_is_fatal() {
        let tmp = project_with_main();
        let err = parse_session_config(r#"{"node":"fake-node"}"#, tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MainNotFound(_)));
    }

    #[test]
    fn run_mode_missing_engine_override_is_fatal() {
        let tmp = project_with_main();
        let err = parse_session_config(r#"{"main":"lib/app.js","node":"no-such-node"}"#, tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EngineNotFound(Some(_))));
    }

    #[test]
    fn connect_mode_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = parse_session_config(r#"{"mode":"connect"}"#, tmp.path()).unwrap();
        assert_eq!(
            cfg.mode,
            DebugMode::Connect {
                host: DEFAULT_HOST.to_string()
            }
        );
        assert_eq!(cfg.port, Some(DEFAULT_DEBUG_PORT));
        assert!(!cfg.spawns_engine());
    }

    #[test]
    fn connect_mode_explicit_host_and_port() {
        let tmp = TempDir::new().unwrap();
        let cfg = parse_session_config(r#"{"mode":"connect","host":"10.1.2.3","port":9000}"#, tmp.path()).unwrap();
        assert_eq!(cfg.host(), "10.1.2.3");
        assert_eq!(cfg.port, Some(9000));
    }

    #[test]
    fn unknown_mode_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = parse_session_config(r#"{"mode":"attach"}"#, tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn every_violation_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = parse_session_config(r#"{"mode":"attach","port":0,"host":" "}"#, tmp.path()).unwrap_err();
        match err {
            ConfigError::Validation { field, message } => {
                assert_eq!(field, "mode, port, host");
                assert!(message.contains("\"attach\""));
                assert!(message.contains("got 0"));
                assert!(message.contains("must not be empty"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_fatal() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "{ mode: run").unwrap();
        let err = load_session_config(tmp.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn out_of_range_port_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = parse_session_config(r#"{"mode":"connect","port":70000}"#, tmp.path()).unwrap_err();
        assert!(err.to_string().contains("port"));
    }
}
