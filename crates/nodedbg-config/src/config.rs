//! Session config types.
//!
//! [`RawConfig`] is the on-disk shape of `.nodedbg`; [`SessionConfig`] is the
//! resolved form handed to the process orchestrator.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::discover::discover_engine;
use crate::error::ConfigError;

/// Name of the per-project config file.
pub const CONFIG_FILE_NAME: &str = ".nodedbg";

/// Debug port used when connecting without an explicit `port`.
pub const DEFAULT_DEBUG_PORT: u16 = 5858;

/// Host used when connecting without an explicit `host`.
pub const DEFAULT_HOST: &str = "localhost";

/// One `"localPrefix": "remotePrefix"` entry of the `mappings` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Prefix on the debugger's file system.
    pub local: String,
    /// Prefix in the engine's own script naming.
    pub remote: String,
}

impl MappingEntry {
    /// Create a mapping entry.
    pub fn new(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

/// The `.nodedbg` file exactly as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawConfig {
    /// `"run"`, `"connect"` or `"off"`. Absent means `"run"`.
    #[serde(default)]
    pub mode: Option<String>,
    /// Main module for run mode, relative to the project directory.
    #[serde(default)]
    pub main: Option<String>,
    /// Engine executable override.
    #[serde(default)]
    pub node: Option<String>,
    /// Remote host for connect mode.
    #[serde(default)]
    pub host: Option<String>,
    /// Debug port.
    #[serde(default)]
    pub port: Option<i64>,
    /// Path mapping rules, in declaration order.
    #[serde(default, deserialize_with = "ordered_mappings")]
    pub mappings: Vec<MappingEntry>,
}

/// Deserialize a JSON object into its entries while keeping key order.
///
/// Rule order is significant: the first matching prefix wins.
fn ordered_mappings<'de, D>(deserializer: D) -> Result<Vec<MappingEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    struct MappingsVisitor;

    impl<'de> Visitor<'de> for MappingsVisitor {
        type Value = Vec<MappingEntry>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object of local prefix to remote prefix")
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((local, remote)) = map.next_entry::<String, String>()? {
                entries.push(MappingEntry { local, remote });
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(MappingsVisitor)
}

/// How the debugger reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugMode {
    /// Spawn the engine on `main` and attach to it on the loopback interface.
    Run {
        /// Absolute path of the main module.
        main: PathBuf,
        /// Engine executable.
        engine: PathBuf,
    },
    /// Attach to an engine someone else started.
    Connect {
        /// Remote host name or address.
        host: String,
    },
    /// No debugging requested for this target.
    Disabled,
}

/// A fully resolved session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Launch or connect behaviour.
    pub mode: DebugMode,
    /// Debug port. `None` in run mode means "pick a free one".
    pub port: Option<u16>,
    /// Path mapping rules, in priority order.
    pub mappings: Vec<MappingEntry>,
    /// Working directory for a spawned engine.
    pub working_dir: PathBuf,
}

impl SessionConfig {
    /// Config for debugging a single script without a `.nodedbg` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MainNotFound`] when the script does not exist
    /// and [`ConfigError::EngineNotFound`] when no engine can be discovered.
    pub fn for_script(script: &Path) -> Result<Self, ConfigError> {
        if !script.is_file() {
            return Err(ConfigError::MainNotFound(format!("{:?}", script.display().to_string())));
        }
        let engine = discover_engine().ok_or(ConfigError::EngineNotFound(None))?;
        let working_dir = script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            mode: DebugMode::Run {
                main: script.to_path_buf(),
                engine,
            },
            port: None,
            mappings: Vec::new(),
            working_dir,
        })
    }

    /// Whether this config requests any debugging at all.
    pub fn is_enabled(&self) -> bool {
        self.mode != DebugMode::Disabled
    }

    /// Whether the orchestrator must spawn the engine itself.
    pub fn spawns_engine(&self) -> bool {
        matches!(self.mode, DebugMode::Run { .. })
    }

    /// Host to open the debug socket against.
    pub fn host(&self) -> &str {
        match &self.mode {
            DebugMode::Connect { host } => host,
            _ => DEFAULT_HOST,
        }
    }
}
