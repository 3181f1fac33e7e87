//! Loaded scripts and the session's script registry.
//!
//! A script's identity is its `(id, name)` pair. Entries are created the
//! first time a script is seen, in an `afterCompile` event or a backtrace
//! frame, and live until the session ends.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::EngineError;

/// One script known to the engine.
#[derive(Debug)]
pub struct NodeScript {
    /// Engine script id.
    pub id: i64,
    /// Remote name: a path or URL in the engine's own naming.
    pub name: String,
    /// Line offset of the script within its source.
    pub line_offset: i64,
    /// Column offset of the script within its source.
    pub column_offset: i64,
    local_file: Mutex<Option<PathBuf>>,
}

impl NodeScript {
    /// Create a script with no local file resolved yet.
    pub fn new(id: i64, name: impl Into<String>, line_offset: i64, column_offset: i64) -> Self {
        Self {
            id,
            name: name.into(),
            line_offset,
            column_offset,
            local_file: Mutex::new(None),
        }
    }

    /// Build from an engine script descriptor.
    ///
    /// `id` is required. A missing `name` (eval code) becomes empty and
    /// missing offsets become zero.
    pub fn from_descriptor(descriptor: &serde_json::Value) -> Result<Self, EngineError> {
        let id = descriptor
            .get("id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| EngineError::malformed("script", "missing id"))?;
        let name = descriptor.get("name").and_then(serde_json::Value::as_str).unwrap_or_default();
        let offset = |key: &str| descriptor.get(key).and_then(serde_json::Value::as_i64).unwrap_or(0);
        Ok(Self::new(id, name, offset("lineOffset"), offset("columnOffset")))
    }

    /// Last path segment of the remote name.
    pub fn file_name(&self) -> &str {
        self.name.rsplit(['/', '\\']).next().unwrap_or_default()
    }

    /// Resolved local file, if any.
    pub fn local_file(&self) -> Option<PathBuf> {
        self.local_file.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Record the resolved local file.
    pub fn set_local_file(&self, path: PathBuf) {
        *self.local_file.lock().unwrap_or_else(PoisonError::into_inner) = Some(path);
    }

    /// Whether `self` and `other` name the same script.
    pub fn same_identity(&self, id: i64, name: &str) -> bool {
        self.id == id && self.name == name
    }
}

/// Every script seen during a session, in first-seen order.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: Vec<Arc<NodeScript>>,
}

impl ScriptRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or add the script a descriptor names.
    ///
    /// Returns the entry and whether it was newly added.
    pub fn resolve(&mut self, descriptor: &serde_json::Value) -> Result<(Arc<NodeScript>, bool), EngineError> {
        let candidate = NodeScript::from_descriptor(descriptor)?;
        if let Some(existing) = self
            .scripts
            .iter()
            .find(|s| s.same_identity(candidate.id, &candidate.name))
        {
            return Ok((existing.clone(), false));
        }
        let script = Arc::new(candidate);
        tracing::debug!("script {} registered: {}", script.id, script.name);
        self.scripts.push(script.clone());
        Ok((script, true))
    }

    /// The script whose resolved local file is exactly `path`.
    pub fn find_by_local_file(&self, path: &std::path::Path) -> Option<Arc<NodeScript>> {
        self.scripts
            .iter()
            .find(|s| s.local_file().as_deref() == Some(path))
            .cloned()
    }

    /// The script with engine id `id`.
    pub fn find_by_id(&self, id: i64) -> Option<Arc<NodeScript>> {
        self.scripts.iter().find(|s| s.id == id).cloned()
    }

    /// All scripts, in first-seen order.
    pub fn all(&self) -> &[Arc<NodeScript>] {
        &self.scripts
    }

    /// Number of scripts.
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Whether no script has been seen.
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
