//! Breakpoint bookkeeping for a debug session.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// A breakpoint as the host asked for it, before the engine resolves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBreakpoint {
    /// Local source file.
    pub file: PathBuf,
    /// Zero-based line.
    pub line: u32,
    /// Zero-based column.
    pub column: u32,
}

impl PendingBreakpoint {
    /// Create a pending breakpoint at the given location.
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

/// A breakpoint registered with the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundBreakpoint {
    /// Engine-assigned id.
    pub id: i64,
    /// Local source file the host asked for.
    pub file: PathBuf,
    /// Remote script name the engine was given.
    pub target: String,
    /// Zero-based line.
    pub line: u32,
    /// Zero-based column.
    pub column: u32,
    /// Whether the engine will stop on it.
    pub enabled: bool,
}

/// Outcome of binding a pending breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindResult {
    /// The engine accepted the breakpoint.
    Bound(BoundBreakpoint),
    /// The engine did not accept it, or did not answer.
    Unbound,
}

impl BindResult {
    /// The bound breakpoint, if binding succeeded.
    pub fn bound(&self) -> Option<&BoundBreakpoint> {
        match self {
            BindResult::Bound(bp) => Some(bp),
            BindResult::Unbound => None,
        }
    }
}

/// Bound breakpoints keyed by engine id.
#[derive(Debug, Clone, Default)]
pub struct BreakpointManager {
    breakpoints: BTreeMap<i64, BoundBreakpoint>,
}

impl BreakpointManager {
    /// Create a new empty breakpoint manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a bound breakpoint, replacing any previous one with its id.
    pub fn add(&mut self, bp: BoundBreakpoint) {
        self.breakpoints.insert(bp.id, bp);
    }

    /// Stop tracking a breakpoint. Returns it if it was known.
    pub fn remove(&mut self, id: i64) -> Option<BoundBreakpoint> {
        self.breakpoints.remove(&id)
    }

    /// Look up a breakpoint by engine id.
    pub fn get(&self, id: i64) -> Option<&BoundBreakpoint> {
        self.breakpoints.get(&id)
    }

    /// Record a new enabled state. Returns `false` for unknown ids.
    pub fn set_enabled(&mut self, id: i64, enabled: bool) -> bool {
        match self.breakpoints.get_mut(&id) {
            Some(bp) => {
                bp.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// The known breakpoints among the ids a `break` event reported.
    pub fn hits(&self, ids: &[i64]) -> Vec<BoundBreakpoint> {
        ids.iter().filter_map(|id| self.breakpoints.get(id)).cloned().collect()
    }

    /// All breakpoints, ordered by id.
    pub fn all(&self) -> impl Iterator<Item = &BoundBreakpoint> {
        self.breakpoints.values()
    }

    /// Number of tracked breakpoints.
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Forget every breakpoint.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }
}
