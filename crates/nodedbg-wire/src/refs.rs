//! Short-lived cache of value descriptors keyed by handle.
//!
//! The engine recycles handles on every pause, so the cache is tagged with
//! a generation that advances on each event. A lookup made under an older
//! generation never hits, and its result is never stored.
use std::collections::HashMap;

/// Handle-to-descriptor cache for the current event generation.
#[derive(Debug, Default)]
pub struct RefCache {
    generation: u64,
    entries: HashMap<i64, serde_json::Value>,
}

impl RefCache {
    /// Create an empty cache at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a new generation, discarding every entry.
    pub fn advance(&mut self) -> u64 {
        self.generation += 1;
        self.entries.clear();
        self.generation
    }

    /// Index inline descriptors by their `handle` field. Descriptors without
    /// one are skipped.
    pub fn index(&mut self, refs: &[serde_json::Value]) {
        for descriptor in refs {
            match descriptor.get("handle").and_then(serde_json::Value::as_i64) {
                Some(handle) => {
                    self.entries.insert(handle, descriptor.clone());
                }
                None => tracing::debug!("ref without handle skipped"),
            }
        }
    }

    /// Cached descriptor for `handle`, only if `generation` is current.
    pub fn get(&self, handle: i64, generation: u64) -> Option<serde_json::Value> {
        if generation != self.generation {
            return None;
        }
        self.entries.get(&handle).cloned()
    }

    /// Store a looked-up descriptor if no event arrived since `generation`.
    /// Returns whether it was stored.
    pub fn insert(&mut self, handle: i64, descriptor: serde_json::Value, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.entries.insert(handle, descriptor);
        true
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
