//! Pending request table.
//!
//! Tracks response callbacks by sequence number. Every callback is taken
//! out of the table exactly once: by its response, by a timeout that
//! forgets it, or by [`PendingRequests::drain`] when the connection closes.
use std::collections::HashMap;

use crate::protocol::Response;

/// Callback invoked with the matching response, or `None` if the
/// connection closed first.
pub type ResponseCallback = Box<dyn FnOnce(Option<Response>) + Send>;

/// Map of sequence number to pending response callback.
#[derive(Default)]
pub struct PendingRequests {
    callbacks: HashMap<i64, ResponseCallback>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `seq`.
    ///
    /// Sequence numbers are never reused, so an existing entry indicates a
    /// bug; the old callback is cancelled with `None` rather than lost.
    pub fn register(&mut self, seq: i64, callback: ResponseCallback) {
        if let Some(previous) = self.callbacks.insert(seq, callback) {
            tracing::warn!("duplicate pending request seq {}", seq);
            previous(None);
        }
    }

    /// Remove and return the callback for `seq`.
    pub fn take(&mut self, seq: i64) -> Option<ResponseCallback> {
        self.callbacks.remove(&seq)
    }

    /// Drop the callback for `seq` without invoking it. Returns true if it
    /// was still pending.
    pub fn forget(&mut self, seq: i64) -> bool {
        self.callbacks.remove(&seq).is_some()
    }

    /// Remove every pending callback.
    ///
    /// Callers invoke the returned callbacks after releasing their lock.
    pub fn drain(&mut self) -> Vec<ResponseCallback> {
        self.callbacks.drain().map(|(_, cb)| cb).collect()
    }

    /// How many requests are pending.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
