//! Notification de-duplication
//!
//! The signaling transport does not guarantee at-most-once delivery, so the
//! manager filters the notification stream before reconciliation. The key
//! is (event kind, subject id); per key, the highest applied sequence number
//! is remembered and anything not strictly above it is dropped.
//!
//! This is deliberately the only de-duplication scheme in the crate.
//! Reconciliation is additionally idempotent, so an echo of a change the
//! manager already applied optimistically falls through to a no-op even
//! though its sequence number advances the window.

use std::collections::HashMap;

use crate::signaling::NotificationKind;

/// Per-(kind, subject) monotonic sequence window
#[derive(Debug, Default)]
pub struct DedupWindow {
    last_seq: HashMap<(NotificationKind, String), u64>,
}

impl DedupWindow {
    /// An empty window; everything is fresh
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation. Returns true when the notification is fresh
    /// and should be applied, false when it is a duplicate or stale replay.
    pub fn observe(&mut self, kind: NotificationKind, subject: &str, seq: u64) -> bool {
        match self.last_seq.get_mut(&(kind, subject.to_string())) {
            Some(last) if seq <= *last => false,
            Some(last) => {
                *last = seq;
                true
            }
            None => {
                self.last_seq.insert((kind, subject.to_string()), seq);
                true
            }
        }
    }

    /// Forget everything, e.g. when leaving a room
    pub fn clear(&mut self) {
        self.last_seq.clear();
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.last_seq.len()
    }

    /// True when nothing has been observed yet
    pub fn is_empty(&self) -> bool {
        self.last_seq.is_empty()
    }
}
