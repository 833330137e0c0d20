//! Context snapshot store backing rewind.
//!
//! One snapshot is pushed after every committed exchange, capturing the
//! context summary as it stood once that exchange's context update ran.
//! The store and the conversation log move in lockstep: commits push here
//! and append there, head eviction removes from both, and a rewind
//! truncates both or neither.

use chrono::{DateTime, Utc};
use tracing::debug;

use peregrine_core::errors::RewindError;

/// One captured context summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextSnapshot {
    /// Summary text at capture time (may be empty early in a session).
    pub summary: String,
    /// Completed exchanges at capture time.
    pub exchanges: usize,
    /// Capture timestamp.
    pub taken_at: DateTime<Utc>,
}

/// Ordered snapshot history, oldest first.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: Vec<ContextSnapshot>,
}

impl SnapshotStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the post-commit summary for the exchange just completed.
    pub fn push(&mut self, summary: impl Into<String>, exchanges: usize) {
        self.snapshots.push(ContextSnapshot {
            summary: summary.into(),
            exchanges,
            taken_at: Utc::now(),
        });
    }

    /// Snapshots currently stored; the UI pre-flight check for rewind.
    #[must_use]
    pub fn available_depth(&self) -> usize {
        self.snapshots.len()
    }

    /// Rewind by `messages_to_drop` UI messages.
    ///
    /// A UI message is half an exchange, so the store steps back
    /// `ceil(messages_to_drop / 2)` snapshots and returns the summary that
    /// was live at that point (empty when rewinding to the session start).
    /// On `Err` the store is untouched.
    pub fn restore(&mut self, messages_to_drop: usize) -> Result<String, RewindError> {
        let turns_back = messages_to_drop.div_ceil(2);
        let available = self.snapshots.len();
        if turns_back > available {
            return Err(RewindError::InsufficientHistory {
                requested: turns_back,
                available,
            });
        }

        let keep = available - turns_back;
        self.snapshots.truncate(keep);
        let summary = self
            .snapshots
            .last()
            .map(|snapshot| snapshot.summary.clone())
            .unwrap_or_default();
        debug!(turns_back, remaining = keep, "snapshots restored");
        Ok(summary)
    }

    /// Drop the `n` oldest snapshots (lockstep companion to log eviction).
    pub fn evict_oldest(&mut self, n: usize) {
        let n = n.min(self.snapshots.len());
        let _ = self.snapshots.drain(..n);
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn store_with(summaries: &[&str]) -> SnapshotStore {
        let mut store = SnapshotStore::new();
        for (i, summary) in summaries.iter().enumerate() {
            store.push(*summary, i + 1);
        }
        store
    }

    #[test]
    fn restore_steps_back_whole_exchanges() {
        // Dropping one or two UI messages both mean one exchange back.
        for drop in [1, 2] {
            let mut store = store_with(&["after 1", "after 2", "after 3"]);
            let summary = store.restore(drop).unwrap();
            assert_eq!(summary, "after 2");
            assert_eq!(store.available_depth(), 2);
        }
    }

    #[test]
    fn restore_three_messages_rounds_up() {
        let mut store = store_with(&["after 1", "after 2", "after 3"]);
        let summary = store.restore(3).unwrap();
        assert_eq!(summary, "after 1");
        assert_eq!(store.available_depth(), 1);
    }

    #[test]
    fn restore_to_session_start_yields_empty_summary() {
        let mut store = store_with(&["after 1"]);
        let summary = store.restore(2).unwrap();
        assert_eq!(summary, "");
        assert_eq!(store.available_depth(), 0);
    }

    #[test]
    fn restore_past_history_fails_without_mutation() {
        let mut store = store_with(&["after 1", "after 2"]);
        let err = store.restore(6).unwrap_err();
        assert_matches!(
            err,
            RewindError::InsufficientHistory {
                requested: 3,
                available: 2,
            }
        );
        assert_eq!(store.available_depth(), 2);
        // still restorable after the failure
        assert_eq!(store.restore(1).unwrap(), "after 1");
    }

    #[test]
    fn evict_oldest_keeps_newest() {
        let mut store = store_with(&["a", "b", "c"]);
        store.evict_oldest(2);
        assert_eq!(store.available_depth(), 1);
        assert_eq!(store.restore(2).unwrap(), "");

        let mut store = store_with(&["a"]);
        store.evict_oldest(5);
        assert_eq!(store.available_depth(), 0);
    }
}
