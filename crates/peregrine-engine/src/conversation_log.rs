//! Ordered log of committed conversation turns.
//!
//! The log only ever holds committed exchanges: a user message and its
//! assistant response are appended together after the turn succeeds, so a
//! failed or abandoned turn leaves no trace here. Eviction removes whole
//! exchanges from the front; rewind truncates whole exchanges from the
//! back. Both preserve the user/assistant alternation.

use peregrine_core::messages::{ChatMessage, Role, Turn};

/// Summary figures for a session, surfaced by status commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversationStats {
    /// All retained messages.
    pub total_messages: usize,
    /// Retained user messages.
    pub user_messages: usize,
    /// Retained assistant messages.
    pub assistant_messages: usize,
    /// Completed exchanges (one per user message).
    pub turns: usize,
    /// Configured retention ceiling.
    pub history_limit: usize,
    /// Whether the log is past 80% of the ceiling.
    pub approaching_limit: bool,
}

/// Append-only log with whole-exchange trimming.
#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the log holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Read-only view of the retained turns, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append a committed turn.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Whether the newest message is a user turn with exactly this text.
    ///
    /// Retry/edit flows resubmit a message that may already be committed;
    /// the engine uses this check to keep resubmission idempotent.
    #[must_use]
    pub fn tail_matches_user(&self, text: &str) -> bool {
        self.turns
            .last()
            .is_some_and(|turn| turn.role == Role::User && turn.text == text)
    }

    /// Drop every message past index `len` (exclusive). No-op when the log
    /// is already short enough.
    pub fn truncate_to(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    /// Evict oldest whole exchanges until `len() <= max`. Returns the
    /// number of exchanges removed so snapshot eviction can stay in
    /// lockstep. `max` must be even.
    pub fn trim_to_max(&mut self, max: usize) -> usize {
        let mut evicted = 0;
        while self.turns.len() > max && self.turns.len() >= 2 {
            let _ = self.turns.drain(..2);
            evicted += 1;
        }
        evicted
    }

    /// The retained turns as provider messages, oldest first.
    #[must_use]
    pub fn as_chat_messages(&self) -> Vec<ChatMessage> {
        self.turns.iter().map(Turn::as_chat_message).collect()
    }

    /// Current statistics against the configured ceiling.
    #[must_use]
    pub fn stats(&self, history_limit: usize) -> ConversationStats {
        let user_messages = self
            .turns
            .iter()
            .filter(|turn| turn.role == Role::User)
            .count();
        let assistant_messages = self.turns.len() - user_messages;
        ConversationStats {
            total_messages: self.turns.len(),
            user_messages,
            assistant_messages,
            turns: user_messages,
            history_limit,
            approaching_limit: self.turns.len() * 10 > history_limit * 8,
        }
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
