//! Error hierarchy for the session engine.
//!
//! Four domains, matching how failures propagate:
//!
//! - **Validation** — bad input; terminal for the turn, never retried.
//! - **Provider** — a model or weather call failed. Model calls get one
//!   backup-model attempt before becoming terminal; weather failures never
//!   retry and degrade to "data unavailable" advice.
//! - **Protocol** — malformed tool block or unknown tool name; never fatal,
//!   logged and treated as "no tool used".
//! - **Rewind** — insufficient snapshot depth for edit/retry; fully reported
//!   and leaves the log and snapshot store unchanged.
//!
//! User-visible failures always render through [`EngineError::user_message`],
//! a short apologetic message — raw error text never reaches the user.

use thiserror::Error;

/// Rollback failures. State is guaranteed unmodified when these are returned.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RewindError {
    /// The rewind would reach past the stored snapshot history.
    #[error("cannot rewind {requested} turns: only {available} snapshots stored")]
    InsufficientHistory {
        /// Exchanges the rewind would have to cross.
        requested: usize,
        /// Snapshots currently stored.
        available: usize,
    },

    /// A truncation index beyond the log tail was combined with a non-empty
    /// drop request (mismatched caller bookkeeping).
    #[error("rewind of {messages} messages exceeds log length {len}")]
    OutOfRange {
        /// Messages the caller asked to drop.
        messages: usize,
        /// Current log length.
        len: usize,
    },
}

/// Top-level error type for the session engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected before any network call.
    #[error("validation failed: {message}")]
    Validation {
        /// Why the input was rejected (already user-safe).
        message: String,
    },

    /// A provider call failed after all permitted retries.
    #[error("provider failure ({provider}): {message}")]
    Provider {
        /// Which boundary failed (`"model"` or `"weather"`).
        provider: &'static str,
        /// Diagnostic description (not user-safe).
        message: String,
    },

    /// Malformed tool directive or unknown tool name.
    #[error("protocol violation: {message}")]
    Protocol {
        /// Diagnostic description.
        message: String,
    },

    /// Rollback failure; state unchanged.
    #[error(transparent)]
    Rewind(#[from] RewindError),

    /// A turn is already in flight for this session.
    #[error("session is busy processing another message")]
    SessionBusy,
}

impl EngineError {
    /// Build a validation error with a user-safe message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether this error terminates the turn (vs. degrading it).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Validation { .. } | Self::Provider { .. } | Self::SessionBusy => true,
            Self::Protocol { .. } | Self::Rewind(_) => false,
        }
    }

    /// Short apologetic message safe to show the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message } => message.clone(),
            Self::Provider { .. } => {
                "I apologize, but I'm having trouble processing your request right now. \
                 Please try again in a moment."
                    .to_owned()
            }
            Self::Protocol { .. } => {
                "I had trouble with one of my tools, so this answer may be incomplete.".to_owned()
            }
            Self::Rewind(RewindError::InsufficientHistory { .. } | RewindError::OutOfRange { .. }) => {
                "I can't rewind the conversation that far.".to_owned()
            }
            Self::SessionBusy => {
                "I'm still working on your previous message — one moment.".to_owned()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
