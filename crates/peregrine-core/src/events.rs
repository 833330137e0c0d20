//! Session event stream types.
//!
//! [`SessionEvent`] is the sole channel between the session engine and its
//! caller: one `send_message` call yields an ordered stream of these, and
//! consumers render each variant as it arrives (status → spinner, interim
//! response → partial text, response → replace/append, error → terminal).
//! Events are transient and never persisted.

use serde::{Deserialize, Serialize};

use crate::messages::TokenUsage;

/// One event in the per-message stream emitted by the session engine.
///
/// Ordering is guaranteed to be consistent with the engine's state machine:
/// `Status` events may appear at any point before finalization,
/// `InterimResponse` precedes any tool events, `Response` precedes
/// `ContextUpdatePending`, and `FinalResponse` (or `Error`) is terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Progress text for spinners ("Checking the weather for Rome…").
    Status {
        /// Human-readable progress line.
        content: String,
    },

    /// Text produced before tool execution, shown while tools run.
    InterimResponse {
        /// Pre-tool assistant text (markers already stripped).
        content: String,
    },

    /// A tool call resolved successfully.
    ToolSuccess {
        /// Short human-readable confirmation.
        content: String,
    },

    /// A tool call failed or was rejected; never terminal.
    ToolError {
        /// User-safe description of the degradation.
        content: String,
    },

    /// The complete user-facing assistant text for this turn.
    Response {
        /// Final rendered text (no raw tool markers).
        content: String,
    },

    /// The engine is now recomputing the derived user context.
    ///
    /// Purely observational — the user-visible response has already been
    /// emitted; this only affects future turns.
    #[serde(rename = "context_update")]
    ContextUpdatePending,

    /// Terminal success event with model metadata.
    FinalResponse {
        /// Final rendered text, identical to the preceding `Response`.
        content: String,
        /// Model that produced the final text.
        model_used: String,
        /// Token accounting across all model calls in the turn.
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },

    /// Terminal failure event. Content is always user-safe prose.
    Error {
        /// Apologetic, short failure message.
        content: String,
    },
}

impl SessionEvent {
    /// Event type string for logging and wire discrimination.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::InterimResponse { .. } => "interim_response",
            Self::ToolSuccess { .. } => "tool_success",
            Self::ToolError { .. } => "tool_error",
            Self::Response { .. } => "response",
            Self::ContextUpdatePending => "context_update",
            Self::FinalResponse { .. } => "final_response",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalResponse { .. } | Self::Error { .. })
    }

    /// Build a `Status` event.
    #[must_use]
    pub fn status(content: impl Into<String>) -> Self {
        Self::Status {
            content: content.into(),
        }
    }

    /// Build a `ToolError` event.
    #[must_use]
    pub fn tool_error(content: impl Into<String>) -> Self {
        Self::ToolError {
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tags_match_event_type() {
        let events = vec![
            SessionEvent::status("thinking"),
            SessionEvent::InterimResponse {
                content: "one sec".into(),
            },
            SessionEvent::ToolSuccess {
                content: "weather retrieved".into(),
            },
            SessionEvent::tool_error("no such tool"),
            SessionEvent::Response {
                content: "pack light".into(),
            },
            SessionEvent::ContextUpdatePending,
            SessionEvent::FinalResponse {
                content: "pack light".into(),
                model_used: "deepseek/deepseek-chat".into(),
                usage: None,
            },
            SessionEvent::Error {
                content: "sorry".into(),
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn terminal_classification() {
        assert!(
            SessionEvent::FinalResponse {
                content: String::new(),
                model_used: String::new(),
                usage: None,
            }
            .is_terminal()
        );
        assert!(SessionEvent::Error { content: "x".into() }.is_terminal());
        assert!(!SessionEvent::status("x").is_terminal());
        assert!(!SessionEvent::ContextUpdatePending.is_terminal());
    }

    #[test]
    fn usage_skipped_when_none() {
        let event = SessionEvent::FinalResponse {
            content: "ok".into(),
            model_used: "m".into(),
            usage: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("usage").is_none());
    }

    #[test]
    fn roundtrip_through_json() {
        let event = SessionEvent::FinalResponse {
            content: "ok".into(),
            model_used: "m".into(),
            usage: Some(crate::messages::TokenUsage {
                prompt_tokens: 1,
                completion_tokens: 2,
                total_tokens: 3,
            }),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
