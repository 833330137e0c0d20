//! Message types for the Peregrine conversation model.
//!
//! Two message shapes exist on purpose:
//!
//! - [`ChatMessage`] is the provider wire format (`{role, content}` pairs
//!   handed to the model, including system and ephemeral tool-context
//!   messages that are never stored).
//! - [`Turn`] is committed dialogue state owned by the conversation log:
//!   user or assistant only, immutable once committed, timestamped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

/// Speaker role of a committed turn or outgoing message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions (wire format only, never committed to the log).
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
}

impl Role {
    /// Wire-format role string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

/// One `{role, content}` pair in a model request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Committed dialogue state
// ─────────────────────────────────────────────────────────────────────────────

/// One committed message in the conversation log.
///
/// Immutable once committed; created only by a successfully completed
/// exchange and destroyed only by head eviction or tail rollback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    /// Speaker (user or assistant; system never enters the log).
    pub role: Role,
    /// Message text as shown to the user (tool markers already stripped).
    pub text: String,
    /// Commit timestamp.
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Build a user turn timestamped now.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    /// Build an assistant turn timestamped now.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    /// Wire-format view of this turn.
    #[must_use]
    pub fn as_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.text.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token usage
// ─────────────────────────────────────────────────────────────────────────────

/// Token accounting reported by the model provider for one completion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Prompt-side tokens.
    pub prompt_tokens: u64,
    /// Completion-side tokens.
    pub completion_tokens: u64,
    /// Total tokens billed.
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Sum another usage record into this one (multi-call turns).
    pub fn accumulate(&mut self, other: &Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_wire_strings() {
        assert_eq!(Role::System.as_str(), "system");
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn role_serde_snake_case() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        let back: Role = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(back, Role::Assistant);
    }

    #[test]
    fn chat_message_constructors() {
        let m = ChatMessage::system("be brief");
        assert_eq!(m.role, Role::System);
        assert_eq!(m.content, "be brief");

        let m = ChatMessage::user("hi");
        assert_eq!(m.role, Role::User);

        let m = ChatMessage::assistant("hello");
        assert_eq!(m.role, Role::Assistant);
    }

    #[test]
    fn turn_to_chat_message_preserves_text() {
        let turn = Turn::user("pack for Rome");
        let msg = turn.as_chat_message();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "pack for Rome");
    }

    #[test]
    fn turn_serde_camel_case_fields() {
        let turn = Turn::assistant("done");
        let json = serde_json::to_value(&turn).unwrap();
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["role"], "assistant");
    }

    #[test]
    fn token_usage_accumulates() {
        let mut a = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };
        let b = TokenUsage {
            prompt_tokens: 2,
            completion_tokens: 3,
            total_tokens: 5,
        };
        a.accumulate(&b);
        assert_eq!(a.prompt_tokens, 12);
        assert_eq!(a.completion_tokens, 8);
        assert_eq!(a.total_tokens, 20);
    }
}
