//! Core abstraction for model backends.
//!
//! Every backend implements [`ModelProvider`] to expose a unified request
//! interface; the session engine never sees HTTP details. The trait is
//! deliberately non-streaming — the embedded tool protocol needs the full
//! response text before it can decide whether a follow-up call is required.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use peregrine_core::messages::{ChatMessage, TokenUsage};

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Which model family a request should be routed to.
///
/// Each class maps to a primary/backup model pair and a response token
/// budget in the provider configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    /// Conversational replies (default budget).
    Chat,
    /// Detailed itineraries and deep planning (large budget).
    Reasoning,
    /// Context-analysis calls that maintain the user profile.
    Context,
    /// Quick single-sentence answers (connection tests, probes).
    Simple,
}

impl ModelClass {
    /// Stable identifier for logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Reasoning => "reasoning",
            Self::Context => "context",
            Self::Simple => "simple",
        }
    }
}

/// A successful model completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Raw completion text (may contain embedded tool directives).
    pub content: String,
    /// Model that actually produced the text (primary or backup).
    pub model_used: String,
    /// Token accounting, when the provider reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Errors from a model backend.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body failed to deserialize.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description from the backend.
        message: String,
    },

    /// Backend returned a well-formed response with no usable content.
    #[error("empty completion from {model}")]
    EmptyCompletion {
        /// Model that produced the empty response.
        model: String,
    },

    /// Both the primary and the backup model failed.
    #[error("model and backup both failed ({model_class}): {last_error}")]
    Exhausted {
        /// Requested model class.
        model_class: &'static str,
        /// The backup attempt's error, stringified.
        last_error: String,
    },
}

impl ProviderError {
    /// Whether a single retry against the backup model is worthwhile.
    ///
    /// `Exhausted` is final by construction; everything else gets the one
    /// backup attempt, since even a 4xx can be model-specific on a
    /// multi-model gateway (per-model rate limits, deprecations).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }
}

/// Model backend used by the session engine.
///
/// Implementors must be `Send + Sync`; the engine holds the provider behind
/// an `Arc` and calls it from a spawned per-turn task.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Request a completion for an ordered message list.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        class: ModelClass,
    ) -> ProviderResult<Completion>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_class_identifiers() {
        assert_eq!(ModelClass::Chat.as_str(), "chat");
        assert_eq!(ModelClass::Reasoning.as_str(), "reasoning");
        assert_eq!(ModelClass::Context.as_str(), "context");
        assert_eq!(ModelClass::Simple.as_str(), "simple");
    }

    #[test]
    fn exhausted_is_not_retryable() {
        let err = ProviderError::Exhausted {
            model_class: "chat",
            last_error: "API error (500): boom".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn api_error_is_retryable_against_backup() {
        let err = ProviderError::Api {
            status: 429,
            message: "rate limited".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "API error (429): rate limited");
    }

    #[test]
    fn provider_trait_is_object_safe() {
        fn assert_object_safe(_: &dyn ModelProvider) {}
        let _ = assert_object_safe;
    }

    #[test]
    fn completion_serde_skips_missing_usage() {
        let completion = Completion {
            content: "hi".into(),
            model_used: "m".into(),
            usage: None,
        };
        let json = serde_json::to_value(&completion).unwrap();
        assert!(json.get("usage").is_none());
        assert_eq!(json["modelUsed"], "m");
    }
}
