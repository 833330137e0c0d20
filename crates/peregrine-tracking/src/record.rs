//! Exchange records and the sink trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use peregrine_core::messages::TokenUsage;

/// One committed exchange as reported to a sink.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRecord {
    /// 1-based turn counter within the session (monotonic, unaffected by
    /// history eviction).
    pub turn_number: u64,
    /// The user's message.
    pub user_text: String,
    /// The assistant's final response (or the user-safe error text).
    pub assistant_text: String,
    /// Whether the turn completed successfully.
    pub success: bool,
    /// Model behind the final response, when one answered.
    pub model_used: Option<String>,
    /// Merged token usage for the turn.
    pub usage: Option<TokenUsage>,
    /// Context summary before the exchange.
    pub context_before: String,
    /// Context summary after the exchange.
    pub context_after: String,
    /// Diagnostic error text for failed turns.
    pub error: Option<String>,
    /// When the exchange was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl ExchangeRecord {
    /// Whether the context summary changed during this exchange.
    #[must_use]
    pub fn context_changed(&self) -> bool {
        self.context_before != self.context_after
    }
}

/// Destination for committed exchanges.
///
/// Methods are infallible by contract: implementations swallow and log
/// their own failures so tracking can never break a conversation.
#[async_trait]
pub trait ExchangeSink: Send + Sync {
    /// A new session began.
    async fn session_started(&self, session_id: &str);

    /// One exchange was committed (or failed terminally).
    async fn exchange_committed(&self, record: ExchangeRecord);

    /// The session ended; finalize any artifacts.
    async fn session_ended(&self);
}
