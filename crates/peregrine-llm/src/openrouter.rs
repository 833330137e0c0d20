//! OpenRouter-compatible chat-completions client.
//!
//! Speaks the OpenAI chat-completions wire format against a configurable
//! base URL. Each [`ModelClass`] maps to a primary/backup model pair; a
//! failed primary call is retried exactly once against the backup before
//! the error is surfaced.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use peregrine_core::messages::{ChatMessage, TokenUsage};

use crate::provider::{Completion, ModelClass, ModelProvider, ProviderError, ProviderResult};

/// Default completion endpoint path under the base URL.
const COMPLETIONS_PATH: &str = "/chat/completions";

/// Sampling temperature used for all requests.
const TEMPERATURE: f64 = 0.7;

/// Primary/backup model names per class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTable {
    /// Conversational model.
    pub chat_primary: String,
    /// Fallback for the conversational model.
    pub chat_backup: String,
    /// Reasoning model for itineraries and deep planning.
    pub reasoning_primary: String,
    /// Fallback for the reasoning model.
    pub reasoning_backup: String,
    /// Context-analysis model.
    pub context_primary: String,
    /// Fallback for the context-analysis model.
    pub context_backup: String,
}

impl ModelTable {
    fn select(&self, class: ModelClass, backup: bool) -> &str {
        match (class, backup) {
            (ModelClass::Chat | ModelClass::Simple, false) => &self.chat_primary,
            (ModelClass::Chat | ModelClass::Simple, true) => &self.chat_backup,
            (ModelClass::Reasoning, false) => &self.reasoning_primary,
            (ModelClass::Reasoning, true) => &self.reasoning_backup,
            (ModelClass::Context, false) => &self.context_primary,
            (ModelClass::Context, true) => &self.context_backup,
        }
    }
}

/// Configuration for [`OpenRouterProvider`]. Immutable after construction.
#[derive(Clone, Debug)]
pub struct OpenRouterConfig {
    /// API base URL (e.g. `https://openrouter.ai/api/v1`).
    pub base_url: String,
    /// Bearer token.
    pub api_key: String,
    /// Model routing table.
    pub models: ModelTable,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Response token budget for chat-class requests.
    pub max_tokens_chat: u32,
    /// Response token budget for reasoning-class requests.
    pub max_tokens_reasoning: u32,
    /// Response token budget for simple probes.
    pub max_tokens_simple: u32,
}

impl OpenRouterConfig {
    fn max_tokens(&self, class: ModelClass) -> u32 {
        match class {
            ModelClass::Chat | ModelClass::Context => self.max_tokens_chat,
            ModelClass::Reasoning => self.max_tokens_reasoning,
            ModelClass::Simple => self.max_tokens_simple,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl From<WireUsage> for TokenUsage {
    fn from(w: WireUsage) -> Self {
        Self {
            prompt_tokens: w.prompt_tokens,
            completion_tokens: w.completion_tokens,
            total_tokens: w.total_tokens,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for an OpenRouter-compatible completions endpoint.
pub struct OpenRouterProvider {
    config: OpenRouterConfig,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    /// Create a provider from configuration.
    pub fn new(config: OpenRouterConfig) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// One-shot connectivity probe against the chat model.
    ///
    /// Used at startup so configuration problems surface before the first
    /// real user message.
    pub async fn test_connection(&self) -> ProviderResult<Completion> {
        let messages = [ChatMessage::user("Say 'Hello' if you can hear me.")];
        self.complete(&messages, ModelClass::Simple).await
    }

    async fn request_once(
        &self,
        messages: &[ChatMessage],
        class: ModelClass,
        model: &str,
    ) -> ProviderResult<Completion> {
        let body = CompletionRequest {
            model,
            messages,
            max_tokens: self.config.max_tokens(class),
            temperature: TEMPERATURE,
        };
        debug!(model, class = class.as_str(), "model request");

        let response = self
            .client
            .post(format!("{}{COMPLETIONS_PATH}", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::EmptyCompletion {
                model: model.to_owned(),
            })?;

        Ok(Completion {
            content,
            model_used: model.to_owned(),
            usage: parsed.usage.map(TokenUsage::from),
        })
    }
}

#[async_trait::async_trait]
impl ModelProvider for OpenRouterProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        class: ModelClass,
    ) -> ProviderResult<Completion> {
        let primary = self.config.models.select(class, false);
        let primary_err = match self.request_once(messages, class, primary).await {
            Ok(completion) => return Ok(completion),
            Err(e) if e.is_retryable() => e,
            Err(e) => return Err(e),
        };

        let backup = self.config.models.select(class, true);
        warn!(
            class = class.as_str(),
            primary,
            backup,
            error = %primary_err,
            "primary model failed, trying backup"
        );
        match self.request_once(messages, class, backup).await {
            Ok(completion) => Ok(completion),
            Err(backup_err) => Err(ProviderError::Exhausted {
                model_class: class.as_str(),
                last_error: backup_err.to_string(),
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> OpenRouterConfig {
        OpenRouterConfig {
            base_url,
            api_key: "sk-or-test".into(),
            models: ModelTable {
                chat_primary: "primary/chat".into(),
                chat_backup: "backup/chat".into(),
                reasoning_primary: "primary/reasoning".into(),
                reasoning_backup: "backup/reasoning".into(),
                context_primary: "primary/context".into(),
                context_backup: "backup/context".into(),
            },
            timeout: Duration::from_secs(5),
            max_tokens_chat: 800,
            max_tokens_reasoning: 2000,
            max_tokens_simple: 300,
        }
    }

    fn completion_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        })
    }

    #[tokio::test]
    async fn successful_completion_uses_primary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(
                serde_json::json!({"model": "primary/chat"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello.")))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new(test_config(server.uri())).unwrap();
        let result = provider
            .complete(&[ChatMessage::user("hi")], ModelClass::Chat)
            .await
            .unwrap();

        assert_eq!(result.content, "Hello.");
        assert_eq!(result.model_used, "primary/chat");
        assert_eq!(result.usage.unwrap().total_tokens, 19);
    }

    #[tokio::test]
    async fn primary_failure_falls_back_to_backup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"model": "primary/chat"}),
            ))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream error"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"model": "backup/chat"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("From backup")))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new(test_config(server.uri())).unwrap();
        let result = provider
            .complete(&[ChatMessage::user("hi")], ModelClass::Chat)
            .await
            .unwrap();

        assert_eq!(result.content, "From backup");
        assert_eq!(result.model_used, "backup/chat");
    }

    #[tokio::test]
    async fn both_models_failing_is_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new(test_config(server.uri())).unwrap();
        let err = provider
            .complete(&[ChatMessage::user("hi")], ModelClass::Reasoning)
            .await
            .unwrap_err();

        assert_matches!(
            err,
            ProviderError::Exhausted {
                model_class: "reasoning",
                ..
            }
        );
    }

    #[tokio::test]
    async fn empty_content_retries_backup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"model": "primary/context"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "   "}}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"model": "backup/context"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("profile")))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new(test_config(server.uri())).unwrap();
        let result = provider
            .complete(&[ChatMessage::user("analyze")], ModelClass::Context)
            .await
            .unwrap();
        assert_eq!(result.content, "profile");
    }

    #[tokio::test]
    async fn request_carries_class_token_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"max_tokens": 2000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("plan")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new(test_config(server.uri())).unwrap();
        let result = provider
            .complete(&[ChatMessage::user("plan a trip")], ModelClass::Reasoning)
            .await
            .unwrap();
        assert_eq!(result.content, "plan");
    }

    #[tokio::test]
    async fn missing_usage_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new(test_config(server.uri())).unwrap();
        let result = provider
            .complete(&[ChatMessage::user("hi")], ModelClass::Chat)
            .await
            .unwrap();
        assert!(result.usage.is_none());
    }

    #[tokio::test]
    async fn test_connection_probes_simple_class() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"max_tokens": 300})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello")))
            .mount(&server)
            .await;

        let provider = OpenRouterProvider::new(test_config(server.uri())).unwrap();
        let result = provider.test_connection().await.unwrap();
        assert_eq!(result.content, "Hello");
    }
}
