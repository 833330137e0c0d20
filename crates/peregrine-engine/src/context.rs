//! Derived user-context maintenance.
//!
//! After every committed exchange the engine asks a context-class model to
//! re-synthesize the user profile from the current summary plus a trailing
//! window of the conversation. The update is best-effort: a failed or
//! degenerate analysis keeps the existing summary, never the turn.

use std::sync::Arc;

use tracing::{debug, warn};

use peregrine_core::messages::ChatMessage;
use peregrine_llm::{ModelClass, ModelProvider};

use crate::prompts;

/// Recomputes the context summary from recent conversation.
pub struct ContextUpdater {
    provider: Arc<dyn ModelProvider>,
    /// Trailing messages included in the analysis window.
    window: usize,
    /// Analysis output at or below this length keeps the old summary.
    min_chars: usize,
}

impl ContextUpdater {
    /// Build an updater over the shared provider.
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>, window: usize, min_chars: usize) -> Self {
        Self {
            provider,
            window,
            min_chars,
        }
    }

    /// Produce the summary that should be live after this commit.
    ///
    /// `messages` is the committed log as chat messages, oldest first.
    /// Returns the existing summary unchanged when the log has no complete
    /// exchange yet, when the analysis call fails, or when its output is
    /// blank or implausibly short.
    pub async fn refresh(&self, current: &str, messages: &[ChatMessage]) -> String {
        if messages.len() < 2 {
            return current.to_owned();
        }

        let start = messages.len().saturating_sub(self.window);
        let recent = prompts::transcript(&messages[start..]);
        let request = [
            ChatMessage::system(prompts::context_analysis_prompt(current, &recent)),
            ChatMessage::user(prompts::CONTEXT_ANALYSIS_REQUEST),
        ];

        match self.provider.complete(&request, ModelClass::Context).await {
            Ok(completion) => {
                let updated = completion.content.trim();
                if updated.len() > self.min_chars {
                    debug!(chars = updated.len(), "user context updated");
                    updated.to_owned()
                } else {
                    warn!(
                        chars = updated.len(),
                        "context analysis returned a degenerate result, keeping existing context"
                    );
                    current.to_owned()
                }
            }
            Err(error) => {
                warn!(%error, "context analysis failed, keeping existing context");
                current.to_owned()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use peregrine_llm::provider::{Completion, ProviderError, ProviderResult};

    struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResult<Completion>>>,
        seen_prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResult<Completion>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen_prompts: Mutex::new(Vec::new()),
            })
        }

        fn ok(content: &str) -> ProviderResult<Completion> {
            Ok(Completion {
                content: content.into(),
                model_used: "test/context".into(),
                usage: None,
            })
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _class: ModelClass,
        ) -> ProviderResult<Completion> {
            self.seen_prompts
                .lock()
                .push(messages[0].content.clone());
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| ScriptedProvider::ok("unscripted"))
        }
    }

    fn exchanges(n: usize) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        for i in 0..n {
            messages.push(ChatMessage::user(format!("question {i}")));
            messages.push(ChatMessage::assistant(format!("answer {i}")));
        }
        messages
    }

    #[tokio::test]
    async fn refresh_adopts_substantial_analysis() {
        let provider =
            ScriptedProvider::new(vec![ScriptedProvider::ok("Traveler is planning Lisbon in May.")]);
        let updater = ContextUpdater::new(provider.clone(), 6, 10);

        let updated = updater.refresh("old summary", &exchanges(2)).await;
        assert_eq!(updated, "Traveler is planning Lisbon in May.");
    }

    #[tokio::test]
    async fn short_analysis_keeps_existing_summary() {
        let provider = ScriptedProvider::new(vec![ScriptedProvider::ok("  ok  ")]);
        let updater = ContextUpdater::new(provider, 6, 10);

        let updated = updater.refresh("established profile", &exchanges(2)).await;
        assert_eq!(updated, "established profile");
    }

    #[tokio::test]
    async fn failed_analysis_keeps_existing_summary() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Exhausted {
            model_class: "context",
            last_error: "down".into(),
        })]);
        let updater = ContextUpdater::new(provider, 6, 10);

        let updated = updater.refresh("established profile", &exchanges(2)).await;
        assert_eq!(updated, "established profile");
    }

    #[tokio::test]
    async fn empty_log_skips_the_call() {
        let provider = ScriptedProvider::new(vec![]);
        let updater = ContextUpdater::new(provider.clone(), 6, 10);

        let updated = updater.refresh("kept", &[]).await;
        assert_eq!(updated, "kept");
        assert!(provider.seen_prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn analysis_window_is_bounded() {
        let provider = ScriptedProvider::new(vec![ScriptedProvider::ok(
            "Profile derived from recent messages only.",
        )]);
        let updater = ContextUpdater::new(provider.clone(), 6, 10);

        let _ = updater.refresh("", &exchanges(8)).await;
        let prompt = provider.seen_prompts.lock()[0].clone();
        // last 6 messages are exchanges 5..8
        assert!(prompt.contains("question 7"));
        assert!(prompt.contains("question 5"));
        assert!(!prompt.contains("question 4"));
    }
}
