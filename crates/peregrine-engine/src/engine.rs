//! The session engine.
//!
//! One [`SessionEngine`] owns one conversation. `send_message` runs the
//! turn pipeline on a spawned task and hands back a stream of
//! [`SessionEvent`]s; nothing is committed until the turn has fully
//! succeeded, so a failed or abandoned turn leaves the log, the snapshot
//! store, and the live context summary exactly as they were.
//!
//! Turn pipeline: validate → primary model call → directive parse → tool
//! orchestration (with at most one follow-up call) → atomic commit →
//! context refresh + snapshot push → final event. A dropped stream is
//! detected at every emit before the commit point and aborts the turn.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use peregrine_core::errors::{EngineError, RewindError};
use peregrine_core::events::SessionEvent;
use peregrine_core::messages::{ChatMessage, Turn};
use peregrine_core::text;
use peregrine_llm::{ModelClass, ModelProvider};
use peregrine_tracking::{ExchangeRecord, ExchangeSink};
use peregrine_weather::ForecastProvider;

use crate::config::EngineConfig;
use crate::context::ContextUpdater;
use crate::conversation_log::{ConversationLog, ConversationStats};
use crate::directive;
use crate::orchestrator::{EventSink, OrchestrationError, ToolOrchestrator};
use crate::prompts;
use crate::snapshot::SnapshotStore;

/// Event stream for one `send_message` call.
pub type SessionStream = ReceiverStream<SessionEvent>;

/// Channel depth for one turn's event stream.
const EVENT_BUFFER: usize = 32;

struct SessionState {
    log: ConversationLog,
    snapshots: SnapshotStore,
    summary: String,
    /// Monotonic exchange counter, unaffected by eviction or rewind.
    turn_counter: u64,
}

struct EngineInner {
    config: EngineConfig,
    model: Arc<dyn ModelProvider>,
    orchestrator: ToolOrchestrator,
    updater: ContextUpdater,
    sink: Option<Arc<dyn ExchangeSink>>,
    state: Mutex<SessionState>,
    busy: AtomicBool,
}

/// A single conversational session.
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

impl SessionEngine {
    /// Build an engine over shared providers. `sink` receives committed
    /// exchanges fire-and-forget when present.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        model: Arc<dyn ModelProvider>,
        weather: Arc<dyn ForecastProvider>,
        sink: Option<Arc<dyn ExchangeSink>>,
    ) -> Self {
        let config = config.normalized();
        let orchestrator =
            ToolOrchestrator::new(model.clone(), weather, config.max_weather_calls);
        let updater = ContextUpdater::new(
            model.clone(),
            config.context_window,
            config.min_context_chars,
        );
        Self {
            inner: Arc::new(EngineInner {
                config,
                model,
                orchestrator,
                updater,
                sink,
                state: Mutex::new(SessionState {
                    log: ConversationLog::new(),
                    snapshots: SnapshotStore::new(),
                    summary: String::new(),
                    turn_counter: 0,
                }),
                busy: AtomicBool::new(false),
            }),
        }
    }

    /// Process one user message, streaming progress events.
    ///
    /// The turn runs on its own task; dropping the returned stream before
    /// the commit point cancels the turn without committing anything.
    pub fn send_message(&self, text: impl Into<String>) -> SessionStream {
        let text = text.into();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let inner = self.inner.clone();

        drop(tokio::spawn(async move {
            let events = EventSink::new(tx);
            if inner
                .busy
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                let _ = events
                    .send(SessionEvent::Error {
                        content: EngineError::SessionBusy.user_message(),
                    })
                    .await;
                return;
            }
            inner.run_turn(&text, &events).await;
            inner.busy.store(false, Ordering::SeqCst);
        }));

        ReceiverStream::new(rx)
    }

    /// Rewind the conversation by dropping the newest `ui_messages_to_drop`
    /// messages.
    ///
    /// Runs as one logical transaction: the snapshot store is restored
    /// first, and only on success are the log truncated and the live
    /// summary replaced. On `Err` nothing has changed.
    pub fn rewind(&self, ui_messages_to_drop: usize) -> Result<(), EngineError> {
        if self.inner.busy.load(Ordering::SeqCst) {
            return Err(EngineError::SessionBusy);
        }
        let mut state = self.inner.state.lock();
        let len = state.log.len();
        if ui_messages_to_drop > len {
            return Err(RewindError::OutOfRange {
                messages: ui_messages_to_drop,
                len,
            }
            .into());
        }

        let summary = state.snapshots.restore(ui_messages_to_drop)?;
        state.log.truncate_to(len - ui_messages_to_drop);
        state.summary = summary;
        info!(
            dropped = ui_messages_to_drop,
            remaining = state.log.len(),
            "conversation rewound"
        );
        Ok(())
    }

    /// How many exchanges a rewind could cross; the UI pre-flight check.
    #[must_use]
    pub fn available_rewind_depth(&self) -> usize {
        self.inner.state.lock().snapshots.available_depth()
    }

    /// Clear the log, the snapshots, and the live summary.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.log.clear();
        state.snapshots.clear();
        state.summary.clear();
        info!("session reset");
    }

    /// Current conversation statistics.
    #[must_use]
    pub fn statistics(&self) -> ConversationStats {
        self.inner
            .state
            .lock()
            .log
            .stats(self.inner.config.max_history)
    }

    /// The full live context summary.
    #[must_use]
    pub fn context_summary(&self) -> String {
        self.inner.state.lock().summary.clone()
    }

    /// Truncated context summary for status surfaces.
    #[must_use]
    pub fn context_preview(&self, max_bytes: usize) -> String {
        text::preview(&self.inner.state.lock().summary, max_bytes)
    }

    /// Committed turns, oldest first (for history display and export).
    #[must_use]
    pub fn history(&self) -> Vec<Turn> {
        self.inner.state.lock().log.turns().to_vec()
    }
}

impl EngineInner {
    async fn run_turn(&self, text: &str, events: &EventSink) {
        if let Err(message) = self.validate(text) {
            debug!(reason = %message, "message rejected");
            let _ = events.send(SessionEvent::Error { content: message }).await;
            return;
        }

        // snapshot the request under the lock, then go async
        let (request, skip_append, context_before) = {
            let state = self.state.lock();
            let skip_append = state.log.tail_matches_user(text);
            let mut request =
                vec![ChatMessage::system(prompts::system_prompt(&state.summary))];
            request.extend(state.log.as_chat_messages());
            if !skip_append {
                request.push(ChatMessage::user(text));
            }
            (request, skip_append, state.summary.clone())
        };

        if events.send(SessionEvent::status("Thinking...")).await.is_err() {
            return;
        }

        let completion = match self.model.complete(&request, ModelClass::Chat).await {
            Ok(completion) => completion,
            Err(error) => {
                warn!(%error, "primary model call failed");
                self.fail_turn(text, &context_before, error.to_string(), events)
                    .await;
                return;
            }
        };

        let parsed = directive::parse(&completion.content);
        let orchestrated = if parsed.has_tool() {
            if !parsed.cleaned_text.is_empty()
                && events
                    .send(SessionEvent::InterimResponse {
                        content: parsed.cleaned_text.clone(),
                    })
                    .await
                    .is_err()
            {
                return;
            }
            match self
                .orchestrator
                .resolve(
                    &parsed,
                    &request,
                    completion.model_used,
                    completion.usage,
                    events,
                )
                .await
            {
                Ok(orchestrated) => orchestrated,
                Err(OrchestrationError::Abandoned(_)) => {
                    info!("turn abandoned before commit");
                    return;
                }
                Err(OrchestrationError::FollowUp(error)) => {
                    warn!(%error, "follow-up model call failed");
                    self.fail_turn(text, &context_before, error.to_string(), events)
                        .await;
                    return;
                }
            }
        } else {
            crate::orchestrator::Orchestrated {
                text: parsed.cleaned_text.clone(),
                model_used: completion.model_used,
                usage: completion.usage,
            }
        };

        if events
            .send(SessionEvent::Response {
                content: orchestrated.text.clone(),
            })
            .await
            .is_err()
        {
            return;
        }

        // last abandonment check; past this point the exchange commits
        if events.is_closed() {
            info!("turn abandoned before commit");
            return;
        }
        let turn_number = {
            let mut state = self.state.lock();
            if !skip_append {
                state.log.push(Turn::user(text));
            }
            state.log.push(Turn::assistant(orchestrated.text.clone()));
            let evicted = state.log.trim_to_max(self.config.max_history);
            state.snapshots.evict_oldest(evicted);
            state.turn_counter += 1;
            state.turn_counter
        };

        // the commit stands even if the caller is gone, so the remaining
        // bookkeeping ignores send failures
        let _ = events.send(SessionEvent::ContextUpdatePending).await;

        let log_snapshot = self.state.lock().log.as_chat_messages();
        let context_after = self.updater.refresh(&context_before, &log_snapshot).await;
        {
            let mut state = self.state.lock();
            state.summary = context_after.clone();
            let exchanges = state.log.len() / 2;
            state.snapshots.push(context_after.clone(), exchanges);
        }

        let _ = events
            .send(SessionEvent::FinalResponse {
                content: orchestrated.text.clone(),
                model_used: orchestrated.model_used.clone(),
                usage: orchestrated.usage.clone(),
            })
            .await;

        self.notify_sink(ExchangeRecord {
            turn_number,
            user_text: text.to_owned(),
            assistant_text: orchestrated.text,
            success: true,
            model_used: Some(orchestrated.model_used),
            usage: orchestrated.usage,
            context_before,
            context_after,
            error: None,
            recorded_at: chrono::Utc::now(),
        });
    }

    fn validate(&self, text: &str) -> Result<(), String> {
        if text.trim().is_empty() {
            return Err("Please enter a message.".to_owned());
        }
        if text.chars().count() > self.config.max_message_chars {
            return Err(format!(
                "Your message is too long. Please keep it under {} characters.",
                self.config.max_message_chars
            ));
        }
        Ok(())
    }

    /// Terminal failure: emit the apologetic error, record the failed
    /// exchange, commit nothing.
    async fn fail_turn(
        &self,
        user_text: &str,
        context_before: &str,
        diagnostic: String,
        events: &EventSink,
    ) {
        let user_message = EngineError::Provider {
            provider: "model",
            message: diagnostic.clone(),
        }
        .user_message();
        let _ = events
            .send(SessionEvent::Error {
                content: user_message.clone(),
            })
            .await;

        let turn_number = {
            let mut state = self.state.lock();
            state.turn_counter += 1;
            state.turn_counter
        };
        self.notify_sink(ExchangeRecord {
            turn_number,
            user_text: user_text.to_owned(),
            assistant_text: user_message,
            success: false,
            model_used: None,
            usage: None,
            context_before: context_before.to_owned(),
            context_after: context_before.to_owned(),
            error: Some(diagnostic),
            recorded_at: chrono::Utc::now(),
        });
    }

    fn notify_sink(&self, record: ExchangeRecord) {
        if let Some(sink) = &self.sink {
            let sink = sink.clone();
            drop(tokio::spawn(async move {
                sink.exchange_committed(record).await;
            }));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
