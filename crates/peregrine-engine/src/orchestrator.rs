//! Tool orchestration for one model response.
//!
//! Once the parser has split a response into cleaned text and invocations,
//! the orchestrator applies policy and runs the tools:
//!
//! - the first recognized capability claims the turn; weather and
//!   deep-planning never both run for one response
//! - weather lookups are validated, capped, resolved concurrently, and
//!   followed by exactly one follow-up model call carrying every
//!   successful report as ephemeral context
//! - deep-planning is single-use per response and issues one reasoning
//!   call against the planner prompt
//! - every policy or provider failure degrades to a `toolError` event;
//!   only a failed follow-up model call aborts the turn
//!
//! Tool payloads are never committed to the conversation log.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use peregrine_core::events::SessionEvent;
use peregrine_core::messages::{ChatMessage, TokenUsage};
use peregrine_llm::provider::ProviderError;
use peregrine_llm::{ModelClass, ModelProvider};
use peregrine_weather::{ForecastProvider, ForecastQuery};

use crate::directive::{Parsed, ToolInvocation};
use crate::prompts;

/// Dispatch name for the weather capability.
const TOOL_WEATHER: &str = "weather";
/// Dispatch name for the deep-planning capability.
const TOOL_DEEP_PLANNING: &str = "deep_planning";

/// The caller dropped the event stream; the turn must abort uncommitted.
#[derive(Debug, thiserror::Error)]
#[error("event stream abandoned by caller")]
pub struct ChannelClosed;

/// Why orchestration could not produce a final response.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    /// Caller abandoned the stream mid-turn.
    #[error(transparent)]
    Abandoned(#[from] ChannelClosed),

    /// The follow-up model call failed after its backup retry.
    #[error("follow-up model call failed: {0}")]
    FollowUp(#[from] ProviderError),
}

/// Event sender that surfaces caller abandonment as an error.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<SessionEvent>,
}

impl EventSink {
    /// Wrap a channel sender.
    #[must_use]
    pub fn new(tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { tx }
    }

    /// Deliver one event; `Err` means the receiver is gone.
    pub async fn send(&self, event: SessionEvent) -> Result<(), ChannelClosed> {
        self.tx.send(event).await.map_err(|_| ChannelClosed)
    }

    /// Whether the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Final result of orchestrating one response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Orchestrated {
    /// Complete assistant text to commit and finalize.
    pub text: String,
    /// Model behind the text the user ultimately sees.
    pub model_used: String,
    /// Merged usage across the primary and follow-up calls.
    pub usage: Option<TokenUsage>,
}

fn merge_usage(total: &mut Option<TokenUsage>, extra: Option<&TokenUsage>) {
    if let Some(extra) = extra {
        match total {
            Some(t) => t.accumulate(extra),
            None => *total = Some(extra.clone()),
        }
    }
}

/// Runs tools and follow-up calls for parsed responses.
pub struct ToolOrchestrator {
    model: Arc<dyn ModelProvider>,
    weather: Arc<dyn ForecastProvider>,
    max_weather_calls: usize,
}

impl ToolOrchestrator {
    /// Build an orchestrator over shared providers.
    #[must_use]
    pub fn new(
        model: Arc<dyn ModelProvider>,
        weather: Arc<dyn ForecastProvider>,
        max_weather_calls: usize,
    ) -> Self {
        Self {
            model,
            weather,
            max_weather_calls,
        }
    }

    /// Resolve every invocation in `parsed` and produce the final response.
    ///
    /// `base_messages` is the full outgoing request (system prompt, history,
    /// current user message) so follow-up calls see the same conversation
    /// the primary call saw. `primary_model` and `primary_usage` come from
    /// the primary completion and are folded into the result.
    pub async fn resolve(
        &self,
        parsed: &Parsed,
        base_messages: &[ChatMessage],
        primary_model: String,
        primary_usage: Option<TokenUsage>,
        events: &EventSink,
    ) -> Result<Orchestrated, OrchestrationError> {
        let usage = primary_usage;

        let claim = parsed
            .invocations
            .iter()
            .find_map(|invocation| match invocation.tool_name().as_deref() {
                Some(TOOL_WEATHER) => Some(TOOL_WEATHER),
                Some(TOOL_DEEP_PLANNING) => Some(TOOL_DEEP_PLANNING),
                _ => None,
            });

        match claim {
            Some(TOOL_WEATHER) => {
                self.resolve_weather(parsed, base_messages, primary_model, usage, events)
                    .await
            }
            Some(TOOL_DEEP_PLANNING) => {
                self.resolve_planning(parsed, primary_model, usage, events)
                    .await
            }
            _ => {
                // every invocation is unknown: degrade them all and fall
                // back to the pre-tool text verbatim
                for invocation in &parsed.invocations {
                    self.reject_unknown(invocation, events).await?;
                }
                Ok(Orchestrated {
                    text: parsed.cleaned_text.clone(),
                    model_used: primary_model,
                    usage,
                })
            }
        }
    }

    async fn reject_unknown(
        &self,
        invocation: &ToolInvocation,
        events: &EventSink,
    ) -> Result<(), ChannelClosed> {
        let name = invocation.tool_name().unwrap_or_else(|| "<missing>".into());
        warn!(tool = %name, "unknown tool requested");
        events
            .send(SessionEvent::tool_error(format!(
                "I don't have a tool called '{name}', so I answered from my own knowledge."
            )))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Weather
    // ─────────────────────────────────────────────────────────────────────

    async fn resolve_weather(
        &self,
        parsed: &Parsed,
        base_messages: &[ChatMessage],
        primary_model: String,
        mut usage: Option<TokenUsage>,
        events: &EventSink,
    ) -> Result<Orchestrated, OrchestrationError> {
        let mut queries = Vec::new();

        for invocation in &parsed.invocations {
            match invocation.tool_name().as_deref() {
                Some(TOOL_WEATHER) => {
                    if queries.len() >= self.max_weather_calls {
                        warn!(cap = self.max_weather_calls, "weather call cap reached");
                        events
                            .send(SessionEvent::tool_error(
                                "I can only look up a few locations at once; \
                                 I skipped the extra weather checks.",
                            ))
                            .await?;
                        continue;
                    }
                    match weather_query(invocation) {
                        Ok(query) => queries.push(query),
                        Err(missing) => {
                            warn!(field = missing, "weather request missing field");
                            events
                                .send(SessionEvent::tool_error(
                                    "One of my weather lookups was incomplete, \
                                     so I skipped it.",
                                ))
                                .await?;
                        }
                    }
                }
                Some(TOOL_DEEP_PLANNING) => {
                    warn!("deep_planning rejected: weather already claimed this response");
                    events
                        .send(SessionEvent::tool_error(
                            "I can't run a weather check and deep planning in the \
                             same reply; I kept the weather check.",
                        ))
                        .await?;
                }
                _ => self.reject_unknown(invocation, events).await?,
            }
        }

        let attempted = queries.len();
        for query in &queries {
            events
                .send(SessionEvent::status(format!(
                    "Checking the weather for {}...",
                    query.location
                )))
                .await?;
        }

        let lookups = queries.iter().map(|query| self.weather.forecast(query));
        let results = futures::future::join_all(lookups).await;

        let mut reports = Vec::new();
        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok(report) => {
                    info!(location = %query.location, "weather lookup succeeded");
                    events
                        .send(SessionEvent::ToolSuccess {
                            content: format!("Weather for {} retrieved.", query.location),
                        })
                        .await?;
                    reports.push(report);
                }
                Err(error) => {
                    warn!(location = %query.location, %error, "weather lookup failed");
                    events
                        .send(SessionEvent::tool_error(error.user_message()))
                        .await?;
                }
            }
        }

        if reports.is_empty() {
            // nothing to ground a follow-up call on
            return Ok(Orchestrated {
                text: parsed.cleaned_text.clone(),
                model_used: primary_model,
                usage,
            });
        }

        let mut messages = base_messages.to_vec();
        if !parsed.cleaned_text.is_empty() {
            messages.push(ChatMessage::assistant(parsed.cleaned_text.clone()));
        }
        messages.push(ChatMessage::system(prompts::weather_followup_message(
            &reports.join("\n\n"),
        )));

        let completion = self.model.complete(&messages, ModelClass::Chat).await?;
        merge_usage(&mut usage, completion.usage.as_ref());

        let text = join_with_separator(
            &parsed.cleaned_text,
            &completion.content,
            &weather_separator(reports.len(), attempted),
        );
        Ok(Orchestrated {
            text,
            model_used: completion.model_used,
            usage,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Deep planning
    // ─────────────────────────────────────────────────────────────────────

    async fn resolve_planning(
        &self,
        parsed: &Parsed,
        primary_model: String,
        mut usage: Option<TokenUsage>,
        events: &EventSink,
    ) -> Result<Orchestrated, OrchestrationError> {
        let mut prompt = None;

        for invocation in &parsed.invocations {
            match invocation.tool_name().as_deref() {
                Some(TOOL_DEEP_PLANNING) => {
                    if prompt.is_some() {
                        warn!("duplicate deep_planning request rejected");
                        events
                            .send(SessionEvent::tool_error(
                                "I can only run one deep-planning pass per reply, \
                                 so I skipped the extra request.",
                            ))
                            .await?;
                        continue;
                    }
                    match invocation.field("Prompt").map(str::trim) {
                        Some(text) if !text.is_empty() => prompt = Some(text.to_owned()),
                        _ => {
                            warn!("deep_planning request missing prompt");
                            events
                                .send(SessionEvent::tool_error(
                                    "The planning request was incomplete, so I skipped it.",
                                ))
                                .await?;
                        }
                    }
                }
                Some(TOOL_WEATHER) => {
                    warn!("weather rejected: deep_planning already claimed this response");
                    events
                        .send(SessionEvent::tool_error(
                            "I can't run a weather check and deep planning in the \
                             same reply; I kept the planning request.",
                        ))
                        .await?;
                }
                _ => self.reject_unknown(invocation, events).await?,
            }
        }

        let Some(prompt) = prompt else {
            return Ok(Orchestrated {
                text: parsed.cleaned_text.clone(),
                model_used: primary_model,
                usage,
            });
        };

        events
            .send(SessionEvent::status(
                "Working on a detailed plan, this can take a little longer...",
            ))
            .await?;

        let request = [
            ChatMessage::system(prompts::planner_system_prompt()),
            ChatMessage::user(prompt),
        ];
        let completion = self.model.complete(&request, ModelClass::Reasoning).await?;
        merge_usage(&mut usage, completion.usage.as_ref());

        events
            .send(SessionEvent::ToolSuccess {
                content: "Your detailed plan is ready.".into(),
            })
            .await?;

        let plan = extract_plan(&completion.content);
        let text = join_with_separator(&parsed.cleaned_text, &plan, "---");
        Ok(Orchestrated {
            text,
            model_used: completion.model_used,
            usage,
        })
    }
}

/// Build a [`ForecastQuery`] from an invocation, or name the missing field.
fn weather_query(invocation: &ToolInvocation) -> Result<ForecastQuery, &'static str> {
    let required = |key: &str, name: &'static str| {
        invocation
            .field(key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
            .ok_or(name)
    };
    Ok(ForecastQuery {
        location: required("Location", "Location")?,
        start_date: required("Start_Date", "Start_Date")?,
        end_date: required("End_Date", "End_Date")?,
    })
}

/// Separator between pre-tool text and the follow-up; reports a degraded
/// count when some lookups failed.
fn weather_separator(succeeded: usize, attempted: usize) -> String {
    if succeeded == attempted {
        "---".to_owned()
    } else {
        format!("--- weather data retrieved for {succeeded} of {attempted} locations ---")
    }
}

fn join_with_separator(head: &str, tail: &str, separator: &str) -> String {
    if head.is_empty() {
        tail.to_owned()
    } else {
        format!("{head}\n\n{separator}\n\n{tail}")
    }
}

/// Extract the user-facing plan from raw planner output.
///
/// Three levels: the marker pair, then start-marker only, then the whole
/// output. The degraded levels each log their own warning so transcript
/// anomalies are traceable.
fn extract_plan(raw: &str) -> String {
    const START: &str = "[FINAL_PLAN]";
    const END: &str = "[END_FINAL_PLAN]";

    if let Some(start) = raw.find(START) {
        let after = &raw[start + START.len()..];
        if let Some(end) = after.find(END) {
            return after[..end].trim().to_owned();
        }
        warn!("planner output missing end marker, taking everything after start marker");
        return after.trim().to_owned();
    }
    warn!("planner output missing plan markers, taking raw output");
    raw.trim().to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
