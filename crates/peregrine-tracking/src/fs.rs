//! Filesystem tracker.
//!
//! One directory per session under the configured base directory. Files
//! are rewritten in full after every exchange so the directory is always
//! consistent, plus a `Session_Summary.md` written once at session end:
//!
//! - `transcript.md` — human-readable conversation
//! - `context_evolution.md` — context progression (readable)
//! - `context_data.json` — context progression (structured)
//! - `session_data.json` — performance metrics and metadata
//!
//! Every write failure is logged and swallowed; the tracker never fails
//! the caller.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::record::{ExchangeRecord, ExchangeSink};

/// Summary of the active session for status surfaces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session identifier.
    pub session_id: String,
    /// Directory holding the session files.
    pub session_dir: PathBuf,
    /// Exchanges recorded so far.
    pub turns_tracked: usize,
}

#[derive(Clone)]
struct SessionState {
    session_id: String,
    dir: PathBuf,
    started_at: DateTime<Utc>,
    exchanges: Vec<ExchangeRecord>,
    models_used: BTreeSet<String>,
}

/// Writes session artifacts under a base directory.
pub struct FsTracker {
    base_dir: PathBuf,
    state: Mutex<Option<SessionState>>,
}

impl FsTracker {
    /// Tracker rooted at `base_dir` (created lazily per session).
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            state: Mutex::new(None),
        }
    }

    /// Info about the active session, if any.
    #[must_use]
    pub fn session_info(&self) -> Option<SessionInfo> {
        self.state.lock().as_ref().map(|state| SessionInfo {
            session_id: state.session_id.clone(),
            session_dir: state.dir.clone(),
            turns_tracked: state.exchanges.len(),
        })
    }

    async fn write_all(state: &SessionState) {
        write_file(&state.dir.join("transcript.md"), &render_transcript(state)).await;
        write_file(
            &state.dir.join("context_evolution.md"),
            &render_context_evolution(state),
        )
        .await;
        write_file(&state.dir.join("context_data.json"), &context_json(state)).await;
        write_file(&state.dir.join("session_data.json"), &session_json(state)).await;
    }
}

#[async_trait]
impl ExchangeSink for FsTracker {
    async fn session_started(&self, session_id: &str) {
        let dir = self.base_dir.join(session_id);
        if let Err(error) = tokio::fs::create_dir_all(&dir).await {
            warn!(%error, dir = %dir.display(), "could not create session directory");
            return;
        }

        let state = SessionState {
            session_id: session_id.to_owned(),
            dir: dir.clone(),
            started_at: Utc::now(),
            exchanges: Vec::new(),
            models_used: BTreeSet::new(),
        };
        *self.state.lock() = Some(state);
        info!(session_id, dir = %dir.display(), "session tracking started");
    }

    async fn exchange_committed(&self, record: ExchangeRecord) {
        let snapshot = {
            let mut guard = self.state.lock();
            let Some(state) = guard.as_mut() else {
                warn!("exchange recorded with no active session");
                return;
            };
            if let Some(model) = &record.model_used {
                let _ = state.models_used.insert(model.clone());
            }
            state.exchanges.push(record);
            state.clone()
        };
        Self::write_all(&snapshot).await;
    }

    async fn session_ended(&self) {
        let Some(state) = self.state.lock().take() else {
            warn!("session_ended with no active session");
            return;
        };
        Self::write_all(&state).await;
        write_file(
            &state.dir.join("Session_Summary.md"),
            &render_summary(&state),
        )
        .await;
        info!(
            session_id = %state.session_id,
            turns = state.exchanges.len(),
            "session tracking ended"
        );
    }
}

async fn write_file(path: &Path, content: &str) {
    if let Err(error) = tokio::fs::write(path, content).await {
        warn!(%error, path = %path.display(), "tracking write failed");
    }
}

fn duration_text(state: &SessionState) -> String {
    let seconds = (Utc::now() - state.started_at).num_milliseconds() as f64 / 1000.0;
    format!("{seconds:.2} seconds")
}

fn render_transcript(state: &SessionState) -> String {
    let mut content = format!(
        "# Travel Assistant Conversation\n\n\
         **Session ID:** {}\n\
         **Started:** {}\n\
         **Total Turns:** {}\n\n---\n\n",
        state.session_id,
        state.started_at.format("%d-%m-%Y %H:%M:%S"),
        state.exchanges.len()
    );
    for exchange in &state.exchanges {
        content.push_str(&format!(
            "## Turn {} ({})\n\n**User:**\n{}\n\n",
            exchange.turn_number,
            exchange.recorded_at.format("%H:%M:%S"),
            exchange.user_text
        ));
        let label = if exchange.success {
            "**Assistant:**"
        } else {
            "**Assistant (Error):**"
        };
        content.push_str(&format!("{label}\n{}\n\n---\n\n", exchange.assistant_text));
    }
    content
}

fn render_context_evolution(state: &SessionState) -> String {
    let mut content = format!(
        "# Context Evolution\n\n\
         **Session ID:** {}\n\
         **Total Context Updates:** {}\n\n---\n\n",
        state.session_id,
        state.exchanges.len()
    );
    for exchange in &state.exchanges {
        content.push_str(&format!("## Turn {}\n\n", exchange.turn_number));
        content.push_str(if exchange.context_changed() {
            "**Context Updated**\n\n"
        } else {
            "**Context Unchanged**\n\n"
        });
        if exchange.context_after.is_empty() {
            content.push_str("**Current Context:** *(No context yet)*\n\n---\n\n");
        } else {
            content.push_str(&format!(
                "**Current Context:**\n```\n{}\n```\n\n---\n\n",
                exchange.context_after
            ));
        }
    }
    content
}

fn context_json(state: &SessionState) -> String {
    let progression: Vec<serde_json::Value> = state
        .exchanges
        .iter()
        .map(|exchange| {
            serde_json::json!({
                "turn": exchange.turn_number,
                "timestamp": exchange.recorded_at.to_rfc3339(),
                "contextBefore": exchange.context_before,
                "contextAfter": exchange.context_after,
                "contextChanged": exchange.context_changed(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&progression).unwrap_or_else(|_| "[]".to_owned())
}

fn session_json(state: &SessionState) -> String {
    let errors: Vec<serde_json::Value> = state
        .exchanges
        .iter()
        .filter(|exchange| !exchange.success)
        .map(|exchange| {
            serde_json::json!({
                "turn": exchange.turn_number,
                "error": exchange.error.clone().unwrap_or_default(),
            })
        })
        .collect();
    let metrics: Vec<serde_json::Value> = state
        .exchanges
        .iter()
        .map(|exchange| {
            serde_json::json!({
                "turn": exchange.turn_number,
                "timestamp": exchange.recorded_at.to_rfc3339(),
                "modelUsed": exchange.model_used,
                "success": exchange.success,
                "usage": exchange.usage,
                "error": exchange.error,
            })
        })
        .collect();
    let data = serde_json::json!({
        "sessionMetadata": {
            "sessionId": state.session_id,
            "startTime": state.started_at.to_rfc3339(),
            "totalTurns": state.exchanges.len(),
            "totalDuration": duration_text(state),
            "modelsUsed": state.models_used,
            "errorsEncountered": errors,
        },
        "performanceMetrics": metrics,
    });
    serde_json::to_string_pretty(&data).unwrap_or_else(|_| "{}".to_owned())
}

fn render_summary(state: &SessionState) -> String {
    let errors: Vec<&ExchangeRecord> = state
        .exchanges
        .iter()
        .filter(|exchange| !exchange.success)
        .collect();
    let mut summary = format!(
        "# Session Summary\n\n\
         **Session ID:** {}\n\
         **Duration:** {}\n\
         **Total Turns:** {}\n\
         **Models Used:** {}\n\
         **Errors:** {}\n\n",
        state.session_id,
        duration_text(state),
        state.exchanges.len(),
        state
            .models_used
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
        errors.len()
    );
    if !errors.is_empty() {
        summary.push_str("## Errors Encountered\n\n");
        for exchange in errors {
            summary.push_str(&format!(
                "- Turn {}: {}\n",
                exchange.turn_number,
                exchange.error.clone().unwrap_or_default()
            ));
        }
        summary.push('\n');
    }
    summary.push_str(
        "## Files Generated\n\n\
         - `transcript.md` - Human-readable conversation\n\
         - `context_evolution.md` - Context progression (readable)\n\
         - `context_data.json` - Context progression (structured)\n\
         - `session_data.json` - Performance metrics and metadata\n",
    );
    summary
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(turn: u64, success: bool) -> ExchangeRecord {
        ExchangeRecord {
            turn_number: turn,
            user_text: format!("question {turn}"),
            assistant_text: if success {
                format!("answer {turn}")
            } else {
                "I apologize, something went wrong.".into()
            },
            success,
            model_used: success.then(|| "test/chat".to_owned()),
            usage: None,
            context_before: String::new(),
            context_after: "Traveler planning a trip.".into(),
            error: (!success).then(|| "model exhausted".to_owned()),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn session_produces_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FsTracker::new(dir.path());

        tracker.session_started("conv_test").await;
        tracker.exchange_committed(record(1, true)).await;
        tracker.exchange_committed(record(2, false)).await;
        tracker.session_ended().await;

        let session_dir = dir.path().join("conv_test");
        for file in [
            "transcript.md",
            "context_evolution.md",
            "context_data.json",
            "session_data.json",
            "Session_Summary.md",
        ] {
            assert!(session_dir.join(file).exists(), "missing {file}");
        }

        let transcript = std::fs::read_to_string(session_dir.join("transcript.md")).unwrap();
        assert!(transcript.contains("question 1"));
        assert!(transcript.contains("**Assistant (Error):**"));

        let summary = std::fs::read_to_string(session_dir.join("Session_Summary.md")).unwrap();
        assert!(summary.contains("**Total Turns:** 2"));
        assert!(summary.contains("Turn 2: model exhausted"));
        assert!(summary.contains("test/chat"));
    }

    #[tokio::test]
    async fn session_data_json_is_structured() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FsTracker::new(dir.path());

        tracker.session_started("conv_json").await;
        tracker.exchange_committed(record(1, true)).await;

        let raw =
            std::fs::read_to_string(dir.path().join("conv_json").join("session_data.json")).unwrap();
        let data: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(data["sessionMetadata"]["totalTurns"], 1);
        assert_eq!(data["sessionMetadata"]["modelsUsed"][0], "test/chat");
        assert_eq!(data["performanceMetrics"][0]["turn"], 1);

        let raw =
            std::fs::read_to_string(dir.path().join("conv_json").join("context_data.json")).unwrap();
        let contexts: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(contexts[0]["contextChanged"], true);
    }

    #[tokio::test]
    async fn recording_without_session_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FsTracker::new(dir.path());

        tracker.exchange_committed(record(1, true)).await;
        tracker.session_ended().await;
        assert!(tracker.session_info().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn session_info_tracks_turns() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = FsTracker::new(dir.path());

        tracker.session_started("conv_info").await;
        assert_eq!(tracker.session_info().unwrap().turns_tracked, 0);
        tracker.exchange_committed(record(1, true)).await;
        let info = tracker.session_info().unwrap();
        assert_eq!(info.turns_tracked, 1);
        assert_eq!(info.session_id, "conv_info");
    }
}
