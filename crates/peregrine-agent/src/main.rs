//! Interactive terminal front end for the Peregrine travel assistant.
//!
//! Assembles providers from environment variables, runs startup connection
//! probes, and drives a [`SessionEngine`] from a line-oriented stdin loop.
//! Slash commands cover conversation management (`/reset`, `/stats`,
//! `/context`, `/history`, `/save`) and rollback (`/retry`, `/edit`).

#![deny(unsafe_code)]

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio_stream::StreamExt;
use tracing::warn;
use uuid::Uuid;

use peregrine_core::events::SessionEvent;
use peregrine_core::messages::Role;
use peregrine_core::text;
use peregrine_engine::{EngineConfig, SessionEngine};
use peregrine_llm::{ModelTable, OpenRouterConfig, OpenRouterProvider};
use peregrine_tracking::{ExchangeSink, FsTracker};
use peregrine_weather::{OpenWeatherClient, OpenWeatherConfig};

#[derive(Debug, Parser)]
#[command(name = "peregrine", about = "Peregrine travel assistant CLI")]
struct Args {
    /// Disable conversation tracking artifacts.
    #[arg(long, default_value_t = false)]
    no_tracking: bool,

    /// Custom session id for tracking (defaults to a timestamped id).
    #[arg(long)]
    session: Option<String>,

    /// Directory for per-session tracking artifacts.
    #[arg(long, default_value = "conversations")]
    output_dir: PathBuf,
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();
    let _ = subscriber.try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration assembly
// ─────────────────────────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn request_timeout() -> Duration {
    let secs = std::env::var("PEREGRINE_REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    Duration::from_secs(secs)
}

fn openrouter_config() -> Result<OpenRouterConfig> {
    let api_key = std::env::var("OPENROUTER_API_KEY")
        .context("OPENROUTER_API_KEY is not set; the assistant cannot reach any model")?;

    Ok(OpenRouterConfig {
        base_url: env_or("OPENROUTER_BASE_URL", "https://openrouter.ai/api/v1"),
        api_key,
        models: ModelTable {
            chat_primary: env_or("PEREGRINE_MODEL_CHAT", "deepseek/deepseek-chat-v3-0324:free"),
            chat_backup: env_or(
                "PEREGRINE_MODEL_CHAT_BACKUP",
                "deepseek/deepseek-chat-v3-0324:free",
            ),
            reasoning_primary: env_or(
                "PEREGRINE_MODEL_REASONING",
                "deepseek/deepseek-r1-0528:free",
            ),
            reasoning_backup: env_or(
                "PEREGRINE_MODEL_REASONING_BACKUP",
                "qwen/qwen3-235b-a22b:free",
            ),
            context_primary: env_or(
                "PEREGRINE_MODEL_CONTEXT",
                "deepseek/deepseek-chat-v3-0324:free",
            ),
            context_backup: env_or(
                "PEREGRINE_MODEL_CONTEXT_BACKUP",
                "meta-llama/llama-3.3-70b-instruct:free",
            ),
        },
        timeout: request_timeout(),
        max_tokens_chat: 800,
        max_tokens_reasoning: 2000,
        max_tokens_simple: 300,
    })
}

fn openweather_config() -> OpenWeatherConfig {
    let api_key = env_or("OPENWEATHER_API_KEY", "");
    if api_key.is_empty() {
        warn!("OPENWEATHER_API_KEY is not set; weather lookups will fail per-request");
    }
    OpenWeatherConfig {
        base_url: env_or("OPENWEATHER_BASE_URL", "https://api.openweathermap.org"),
        api_key,
        timeout: request_timeout(),
    }
}

fn default_session_id() -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!("conv_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &nonce[..8])
}

// ─────────────────────────────────────────────────────────────────────────────
// Event rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Drive one `send_message` stream to completion, printing each event.
async fn run_message(engine: &SessionEngine, message: &str) {
    let mut stream = engine.send_message(message);
    let mut tool_used = false;
    let mut response_printed = false;

    while let Some(event) = stream.next().await {
        match event {
            SessionEvent::Status { content } => {
                // The opening "Thinking..." status is noise at a prompt.
                if !content.starts_with("Thinking") {
                    println!("  … {content}");
                }
            }
            SessionEvent::InterimResponse { content } => {
                if !content.is_empty() {
                    println!("\nassistant> {content}");
                    response_printed = true;
                }
            }
            SessionEvent::ToolSuccess { content } => {
                println!("  ✔ {content}");
                tool_used = true;
            }
            SessionEvent::ToolError { content } => {
                println!("  ✘ {content}");
            }
            SessionEvent::Response { content } => {
                if tool_used && response_printed {
                    // Interim text is already on screen; this is the
                    // post-tool continuation.
                    println!("\n{content}");
                } else if !response_printed {
                    println!("\nassistant> {content}");
                    response_printed = true;
                }
            }
            SessionEvent::ContextUpdatePending => {}
            SessionEvent::FinalResponse {
                model_used, usage, ..
            } => match usage {
                Some(usage) => {
                    println!("  [model: {model_used} | tokens: {}]", usage.total_tokens);
                }
                None => println!("  [model: {model_used}]"),
            },
            SessionEvent::Error { content } => {
                println!("  error: {content}");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Slash commands
// ─────────────────────────────────────────────────────────────────────────────

fn print_help() {
    println!("\nAvailable commands:");
    println!("  /help           show this help message");
    println!("  /reset          reset the conversation");
    println!("  /stats          show conversation statistics");
    println!("  /context        show the derived user context");
    println!("  /history        show conversation history");
    println!("  /retry          regenerate the last assistant response");
    println!("  /edit <text>    replace your last message and regenerate");
    println!("  /save [path]    save the conversation as markdown");
    println!("  /quit, /exit    leave the assistant");
}

fn print_stats(engine: &SessionEngine, tracker: Option<&FsTracker>) {
    let stats = engine.statistics();
    println!("\nConversation statistics:");
    println!("  turns:              {}", stats.turns);
    println!("  total messages:     {}", stats.total_messages);
    println!("  user messages:      {}", stats.user_messages);
    println!("  assistant messages: {}", stats.assistant_messages);
    if stats.approaching_limit {
        println!(
            "  note: approaching the history limit of {} messages",
            stats.history_limit
        );
    }
    if let Some(info) = tracker.and_then(FsTracker::session_info) {
        println!("  tracking:           {} turns recorded", info.turns_tracked);
        println!("  session id:         {}", info.session_id);
    }
}

fn print_context(engine: &SessionEngine) {
    let summary = engine.context_summary();
    println!("\nUser context:");
    if summary.trim().is_empty() {
        println!("  Still building an understanding of this trip.");
    } else {
        println!("{summary}");
    }
}

fn print_history(engine: &SessionEngine) {
    let history = engine.history();
    if history.is_empty() {
        println!("\nNo conversation history yet.");
        return;
    }
    println!("\nConversation history:");
    for (i, turn) in history.iter().enumerate() {
        let speaker = match turn.role {
            Role::User => "user",
            _ => "assistant",
        };
        println!("  [{:>2}] {speaker}: {}", i + 1, text::preview(&turn.text, 200));
    }
}

fn last_user_text(engine: &SessionEngine) -> Option<String> {
    engine
        .history()
        .iter()
        .rev()
        .find(|turn| turn.role == Role::User)
        .map(|turn| turn.text.clone())
}

/// Drop the last assistant message and regenerate it from the same input.
async fn handle_retry(engine: &SessionEngine) {
    if engine.history().len() < 2 {
        println!("Nothing to retry yet.");
        return;
    }
    let Some(message) = last_user_text(engine) else {
        println!("No user message found to retry.");
        return;
    };
    match engine.rewind(1) {
        Ok(()) => {
            println!("Retrying last response…");
            run_message(engine, &message).await;
        }
        Err(error) => println!("Cannot retry: {}", error.user_message()),
    }
}

/// Replace the last exchange with a revised user message.
async fn handle_edit(engine: &SessionEngine, revised: &str) {
    if engine.history().is_empty() {
        println!("No messages to edit yet.");
        return;
    }
    if revised.is_empty() {
        println!("Usage: /edit <revised message>");
        return;
    }
    match engine.rewind(2) {
        Ok(()) => {
            println!("Processing edited message…");
            run_message(engine, revised).await;
        }
        Err(error) => println!("Cannot edit: {}", error.user_message()),
    }
}

fn save_transcript(engine: &SessionEngine, path: &str) -> Result<PathBuf> {
    let path = if path.is_empty() {
        PathBuf::from(format!(
            "conversation_{}.md",
            Utc::now().format("%Y%m%d_%H%M%S")
        ))
    } else {
        PathBuf::from(path)
    };

    let mut out = String::from("# Peregrine Travel Assistant Conversation\n\n");
    out.push_str(&format!(
        "**Date:** {}\n\n---\n\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    for turn in engine.history() {
        let heading = match turn.role {
            Role::User => "## User",
            _ => "## Assistant",
        };
        out.push_str(&format!("{heading}\n\n{}\n\n---\n\n", turn.text));
    }

    std::fs::write(&path, out)
        .with_context(|| format!("failed to write transcript to {}", path.display()))?;
    Ok(path)
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    println!("Peregrine — travel assistant");
    println!("Type /help for commands, /quit to leave.\n");

    let provider = Arc::new(
        OpenRouterProvider::new(openrouter_config()?)
            .context("failed to build the OpenRouter client")?,
    );
    println!("Checking model provider connection…");
    let probe = provider
        .test_connection()
        .await
        .context("OpenRouter connection test failed")?;
    println!("Connected (model: {}).", probe.model_used);

    let weather_config = openweather_config();
    let weather_enabled = !weather_config.api_key.is_empty();
    let weather = Arc::new(
        OpenWeatherClient::new(weather_config).context("failed to build the weather client")?,
    );
    if weather_enabled {
        if let Err(error) = weather.test_connection().await {
            warn!(%error, "weather connection test failed; lookups may not work");
        }
    }

    let tracker = if args.no_tracking {
        None
    } else {
        Some(Arc::new(FsTracker::new(args.output_dir.clone())))
    };

    let sink = tracker
        .clone()
        .map(|t| t as Arc<dyn ExchangeSink>);
    let engine = SessionEngine::new(EngineConfig::default(), provider, weather, sink);

    let mut session_dir = None;
    if let Some(tracker) = &tracker {
        let session_id = args.session.clone().unwrap_or_else(default_session_id);
        tracker.session_started(&session_id).await;
        session_dir = tracker.session_info().map(|info| info.session_dir);
        println!("Tracking enabled — session: {session_id}");
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("\nyou> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else { break };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            let (name, rest) = match input.split_once(char::is_whitespace) {
                Some((name, rest)) => (name, rest.trim()),
                None => (input, ""),
            };
            match name.to_ascii_lowercase().as_str() {
                "/quit" | "/exit" | "/q" => break,
                "/help" => print_help(),
                "/reset" => {
                    engine.reset();
                    println!("Conversation reset.");
                }
                "/stats" => print_stats(&engine, tracker.as_deref()),
                "/context" => print_context(&engine),
                "/history" => print_history(&engine),
                "/retry" => handle_retry(&engine).await,
                "/edit" => handle_edit(&engine, rest).await,
                "/save" => match save_transcript(&engine, rest) {
                    Ok(path) => println!("Conversation saved to {}", path.display()),
                    Err(error) => println!("Save failed: {error:#}"),
                },
                _ => println!("Unknown command. Type /help for available commands."),
            }
        } else {
            run_message(&engine, input).await;
        }
    }

    if let Some(tracker) = &tracker {
        tracker.session_ended().await;
        if let Some(dir) = session_dir {
            println!("Session artifacts written to {}", dir.display());
        }
    }
    println!("Safe travels!");
    Ok(())
}
