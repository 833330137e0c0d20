//! # peregrine-engine
//!
//! The conversational session engine.
//!
//! A session owns a [`conversation_log::ConversationLog`] of committed
//! turns, a [`snapshot::SnapshotStore`] of derived user-context summaries
//! (one per completed exchange, enabling rollback), and a live context
//! summary. Each user message runs through [`engine::SessionEngine`] as a
//! pipeline: validate, call the model, parse embedded tool directives,
//! orchestrate tool calls plus at most one follow-up model call, commit
//! atomically, then recompute the context summary. Progress streams to the
//! caller as typed [`peregrine_core::events::SessionEvent`]s.

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod conversation_log;
pub mod directive;
pub mod engine;
pub mod orchestrator;
pub mod prompts;
pub mod snapshot;

pub use config::EngineConfig;
pub use conversation_log::{ConversationLog, ConversationStats};
pub use engine::{SessionEngine, SessionStream};
pub use snapshot::SnapshotStore;
