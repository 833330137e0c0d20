//! # peregrine-core
//!
//! Foundation types for the Peregrine session engine.
//!
//! This crate provides the shared vocabulary the other Peregrine crates
//! depend on:
//!
//! - **Messages**: [`messages::ChatMessage`] / [`messages::Role`] for the
//!   model wire format, [`messages::Turn`] for committed dialogue state,
//!   and [`messages::TokenUsage`].
//! - **Events**: [`events::SessionEvent`], the discriminated union streamed
//!   to the caller during one `send_message` — the sole channel between the
//!   engine and its consumer. Never persisted.
//! - **Errors**: [`errors::EngineError`] hierarchy via `thiserror`, with the
//!   user-safe rendering policy (apologetic text, never raw error strings).
//! - **Text**: UTF-8-safe truncation helpers for previews and transcripts.
//!
//! ## Crate position
//!
//! Foundation crate. Depended on by all other peregrine crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod messages;
pub mod text;
