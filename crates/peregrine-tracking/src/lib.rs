//! # peregrine-tracking
//!
//! Session transcript and analytics sink.
//!
//! The engine reports committed exchanges through the
//! [`record::ExchangeSink`] trait, fire-and-forget: sink methods never
//! fail the turn, and the filesystem implementation logs its own write
//! errors. [`fs::FsTracker`] keeps one directory per session with a
//! human-readable transcript, the context-evolution history in Markdown
//! and JSON, per-turn performance metrics, and a final session summary.

#![deny(unsafe_code)]

pub mod fs;
pub mod record;

pub use fs::FsTracker;
pub use record::{ExchangeRecord, ExchangeSink};
