//! # peregrine-llm
//!
//! Model provider boundary for the Peregrine session engine.
//!
//! The engine talks to the model through the [`provider::ModelProvider`]
//! trait: an ordered list of `{role, content}` messages plus a
//! [`provider::ModelClass`] selector, returning the completion text, the
//! model actually used, and token usage. [`openrouter::OpenRouterProvider`]
//! is the production implementation; tests substitute hand-written mocks.
//!
//! Failure policy lives here too: a failed completion gets exactly one
//! automatic retry against the configured backup model before the error is
//! surfaced to the caller.

#![deny(unsafe_code)]

pub mod openrouter;
pub mod provider;

pub use openrouter::{ModelTable, OpenRouterConfig, OpenRouterProvider};
pub use provider::{Completion, ModelClass, ModelProvider, ProviderError};
