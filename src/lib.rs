//! Solace is an emotion-aware companion chat client for remote LLM APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the turn orchestrator and its async runtime, the emotion
//!   classifier, prompt assembly, the response diversity tracker, quotes,
//!   persistence, configuration, and the provider adapters.
//! - [`api`] defines the vendor wire payloads used by the adapters.
//! - [`cli`] parses arguments and runs the interactive and one-shot commands.
//! - [`utils`] holds text helpers, randomness, and logging setup.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which builds an
//! [`core::context::AppContext`] and dispatches into
//! [`core::session::ChatSession`] for chat turns.

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
