//! Dispatch and concurrency core for the Ollama Telegram bot.
//!
//! The crate is framework-agnostic: Telegram, SQLite and Ollama live behind
//! ports (traits) implemented in adapter crates.

pub mod auth;
pub mod backend;
pub mod chunking;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod query;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{BackendError, Error, Result};
