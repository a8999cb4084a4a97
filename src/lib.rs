//! Finance Assistant
//!
//! A multi-agent financial assistant:
//! - Market quotes (Alpha Vantage or canned data)
//! - News headline scraping with a static fallback feed
//! - Semantic or keyword retrieval over a document store
//! - Deterministic portfolio analysis
//! - LLM answer generation with retry and canned fallbacks
//!
//! Each agent runs as its own HTTP service and the orchestrator fans out to
//! them, degrading gracefully when one is down. The `api` binary hosts the
//! same capabilities in a single process.

pub mod agents;
pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod language;
pub mod market;
pub mod models;
pub mod news;
pub mod orchestrator;
pub mod retriever;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AssistantError, Result};

// Re-export common types
pub use models::*;
