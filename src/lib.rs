//! Alpha Loop Orchestrator
//!
//! Gathers market, macro, crypto and research data from third-party APIs,
//! asks a chain of LLMs for commentary and writes one JSON artifact per
//! dashboard plus a cross-dashboard report:
//! - Resilient fetching with timeouts and exponential backoff
//! - A shared TTL cache for source data and model output
//! - Model routing with ordered fallbacks and JSON extraction
//! - Wave-scheduled jobs that always finish, degraded if need be
//! - Deterministic synthesis into signals and a single decision
//!
//! RUN LOOP:
//! WAVE → FETCH → ANALYZE → WRITE ARTIFACT → NEXT WAVE → SYNTHESIZE

pub mod api;
pub mod artifacts;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod keys;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod sources;
pub mod synthesis;

#[cfg(test)]
mod testing;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use config::OrchestratorConfig;
pub use models::*;
pub use orchestrator::{JobOrchestrator, RunOptions};
