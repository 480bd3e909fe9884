//! Application layer
//!
//! Orchestrates the domain and infrastructure pieces into the listing
//! pipeline: per-listing retries, batched ingestion and command wiring.

pub mod batch_coordinator;
pub mod retry_orchestrator;
pub mod runner;

pub use batch_coordinator::{BatchCoordinator, RunSummary};
pub use retry_orchestrator::{AttemptReport, ResolutionState, RetryOrchestrator};
pub use runner::Pipeline;
