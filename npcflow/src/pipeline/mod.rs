//! Pipeline execution.
//!
//! This module provides:
//! - The cache gate deciding whether a stage runs
//! - The per-entity orchestrator and its builder
//! - Batch reports

mod batch;
mod gate;
mod orchestrator;


pub use batch::{BatchReport, BatchSummary};
pub use gate::should_run;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
