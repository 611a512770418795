//! # npcflow
//!
//! A resumable, checkpointed pipeline that turns an NPC's wiki page into a
//! character profile ready for voice generation.
//!
//! Each entity moves through four stages:
//!
//! - **Raw**: fetch the wiki page, parse name and variant, collect images
//! - **Text**: derive personality, occupation and speech from the page text
//! - **Visual**: derive appearance from the first image, or degrade to
//!   text-only when there is none
//! - **Synthesis**: merge both analyses into a [`core::CharacterProfile`]
//!
//! Every stage result is persisted in a [`store::RecordStore`] before the
//! next stage starts, so a rerun skips finished stages and resumes at the
//! first one that is missing or failed.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use npcflow::prelude::*;
//!
//! let config = PipelineConfig::load()?;
//! init_tracing(&config.logging)?;
//!
//! let orchestrator = Orchestrator::builder()
//!     .store(open_store(&config.database).await?)
//!     .scraper(scraper)
//!     .text_analyzer(text_model)
//!     .visual_analyzer(vision_model)
//!     .synthesizer(synthesis_model)
//!     .config(config)
//!     .resilient(true)
//!     .build()?;
//!
//! let run = orchestrator.run_pipeline(EntityId::new(1274), None).await?;
//! if let Some(halt) = &run.halt {
//!     eprintln!("{halt}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod export;
pub mod extractors;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{PipelineConfig, ProviderConfig, QualityConfig};
    pub use crate::core::{
        CharacterProfile, EntityId, HaltReason, OutcomeStatus, PipelineRecord, PipelineRun,
        PipelineStatus, QualityFlag, Stage, StageOutcome,
    };
    pub use crate::errors::{ErrorKind, NpcflowError, ProviderError, StorageError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, StageEvent};
    pub use crate::export::{VoiceBrief, VoiceExporter};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{BatchReport, Orchestrator, OrchestratorBuilder};
    pub use crate::providers::{
        Providers, Resilient, Scraper, Synthesizer, TextAnalyzer, VisualAnalyzer,
    };
    pub use crate::store::{open_store, InMemoryRecordStore, RecordStore, SqliteRecordStore};
}
