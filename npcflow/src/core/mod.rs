//! Core domain model types for npcflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Entity ids and the stage enum
//! - Stage payloads and their versioned envelope
//! - The per-entity pipeline record
//! - Run outcomes and status summaries

mod outcome;
mod payload;
mod record;
mod stage;

pub use outcome::{
    HaltReason, OutcomeStatus, PipelineRun, PipelineStatus, QualityFlag, StageOutcome,
};
pub use payload::{
    CharacterProfile, Envelope, RawPayload, StageData, StagePayload, TextAttributes,
    TextPayload, VisualAttributes, VisualPayload,
};
pub use record::{PipelineRecord, StageSlot};
pub use stage::{EntityId, Stage};
