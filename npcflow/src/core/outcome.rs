//! Per-run results: stage outcomes, halt reasons and status summaries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::payload::StagePayload;
use super::record::PipelineRecord;
use super::stage::{EntityId, Stage};
use crate::errors::{ErrorKind, FailureRecord};

/// How a stage was resolved during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// A persisted payload was reused.
    Cached,
    /// The extractor ran and succeeded.
    Succeeded,
    /// The extractor ran and failed.
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cached => write!(f, "cached"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Advisory marker on a degraded success.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum QualityFlag {
    /// Confidence fell below the configured threshold.
    LowConfidence {
        /// The reported confidence.
        confidence: f64,
    },
    /// No image was available for visual analysis.
    NoImage,
}

impl QualityFlag {
    /// Returns the error kind this flag is reported under, if any.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::LowConfidence { .. } => Some(ErrorKind::LowConfidence),
            Self::NoImage => None,
        }
    }
}

/// What happened to one stage during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// The stage.
    pub stage: Stage,
    /// How it was resolved.
    pub status: OutcomeStatus,
    /// The payload for cached and succeeded stages.
    pub payload: Option<StagePayload>,
    /// The failure for failed stages.
    pub failure: Option<FailureRecord>,
    /// Advisory flags.
    #[serde(default)]
    pub quality: Vec<QualityFlag>,
    /// Wall time spent resolving the stage.
    pub duration_ms: f64,
}

impl StageOutcome {
    /// Creates a cached outcome.
    #[must_use]
    pub fn cached(stage: Stage, payload: StagePayload, quality: Vec<QualityFlag>) -> Self {
        Self {
            stage,
            status: OutcomeStatus::Cached,
            payload: Some(payload),
            failure: None,
            quality,
            duration_ms: 0.0,
        }
    }

    /// Creates a succeeded outcome.
    #[must_use]
    pub fn succeeded(stage: Stage, payload: StagePayload, quality: Vec<QualityFlag>) -> Self {
        Self {
            stage,
            status: OutcomeStatus::Succeeded,
            payload: Some(payload),
            failure: None,
            quality,
            duration_ms: 0.0,
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(stage: Stage, failure: FailureRecord) -> Self {
        Self {
            stage,
            status: OutcomeStatus::Failed,
            payload: None,
            failure: Some(failure),
            quality: Vec::new(),
            duration_ms: 0.0,
        }
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Converts the outcome to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("stage".to_string(), serde_json::json!(self.stage));
        map.insert("status".to_string(), serde_json::json!(self.status));
        map.insert("duration_ms".to_string(), serde_json::json!(self.duration_ms));

        if let Some(failure) = &self.failure {
            map.insert("error_kind".to_string(), serde_json::json!(failure.error_kind));
            map.insert("message".to_string(), serde_json::json!(failure.message));
        }
        if !self.quality.is_empty() {
            map.insert("quality".to_string(), serde_json::json!(self.quality));
        }

        map
    }
}

/// Why a run stopped before reaching [`Stage::Complete`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "halt", rename_all = "snake_case")]
pub enum HaltReason {
    /// A stage failed; its failure is persisted on the record.
    StageFailed {
        /// The failed stage.
        stage: Stage,
        /// Failure classification.
        kind: ErrorKind,
        /// Failure message.
        message: String,
    },
    /// The run was cancelled between stages.
    Cancelled {
        /// Cancellation reason.
        reason: String,
        /// The stage that would have run next.
        next_stage: Stage,
    },
}

impl HaltReason {
    /// Returns the stage a rerun will start from.
    #[must_use]
    pub fn resume_stage(&self) -> Stage {
        match self {
            Self::StageFailed { stage, .. } => *stage,
            Self::Cancelled { next_stage, .. } => *next_stage,
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageFailed {
                stage,
                kind,
                message,
            } => write!(
                f,
                "{stage} stage failed with {kind}: {message}; rerun to resume from {stage}"
            ),
            Self::Cancelled { reason, next_stage } => write!(
                f,
                "cancelled before {next_stage} stage ({reason}); rerun to resume from {next_stage}"
            ),
        }
    }
}

/// Result of one pipeline run for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Identifier shared by every event of the run.
    pub run_id: Uuid,
    /// The record as persisted at the end of the run.
    pub record: PipelineRecord,
    /// Outcomes in stage order.
    pub outcomes: Vec<StageOutcome>,
    /// Set when the run stopped early.
    pub halt: Option<HaltReason>,
}

impl PipelineRun {
    /// Returns true if the run ended with a complete record.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.halt.is_none() && self.record.is_complete()
    }

    /// Returns the outcome for `stage`, if the run reached it.
    #[must_use]
    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }

    /// Returns the stages that actually called an extractor.
    #[must_use]
    pub fn executed_stages(&self) -> Vec<Stage> {
        self.outcomes
            .iter()
            .filter(|o| o.status != OutcomeStatus::Cached)
            .map(|o| o.stage)
            .collect()
    }
}

/// Summary of an entity's persisted progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStatus {
    /// The NPC.
    pub entity_id: EntityId,
    /// True if a record exists.
    pub exists: bool,
    /// Furthest completed stage.
    pub stage: Stage,
    /// Raw slot holds a success.
    pub raw_data: bool,
    /// Text slot holds a success.
    pub text_analysis: bool,
    /// Visual slot holds a success.
    pub visual_analysis: bool,
    /// Synthesis slot holds a success.
    pub synthesis: bool,
    /// First stage holding a failure, if any.
    pub failed_stage: Option<Stage>,
    /// Record reached [`Stage::Complete`].
    pub is_complete: bool,
}

impl PipelineStatus {
    /// Status for an entity that has never been requested.
    #[must_use]
    pub fn missing(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            exists: false,
            stage: Stage::None,
            raw_data: false,
            text_analysis: false,
            visual_analysis: false,
            synthesis: false,
            failed_stage: None,
            is_complete: false,
        }
    }
}

impl From<&PipelineRecord> for PipelineStatus {
    fn from(record: &PipelineRecord) -> Self {
        Self {
            entity_id: record.entity_id,
            exists: true,
            stage: record.stage,
            raw_data: record.has_success(Stage::Raw),
            text_analysis: record.has_success(Stage::Text),
            visual_analysis: record.has_success(Stage::Visual),
            synthesis: record.has_success(Stage::Synthesis),
            failed_stage: Stage::EXTRACTION_ORDER
                .into_iter()
                .find(|stage| record.failure(*stage).is_some()),
            is_complete: record.is_complete(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::StageSlot;
    use crate::core::payload::TextPayload;

    #[test]
    fn test_halt_reason_message_includes_resume_hint() {
        let halt = HaltReason::StageFailed {
            stage: Stage::Text,
            kind: ErrorKind::Inference,
            message: "provider timed out".to_string(),
        };
        let message = halt.to_string();
        assert!(message.contains("InferenceError"));
        assert!(message.contains("resume from text"));
        assert_eq!(halt.resume_stage(), Stage::Text);
    }

    #[test]
    fn test_cancelled_resume_stage() {
        let halt = HaltReason::Cancelled {
            reason: "shutdown".to_string(),
            next_stage: Stage::Visual,
        };
        assert_eq!(halt.resume_stage(), Stage::Visual);
        assert!(halt.to_string().contains("shutdown"));
    }

    #[test]
    fn test_halt_reason_serde_keeps_both_variants() {
        let failed = HaltReason::StageFailed {
            stage: Stage::Synthesis,
            kind: ErrorKind::Inference,
            message: "rate limited".to_string(),
        };
        let cancelled = HaltReason::Cancelled {
            reason: "shutdown".to_string(),
            next_stage: Stage::Text,
        };

        let json = serde_json::to_value(&cancelled).unwrap();
        assert_eq!(json["halt"], serde_json::json!("cancelled"));
        assert_eq!(json["reason"], serde_json::json!("shutdown"));
        assert_eq!(serde_json::to_value(&failed).unwrap()["halt"], "stage_failed");

        for halt in [failed, cancelled] {
            let text = serde_json::to_string(&halt).unwrap();
            let back: HaltReason = serde_json::from_str(&text).unwrap();
            assert_eq!(back, halt);
        }
    }

    #[test]
    fn test_failed_outcome_to_dict() {
        let outcome = StageOutcome::failed(
            Stage::Raw,
            FailureRecord::new(ErrorKind::Fetch, "dns failure"),
        )
        .with_duration(12.5);

        let dict = outcome.to_dict();
        assert_eq!(dict.get("status"), Some(&serde_json::json!("failed")));
        assert_eq!(dict.get("error_kind"), Some(&serde_json::json!("fetch")));
        assert_eq!(dict.get("duration_ms"), Some(&serde_json::json!(12.5)));
        assert!(!dict.contains_key("quality"));
    }

    #[test]
    fn test_low_confidence_flag_maps_to_advisory_kind() {
        let flag = QualityFlag::LowConfidence { confidence: 0.3 };
        assert_eq!(flag.error_kind(), Some(ErrorKind::LowConfidence));
        assert_eq!(QualityFlag::NoImage.error_kind(), None);
    }

    #[test]
    fn test_status_from_record_reports_failed_stage() {
        let mut record = PipelineRecord::new(EntityId::new(1275));
        record.text = Some(StageSlot::<TextPayload>::Failed(FailureRecord::new(
            ErrorKind::Inference,
            "boom",
        )));

        let status = PipelineStatus::from(&record);
        assert!(status.exists);
        assert!(!status.text_analysis);
        assert_eq!(status.failed_stage, Some(Stage::Text));
        assert!(!status.is_complete);

        let missing = PipelineStatus::missing(EntityId::new(1));
        assert!(!missing.exists);
    }
}
