//! Voice briefs for downstream voice generation.
//!
//! The pipeline never calls a [`VoiceExporter`]. Callers build a
//! [`VoiceBrief`] from a `Complete` record and hand it to whichever
//! exporter they run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::config::QualityConfig;
use crate::core::{EntityId, PipelineRecord, Stage, VisualAttributes};
use crate::errors::ProviderError;

/// Why a record cannot be turned into a brief.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExportError {
    /// The record has not reached `Complete`.
    #[error("entity {entity_id} is at stage {stage}, not complete")]
    NotComplete {
        /// The entity.
        entity_id: EntityId,
        /// Its current stage.
        stage: Stage,
    },

    /// The profile's overall confidence is below the voice threshold.
    #[error("entity {entity_id} confidence {confidence:.2} is below {threshold:.2}")]
    BelowThreshold {
        /// The entity.
        entity_id: EntityId,
        /// Overall profile confidence.
        confidence: f64,
        /// Configured `voice_confidence`.
        threshold: f64,
    },
}

/// Fields a voice generator needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceBrief {
    /// The NPC.
    pub entity_id: EntityId,
    /// Display name, with the variant in parentheses.
    pub name: String,
    /// Personality traits.
    pub personality: String,
    /// Free-text description of the voice.
    pub voice_description: String,
    /// Age bracket, or "unknown" without an image.
    pub age_range: String,
    /// Emotional register.
    pub emotional_profile: String,
    /// Archetype chosen by synthesis.
    pub character_archetype: String,
    /// Dialogue patterns.
    pub speaking_style: String,
    /// Overall profile confidence.
    pub confidence: f64,
    /// Synthesis notes.
    pub notes: String,
}

impl VoiceBrief {
    /// Builds a brief from a `Complete` record.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::NotComplete`] unless the record is complete,
    /// and [`ExportError::BelowThreshold`] when the overall confidence is
    /// below `quality.voice_confidence`.
    pub fn from_record(
        record: &PipelineRecord,
        quality: &QualityConfig,
    ) -> Result<Self, ExportError> {
        let not_complete = || ExportError::NotComplete {
            entity_id: record.entity_id,
            stage: record.stage,
        };
        if !record.is_complete() {
            return Err(not_complete());
        }
        let profile = record.profile().ok_or_else(not_complete)?;

        if profile.overall_confidence < quality.voice_confidence {
            return Err(ExportError::BelowThreshold {
                entity_id: profile.entity_id,
                confidence: profile.overall_confidence,
                threshold: quality.voice_confidence,
            });
        }

        let name = match &profile.variant {
            Some(variant) => format!("{} ({variant})", profile.name),
            None => profile.name.clone(),
        };

        Ok(Self {
            entity_id: profile.entity_id,
            name,
            personality: profile.text.personality_traits.clone(),
            voice_description: describe_voice(
                profile.no_image,
                &profile.visual,
                &profile.text.occupation,
            ),
            age_range: profile.visual.age_category.clone(),
            emotional_profile: profile.text.emotional_range.clone(),
            character_archetype: profile.character_archetype.clone(),
            speaking_style: profile.text.dialogue_patterns.clone(),
            confidence: profile.overall_confidence,
            notes: profile.synthesis_notes.clone(),
        })
    }
}

fn describe_voice(no_image: bool, visual: &VisualAttributes, occupation: &str) -> String {
    if no_image {
        return format!("voice of a {occupation}");
    }
    format!(
        "{} {} voice, {} build, {}",
        visual.age_category, visual.visual_archetype, visual.build_type, visual.distinctive_features
    )
}

/// Consumes voice briefs.
#[async_trait]
pub trait VoiceExporter: Send + Sync {
    /// Exports one brief and returns a reference to what was produced.
    async fn export(&self, brief: &VoiceBrief) -> Result<String, ProviderError>;
}

/// Writes each brief to `<dir>/<entity_id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileExporter {
    dir: PathBuf,
}

impl JsonFileExporter {
    /// Creates an exporter writing into `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl VoiceExporter for JsonFileExporter {
    async fn export(&self, brief: &VoiceBrief) -> Result<String, ProviderError> {
        let json = serde_json::to_vec_pretty(brief)
            .map_err(|e| ProviderError::fetch(format!("cannot encode brief: {e}")))?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            ProviderError::fetch(format!("cannot create {}: {e}", self.dir.display()))
        })?;

        let path = self.dir.join(format!("{}.json", brief.entity_id));
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| ProviderError::fetch(format!("cannot write {}: {e}", path.display())))?;

        info!(entity_id = %brief.entity_id, path = %path.display(), "Voice brief exported");
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHarness;

    async fn complete_record(media: &[&str]) -> PipelineRecord {
        let harness = TestHarness::new();
        let id = harness.seed_page(1274, "Hans", media);
        harness.orchestrator.run_pipeline(id, None).await.unwrap().record
    }

    #[tokio::test]
    async fn test_brief_from_complete_record() {
        let record = complete_record(&["https://img/Hans.png"]).await;
        let brief = VoiceBrief::from_record(&record, &QualityConfig::default()).unwrap();

        assert_eq!(brief.name, "Hans");
        assert_eq!(brief.age_range, "adult");
        assert_eq!(brief.speaking_style, "short, plain sentences");
        assert!(brief.voice_description.contains("commoner"));
        assert!((brief.confidence - 0.81).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_text_only_profile_below_threshold() {
        let record = complete_record(&[]).await;
        let err = VoiceBrief::from_record(&record, &QualityConfig::default()).unwrap_err();
        assert!(matches!(err, ExportError::BelowThreshold { threshold, .. } if threshold == 0.70));

        let lenient = QualityConfig {
            voice_confidence: 0.5,
            ..QualityConfig::default()
        };
        let brief = VoiceBrief::from_record(&record, &lenient).unwrap();
        assert_eq!(brief.age_range, "unknown");
        assert!(brief.voice_description.starts_with("voice of a"));
    }

    #[test]
    fn test_incomplete_record_is_refused() {
        let record = PipelineRecord::new(EntityId::new(5));
        let err = VoiceBrief::from_record(&record, &QualityConfig::default()).unwrap_err();
        assert_eq!(
            err,
            ExportError::NotComplete {
                entity_id: EntityId::new(5),
                stage: Stage::None
            }
        );
    }

    #[tokio::test]
    async fn test_json_exporter_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let record = complete_record(&["https://img/Hans.png"]).await;
        let brief = VoiceBrief::from_record(&record, &QualityConfig::default()).unwrap();

        let exporter = JsonFileExporter::new(dir.path().join("briefs"));
        let path = exporter.export(&brief).await.unwrap();

        let written: VoiceBrief =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, brief);
        assert!(path.ends_with("1274.json"));
    }
}
