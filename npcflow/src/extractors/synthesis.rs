//! Synthesis stage.

use async_trait::async_trait;
use std::sync::Arc;

use super::Extractor;
use crate::config::QualityConfig;
use crate::core::{CharacterProfile, TextPayload, VisualAttributes, VisualPayload};
use crate::errors::ProviderError;
use crate::providers::{ProviderConfig, Subject, Synthesizer};

/// Everything synthesis needs from earlier stages.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisInput {
    /// The NPC.
    pub subject: Subject,
    /// Text stage payload.
    pub text: TextPayload,
    /// Visual stage payload.
    pub visual: VisualPayload,
}

/// Merges text and visual payloads into a [`CharacterProfile`].
#[derive(Clone)]
pub struct SynthesisExtractor {
    synthesizer: Arc<dyn Synthesizer>,
    text_weight: f64,
    visual_weight: f64,
}

impl SynthesisExtractor {
    /// Creates a synthesis extractor using the configured weights.
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>, quality: &QualityConfig) -> Self {
        Self {
            synthesizer,
            text_weight: quality.text_weight,
            visual_weight: quality.visual_weight,
        }
    }

    /// Weighted mean of the two confidences.
    #[must_use]
    pub fn overall_confidence(&self, text_confidence: f64, visual_confidence: f64) -> f64 {
        let total = self.text_weight + self.visual_weight;
        if total <= 0.0 {
            return 0.0;
        }
        (text_confidence * self.text_weight + visual_confidence * self.visual_weight) / total
    }
}

impl std::fmt::Debug for SynthesisExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisExtractor")
            .field("text_weight", &self.text_weight)
            .field("visual_weight", &self.visual_weight)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Extractor for SynthesisExtractor {
    type Input = SynthesisInput;
    type Output = CharacterProfile;

    async fn run(
        &self,
        input: &SynthesisInput,
        config: &ProviderConfig,
    ) -> Result<CharacterProfile, ProviderError> {
        let response = self
            .synthesizer
            .synthesize(&input.subject, &input.text, &input.visual, config)
            .await?;

        let no_image = input.visual.no_image;
        let (visual, visual_confidence) = if no_image {
            (VisualAttributes::unknown(), 0.0)
        } else {
            (input.visual.attributes.clone(), input.visual.confidence)
        };
        let text_confidence = input.text.confidence;

        Ok(CharacterProfile {
            entity_id: input.subject.entity_id,
            name: input.subject.name.clone(),
            variant: input.subject.variant.clone(),
            text: input.text.attributes.clone(),
            visual,
            media_ref: input.visual.media_ref.clone(),
            character_archetype: response.archetype.clone(),
            text_confidence,
            visual_confidence,
            overall_confidence: self.overall_confidence(text_confidence, visual_confidence),
            synthesis_notes: format!(
                "Archetype: {}. Conflicts: {}. Gaps filled: {}",
                response.archetype, response.conflict_resolution, response.gap_filling
            ),
            no_image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityId, TextAttributes};
    use crate::testing::mocks::ScriptedSynthesizer;

    fn input(visual: VisualPayload) -> SynthesisInput {
        SynthesisInput {
            subject: Subject {
                entity_id: EntityId::new(1274),
                name: "Hans".to_string(),
                variant: None,
            },
            text: TextPayload {
                attributes: TextAttributes {
                    occupation: "servant".to_string(),
                    ..TextAttributes::default()
                },
                confidence: 0.8,
                reasoning: String::new(),
                low_confidence: false,
            },
            visual,
        }
    }

    fn seen_visual(confidence: f64) -> VisualPayload {
        VisualPayload {
            media_ref: Some("https://wiki/images/Hans.png".to_string()),
            attributes: VisualAttributes {
                age_category: "elderly".to_string(),
                ..VisualAttributes::unknown()
            },
            confidence,
            reasoning: String::new(),
            no_image: false,
        }
    }

    #[test]
    fn test_overall_confidence_uses_weights() {
        let extractor = SynthesisExtractor::new(
            Arc::new(ScriptedSynthesizer::new()),
            &QualityConfig::default(),
        );
        let overall = extractor.overall_confidence(0.8, 0.5);
        assert!((overall - 0.68).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_synthesis_merges_both_sources() {
        let synthesizer = Arc::new(ScriptedSynthesizer::new());
        let extractor = SynthesisExtractor::new(synthesizer.clone(), &QualityConfig::default());

        let profile = extractor
            .run(&input(seen_visual(0.5)), &ProviderConfig::default())
            .await
            .unwrap();

        assert_eq!(profile.text.occupation, "servant");
        assert_eq!(profile.visual.age_category, "elderly");
        assert_eq!(profile.visual_confidence, 0.5);
        assert!(!profile.no_image);
        assert!(profile.synthesis_notes.starts_with("Archetype: "));
        assert!(profile.synthesis_notes.contains("Gaps filled: "));
        assert_eq!(synthesizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_image_is_text_only() {
        let extractor = SynthesisExtractor::new(
            Arc::new(ScriptedSynthesizer::new()),
            &QualityConfig::default(),
        );

        let profile = extractor
            .run(&input(VisualPayload::no_image("none")), &ProviderConfig::default())
            .await
            .unwrap();

        assert!(profile.no_image);
        assert_eq!(profile.visual_confidence, 0.0);
        assert!((profile.overall_confidence - 0.48).abs() < 1e-9);
        assert_eq!(profile.visual.visual_archetype, "unknown");
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let synthesizer = Arc::new(ScriptedSynthesizer::new());
        synthesizer.fail_for(EntityId::new(1274), ProviderError::inference("timeout"));

        let err = SynthesisExtractor::new(synthesizer, &QualityConfig::default())
            .run(&input(seen_visual(0.9)), &ProviderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Inference(_)));
    }
}
