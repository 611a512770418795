//! Text analysis stage.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::{clamp_confidence, Extractor};
use crate::core::{RawPayload, TextPayload};
use crate::errors::ProviderError;
use crate::providers::{ProviderConfig, Subject, TextAnalyzer, TextRequest};

/// Derives narrative attributes from the raw page.
///
/// Results below `low_confidence` are kept and flagged, not failed.
#[derive(Clone)]
pub struct TextExtractor {
    analyzer: Arc<dyn TextAnalyzer>,
    low_confidence: f64,
}

impl TextExtractor {
    /// Creates a text extractor with the given low-confidence threshold.
    #[must_use]
    pub fn new(analyzer: Arc<dyn TextAnalyzer>, low_confidence: f64) -> Self {
        Self {
            analyzer,
            low_confidence,
        }
    }
}

impl std::fmt::Debug for TextExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextExtractor")
            .field("low_confidence", &self.low_confidence)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Extractor for TextExtractor {
    type Input = RawPayload;
    type Output = TextPayload;

    async fn run(
        &self,
        raw: &RawPayload,
        config: &ProviderConfig,
    ) -> Result<TextPayload, ProviderError> {
        let request = TextRequest {
            subject: Subject::from(raw),
            markdown: raw.markdown.clone(),
        };
        let analysis = self.analyzer.analyze_text(&request, config).await?;

        let confidence = clamp_confidence(analysis.confidence);
        let low_confidence = confidence < self.low_confidence;
        if low_confidence {
            warn!(
                entity_id = %raw.entity_id,
                confidence,
                threshold = self.low_confidence,
                "Text analysis below confidence threshold"
            );
        }

        Ok(TextPayload {
            attributes: analysis.attributes,
            confidence,
            reasoning: analysis.reasoning,
            low_confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityId;
    use crate::testing::fixtures::raw_payload;
    use crate::testing::mocks::ScriptedTextAnalyzer;

    #[tokio::test]
    async fn test_confident_analysis_is_not_flagged() {
        let analyzer = Arc::new(ScriptedTextAnalyzer::new().with_confidence(0.9));
        let extractor = TextExtractor::new(analyzer.clone(), 0.5);

        let payload = extractor
            .run(&raw_payload(EntityId::new(1), &[]), &ProviderConfig::default())
            .await
            .unwrap();

        assert!(!payload.low_confidence);
        assert_eq!(payload.confidence, 0.9);
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_is_flagged_not_failed() {
        let analyzer = Arc::new(ScriptedTextAnalyzer::new().with_confidence(0.2));
        let extractor = TextExtractor::new(analyzer, 0.5);

        let payload = extractor
            .run(&raw_payload(EntityId::new(1), &[]), &ProviderConfig::default())
            .await
            .unwrap();

        assert!(payload.low_confidence);
        assert_eq!(payload.confidence, 0.2);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_clamped() {
        let analyzer = Arc::new(ScriptedTextAnalyzer::new().with_confidence(1.4));
        let payload = TextExtractor::new(analyzer, 0.5)
            .run(&raw_payload(EntityId::new(1), &[]), &ProviderConfig::default())
            .await
            .unwrap();

        assert_eq!(payload.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_provider_failure_is_inference_error() {
        let analyzer = Arc::new(ScriptedTextAnalyzer::new());
        analyzer.fail_for(EntityId::new(1275), ProviderError::inference("model overloaded"));

        let err = TextExtractor::new(analyzer, 0.5)
            .run(&raw_payload(EntityId::new(1275), &[]), &ProviderConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Inference(_)));
    }
}
