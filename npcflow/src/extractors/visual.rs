//! Visual analysis stage.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{clamp_confidence, Extractor};
use crate::core::{RawPayload, VisualPayload};
use crate::errors::ProviderError;
use crate::providers::{ProviderConfig, Subject, VisualAnalyzer};

/// Derives visual attributes from the first image on the page.
///
/// An entity without images yields a degraded `no_image` payload and the
/// analyzer is not called.
#[derive(Clone)]
pub struct VisualExtractor {
    analyzer: Arc<dyn VisualAnalyzer>,
}

impl VisualExtractor {
    /// Creates a visual extractor.
    #[must_use]
    pub fn new(analyzer: Arc<dyn VisualAnalyzer>) -> Self {
        Self { analyzer }
    }
}

impl std::fmt::Debug for VisualExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualExtractor").finish_non_exhaustive()
    }
}

#[async_trait]
impl Extractor for VisualExtractor {
    type Input = RawPayload;
    type Output = VisualPayload;

    async fn run(
        &self,
        raw: &RawPayload,
        config: &ProviderConfig,
    ) -> Result<VisualPayload, ProviderError> {
        let Some(media_ref) = raw.media_refs.first() else {
            debug!(entity_id = %raw.entity_id, "No media reference, skipping image analysis");
            return Ok(VisualPayload::no_image("no image reference on page"));
        };

        let subject = Subject::from(raw);
        let analysis = self
            .analyzer
            .analyze_image(&subject, Some(media_ref.as_str()), config)
            .await?;

        if analysis.no_image {
            return Ok(VisualPayload::no_image(analysis.reasoning));
        }

        Ok(VisualPayload {
            media_ref: Some(media_ref.clone()),
            attributes: analysis.attributes,
            confidence: clamp_confidence(analysis.confidence),
            reasoning: analysis.reasoning,
            no_image: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityId;
    use crate::providers::VisualAnalysis;
    use crate::testing::fixtures::raw_payload;
    use crate::testing::mocks::ScriptedVisualAnalyzer;

    #[tokio::test]
    async fn test_no_media_is_degraded_without_provider_call() {
        let analyzer = Arc::new(ScriptedVisualAnalyzer::new());
        let extractor = VisualExtractor::new(analyzer.clone());

        let payload = extractor
            .run(&raw_payload(EntityId::new(1274), &[]), &ProviderConfig::default())
            .await
            .unwrap();

        assert!(payload.no_image);
        assert_eq!(payload.confidence, 0.0);
        assert!(payload.media_ref.is_none());
        assert_eq!(analyzer.calls(), 0);
    }

    #[tokio::test]
    async fn test_first_media_ref_is_analyzed() {
        let analyzer = Arc::new(ScriptedVisualAnalyzer::new().with_confidence(0.8));
        let extractor = VisualExtractor::new(analyzer.clone());
        let raw = raw_payload(
            EntityId::new(5),
            &["https://wiki/images/chathead.png", "https://wiki/images/full.png"],
        );

        let payload = extractor.run(&raw, &ProviderConfig::default()).await.unwrap();

        assert!(!payload.no_image);
        assert_eq!(payload.media_ref.as_deref(), Some("https://wiki/images/chathead.png"));
        assert_eq!(payload.confidence, 0.8);
        assert_eq!(analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_image_degrades() {
        let analyzer = Arc::new(ScriptedVisualAnalyzer::new());
        analyzer.respond_for(EntityId::new(6), Ok(VisualAnalysis::no_image("image 404")));
        let raw = raw_payload(EntityId::new(6), &["https://wiki/images/missing.png"]);

        let payload = VisualExtractor::new(analyzer)
            .run(&raw, &ProviderConfig::default())
            .await
            .unwrap();

        assert!(payload.no_image);
        assert_eq!(payload.attributes.build_type, "unknown");
    }

    #[tokio::test]
    async fn test_provider_failure_is_inference_error() {
        let analyzer = Arc::new(ScriptedVisualAnalyzer::new());
        analyzer.respond_for(EntityId::new(7), Err(ProviderError::inference("vision down")));
        let raw = raw_payload(EntityId::new(7), &["https://wiki/images/a.png"]);

        let err = VisualExtractor::new(analyzer)
            .run(&raw, &ProviderConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Inference(_)));
    }
}
