//! Timeout and retry decorator for providers.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use super::retry::{retry_transient, RetryConfig};
use super::{
    ProviderConfig, Scraper, Subject, SynthesisResponse, Synthesizer, TextAnalysis,
    TextAnalyzer, TextRequest, VisualAnalysis, VisualAnalyzer, ScrapedPage,
};
use crate::config::ResilienceConfig;
use crate::core::{EntityId, TextPayload, VisualPayload};
use crate::errors::ProviderError;

/// Wraps a provider with a per-call timeout and retries of transient errors.
///
/// A timed-out fetch surfaces as [`ProviderError::Fetch`]; a timed-out
/// inference call as [`ProviderError::Inference`]. [`ProviderError::NotFound`]
/// is never retried.
#[derive(Debug, Clone)]
pub struct Resilient<P> {
    inner: P,
    timeout: Duration,
    retry: RetryConfig,
}

impl<P> Resilient<P> {
    /// Wraps `inner` with an explicit timeout and retry policy.
    #[must_use]
    pub fn new(inner: P, timeout: Duration, retry: RetryConfig) -> Self {
        Self {
            inner,
            timeout,
            retry,
        }
    }

    /// Wraps `inner` using the configured resilience settings.
    #[must_use]
    pub fn from_config(inner: P, config: &ResilienceConfig) -> Self {
        Self::new(inner, config.call_timeout(), config.retry.clone())
    }

    /// Returns the wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }

    async fn call<T, F, Fut>(
        &self,
        operation: &str,
        on_timeout: fn(String) -> ProviderError,
        mut call: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let timeout = self.timeout;
        retry_transient(&self.retry, operation, || {
            let fut = call();
            async move {
                tokio::time::timeout(timeout, fut).await.unwrap_or_else(|_| {
                    Err(on_timeout(format!(
                        "{operation} timed out after {}ms",
                        timeout.as_millis()
                    )))
                })
            }
        })
        .await
    }
}

#[async_trait]
impl<P: Scraper> Scraper for Resilient<P> {
    async fn fetch(
        &self,
        entity_id: EntityId,
        config: &ProviderConfig,
    ) -> Result<ScrapedPage, ProviderError> {
        self.call("fetch", ProviderError::Fetch, || {
            self.inner.fetch(entity_id, config)
        })
        .await
    }
}

#[async_trait]
impl<P: TextAnalyzer> TextAnalyzer for Resilient<P> {
    async fn analyze_text(
        &self,
        request: &TextRequest,
        config: &ProviderConfig,
    ) -> Result<TextAnalysis, ProviderError> {
        self.call("analyze_text", ProviderError::Inference, || {
            self.inner.analyze_text(request, config)
        })
        .await
    }
}

#[async_trait]
impl<P: VisualAnalyzer> VisualAnalyzer for Resilient<P> {
    async fn analyze_image(
        &self,
        subject: &Subject,
        media_ref: Option<&str>,
        config: &ProviderConfig,
    ) -> Result<VisualAnalysis, ProviderError> {
        self.call("analyze_image", ProviderError::Inference, || {
            self.inner.analyze_image(subject, media_ref, config)
        })
        .await
    }
}

#[async_trait]
impl<P: Synthesizer> Synthesizer for Resilient<P> {
    async fn synthesize(
        &self,
        subject: &Subject,
        text: &TextPayload,
        visual: &VisualPayload,
        config: &ProviderConfig,
    ) -> Result<SynthesisResponse, ProviderError> {
        self.call("synthesize", ProviderError::Inference, || {
            self.inner.synthesize(subject, text, visual, config)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::JitterStrategy;
    use crate::testing::mocks::ScriptedScraper;

    fn fast_retry(attempts: usize) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(attempts)
            .with_base_delay_ms(1)
            .with_jitter(JitterStrategy::None)
    }

    #[tokio::test]
    async fn test_transient_fetch_error_is_retried() {
        let scraper = ScriptedScraper::new();
        scraper.push_result(
            EntityId::new(1),
            Err(ProviderError::fetch("connection reset")),
        );
        scraper.push_page(EntityId::new(1), "https://wiki/w/Bob", "Bob is a man.", &[]);

        let resilient = Resilient::new(scraper, Duration::from_secs(1), fast_retry(3));
        let page = resilient
            .fetch(EntityId::new(1), &ProviderConfig::default())
            .await
            .unwrap();

        assert_eq!(page.markdown, "Bob is a man.");
        assert_eq!(resilient.inner().calls(), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let scraper = ScriptedScraper::new();
        scraper.push_result(
            EntityId::new(2),
            Err(ProviderError::NotFound(EntityId::new(2))),
        );

        let resilient = Resilient::new(scraper, Duration::from_secs(1), fast_retry(3));
        let err = resilient
            .fetch(EntityId::new(2), &ProviderConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::NotFound(_)));
        assert_eq!(resilient.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_fetch_error() {
        let scraper = ScriptedScraper::new().with_delay(Duration::from_millis(200));
        scraper.push_page(EntityId::new(3), "https://wiki/w/Slow", "slow", &[]);

        let resilient = Resilient::new(scraper, Duration::from_millis(10), fast_retry(1));
        let err = resilient
            .fetch(EntityId::new(3), &ProviderConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Fetch(ref m) if m.contains("timed out")));
    }
}
