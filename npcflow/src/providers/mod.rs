//! External collaborator contracts.
//!
//! Each backend (wiki scraper, text model, vision model, synthesis model)
//! implements one of these traits and is selected when the orchestrator is
//! built. Every call receives the same immutable [`ProviderConfig`].

mod resilient;
mod retry;
mod types;

pub use crate::config::ProviderConfig;
pub use resilient::Resilient;
pub use retry::{retry_transient, Backoff, BackoffStrategy, JitterStrategy, RetryConfig};
pub use types::{ScrapedPage, Subject, SynthesisResponse, TextAnalysis, TextRequest, VisualAnalysis};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ResilienceConfig;
use crate::core::{EntityId, TextPayload, VisualPayload};
use crate::errors::ProviderError;

/// Fetches an NPC's wiki page.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Fetches the page for `entity_id`.
    ///
    /// Returns [`ProviderError::NotFound`] when no page exists and
    /// [`ProviderError::Fetch`] on network or parse failure.
    async fn fetch(
        &self,
        entity_id: EntityId,
        config: &ProviderConfig,
    ) -> Result<ScrapedPage, ProviderError>;
}

/// Derives narrative attributes from page text.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    /// Analyzes the page markdown.
    async fn analyze_text(
        &self,
        request: &TextRequest,
        config: &ProviderConfig,
    ) -> Result<TextAnalysis, ProviderError>;
}

/// Derives visual attributes from an image.
#[async_trait]
pub trait VisualAnalyzer: Send + Sync {
    /// Analyzes the image at `media_ref`.
    ///
    /// Must return the degraded `no_image` analysis, not an error, when
    /// `media_ref` is `None`.
    async fn analyze_image(
        &self,
        subject: &Subject,
        media_ref: Option<&str>,
        config: &ProviderConfig,
    ) -> Result<VisualAnalysis, ProviderError>;
}

/// Merges text and visual analyses into one character.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Resolves conflicts and fills gaps between the two analyses.
    async fn synthesize(
        &self,
        subject: &Subject,
        text: &TextPayload,
        visual: &VisualPayload,
        config: &ProviderConfig,
    ) -> Result<SynthesisResponse, ProviderError>;
}

#[async_trait]
impl<T: Scraper + ?Sized> Scraper for Arc<T> {
    async fn fetch(
        &self,
        entity_id: EntityId,
        config: &ProviderConfig,
    ) -> Result<ScrapedPage, ProviderError> {
        (**self).fetch(entity_id, config).await
    }
}

#[async_trait]
impl<T: TextAnalyzer + ?Sized> TextAnalyzer for Arc<T> {
    async fn analyze_text(
        &self,
        request: &TextRequest,
        config: &ProviderConfig,
    ) -> Result<TextAnalysis, ProviderError> {
        (**self).analyze_text(request, config).await
    }
}

#[async_trait]
impl<T: VisualAnalyzer + ?Sized> VisualAnalyzer for Arc<T> {
    async fn analyze_image(
        &self,
        subject: &Subject,
        media_ref: Option<&str>,
        config: &ProviderConfig,
    ) -> Result<VisualAnalysis, ProviderError> {
        (**self).analyze_image(subject, media_ref, config).await
    }
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(
        &self,
        subject: &Subject,
        text: &TextPayload,
        visual: &VisualPayload,
        config: &ProviderConfig,
    ) -> Result<SynthesisResponse, ProviderError> {
        (**self).synthesize(subject, text, visual, config).await
    }
}

/// The four provider backends an orchestrator runs against.
#[derive(Clone)]
pub struct Providers {
    /// Wiki page source.
    pub scraper: Arc<dyn Scraper>,
    /// Text model.
    pub text: Arc<dyn TextAnalyzer>,
    /// Vision model.
    pub visual: Arc<dyn VisualAnalyzer>,
    /// Synthesis model.
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Providers {
    /// Wraps every backend in [`Resilient`] using `config`.
    #[must_use]
    pub fn resilient(self, config: &ResilienceConfig) -> Self {
        Self {
            scraper: Arc::new(Resilient::from_config(self.scraper, config)),
            text: Arc::new(Resilient::from_config(self.text, config)),
            visual: Arc::new(Resilient::from_config(self.visual, config)),
            synthesizer: Arc::new(Resilient::from_config(self.synthesizer, config)),
        }
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}
