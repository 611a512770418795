//! Scripted providers for testing.
//!
//! Each mock answers from a per-entity script and falls back to a default
//! response. Scripted responses are consumed in order; the last one stays
//! in place and keeps being returned.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{EntityId, TextAttributes, TextPayload, VisualAttributes, VisualPayload};
use crate::errors::ProviderError;
use crate::providers::{
    ProviderConfig, ScrapedPage, Scraper, Subject, SynthesisResponse, Synthesizer,
    TextAnalysis, TextAnalyzer, TextRequest, VisualAnalysis, VisualAnalyzer,
};

type Scripted<T> = Result<T, ProviderError>;

/// Per-entity response queues with call counting.
#[derive(Debug)]
struct Script<T> {
    responses: Mutex<HashMap<EntityId, VecDeque<Scripted<T>>>>,
    calls: AtomicUsize,
    calls_by_entity: Mutex<HashMap<EntityId, usize>>,
    delay: Option<Duration>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            calls_by_entity: Mutex::new(HashMap::new()),
            delay: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn push(&self, entity_id: EntityId, response: Scripted<T>) {
        self.responses
            .lock()
            .entry(entity_id)
            .or_default()
            .push_back(response);
    }

    fn clear(&self, entity_id: EntityId) {
        self.responses.lock().remove(&entity_id);
    }

    async fn next(&self, entity_id: EntityId) -> Option<Scripted<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.calls_by_entity.lock().entry(entity_id).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self.responses.lock();
        let queue = responses.get_mut(&entity_id)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn calls_for(&self, entity_id: EntityId) -> usize {
        self.calls_by_entity
            .lock()
            .get(&entity_id)
            .copied()
            .unwrap_or(0)
    }
}

/// A scraper serving scripted pages. Unknown entities are not found.
#[derive(Debug, Default)]
pub struct ScriptedScraper {
    script: Script<ScrapedPage>,
}

impl ScriptedScraper {
    /// Creates an empty scraper.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    /// Scripts a page for `entity_id`.
    pub fn push_page(&self, entity_id: EntityId, page_url: &str, markdown: &str, media_refs: &[&str]) {
        self.push_result(
            entity_id,
            Ok(ScrapedPage {
                page_url: page_url.to_string(),
                markdown: markdown.to_string(),
                media_refs: media_refs.iter().map(ToString::to_string).collect(),
            }),
        );
    }

    /// Scripts an arbitrary response for `entity_id`.
    pub fn push_result(&self, entity_id: EntityId, result: Result<ScrapedPage, ProviderError>) {
        self.script.push(entity_id, result);
    }

    /// Drops every scripted response for `entity_id`.
    pub fn clear(&self, entity_id: EntityId) {
        self.script.clear(entity_id);
    }

    /// Total calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Calls for one entity.
    #[must_use]
    pub fn calls_for(&self, entity_id: EntityId) -> usize {
        self.script.calls_for(entity_id)
    }
}

#[async_trait]
impl Scraper for ScriptedScraper {
    async fn fetch(
        &self,
        entity_id: EntityId,
        _config: &ProviderConfig,
    ) -> Result<ScrapedPage, ProviderError> {
        self.script
            .next(entity_id)
            .await
            .unwrap_or(Err(ProviderError::NotFound(entity_id)))
    }
}

/// A text analyzer with a fixed default confidence.
#[derive(Debug)]
pub struct ScriptedTextAnalyzer {
    script: Script<TextAnalysis>,
    confidence: f64,
}

impl Default for ScriptedTextAnalyzer {
    fn default() -> Self {
        Self {
            script: Script::default(),
            confidence: 0.85,
        }
    }
}

impl ScriptedTextAnalyzer {
    /// Creates an analyzer answering with confidence 0.85.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Scripts a response for `entity_id`.
    pub fn respond_for(&self, entity_id: EntityId, result: Result<TextAnalysis, ProviderError>) {
        self.script.push(entity_id, result);
    }

    /// Scripts a failure for `entity_id`.
    pub fn fail_for(&self, entity_id: EntityId, error: ProviderError) {
        self.respond_for(entity_id, Err(error));
    }

    /// Drops every scripted response for `entity_id`.
    pub fn clear(&self, entity_id: EntityId) {
        self.script.clear(entity_id);
    }

    /// Total calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Calls for one entity.
    #[must_use]
    pub fn calls_for(&self, entity_id: EntityId) -> usize {
        self.script.calls_for(entity_id)
    }

    fn default_analysis(&self, request: &TextRequest) -> TextAnalysis {
        TextAnalysis {
            attributes: TextAttributes {
                personality_traits: "steady, curious".to_string(),
                occupation: format!("{} of the realm", request.subject.name),
                social_role: "townsfolk".to_string(),
                dialogue_patterns: "short, plain sentences".to_string(),
                emotional_range: "calm".to_string(),
                background_lore: request.markdown.lines().next().unwrap_or_default().to_string(),
            },
            confidence: self.confidence,
            reasoning: "scripted".to_string(),
        }
    }
}

#[async_trait]
impl TextAnalyzer for ScriptedTextAnalyzer {
    async fn analyze_text(
        &self,
        request: &TextRequest,
        _config: &ProviderConfig,
    ) -> Result<TextAnalysis, ProviderError> {
        self.script
            .next(request.subject.entity_id)
            .await
            .unwrap_or_else(|| Ok(self.default_analysis(request)))
    }
}

/// A visual analyzer with a fixed default confidence.
#[derive(Debug)]
pub struct ScriptedVisualAnalyzer {
    script: Script<VisualAnalysis>,
    confidence: f64,
}

impl Default for ScriptedVisualAnalyzer {
    fn default() -> Self {
        Self {
            script: Script::default(),
            confidence: 0.75,
        }
    }
}

impl ScriptedVisualAnalyzer {
    /// Creates an analyzer answering with confidence 0.75.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default confidence.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Scripts a response for `entity_id`.
    pub fn respond_for(&self, entity_id: EntityId, result: Result<VisualAnalysis, ProviderError>) {
        self.script.push(entity_id, result);
    }

    /// Scripts a failure for `entity_id`.
    pub fn fail_for(&self, entity_id: EntityId, error: ProviderError) {
        self.respond_for(entity_id, Err(error));
    }

    /// Drops every scripted response for `entity_id`.
    pub fn clear(&self, entity_id: EntityId) {
        self.script.clear(entity_id);
    }

    /// Total calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Calls for one entity.
    #[must_use]
    pub fn calls_for(&self, entity_id: EntityId) -> usize {
        self.script.calls_for(entity_id)
    }
}

#[async_trait]
impl VisualAnalyzer for ScriptedVisualAnalyzer {
    async fn analyze_image(
        &self,
        subject: &Subject,
        media_ref: Option<&str>,
        _config: &ProviderConfig,
    ) -> Result<VisualAnalysis, ProviderError> {
        let Some(media_ref) = media_ref else {
            return Ok(VisualAnalysis::no_image("no image supplied"));
        };
        self.script
            .next(subject.entity_id)
            .await
            .unwrap_or_else(|| {
                Ok(VisualAnalysis {
                    attributes: VisualAttributes {
                        age_category: "adult".to_string(),
                        build_type: "average".to_string(),
                        attire_style: "work clothes".to_string(),
                        distinctive_features: format!("as seen in {media_ref}"),
                        color_palette: "brown, grey".to_string(),
                        visual_archetype: "commoner".to_string(),
                    },
                    confidence: self.confidence,
                    reasoning: "scripted".to_string(),
                    no_image: false,
                })
            })
    }
}

/// A synthesizer with a fixed default response.
#[derive(Debug, Default)]
pub struct ScriptedSynthesizer {
    script: Script<SynthesisResponse>,
}

impl ScriptedSynthesizer {
    /// Creates a synthesizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a response for `entity_id`.
    pub fn respond_for(
        &self,
        entity_id: EntityId,
        result: Result<SynthesisResponse, ProviderError>,
    ) {
        self.script.push(entity_id, result);
    }

    /// Scripts a failure for `entity_id`.
    pub fn fail_for(&self, entity_id: EntityId, error: ProviderError) {
        self.respond_for(entity_id, Err(error));
    }

    /// Drops every scripted response for `entity_id`.
    pub fn clear(&self, entity_id: EntityId) {
        self.script.clear(entity_id);
    }

    /// Total calls.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.calls()
    }

    /// Calls for one entity.
    #[must_use]
    pub fn calls_for(&self, entity_id: EntityId) -> usize {
        self.script.calls_for(entity_id)
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(
        &self,
        subject: &Subject,
        _text: &TextPayload,
        visual: &VisualPayload,
        _config: &ProviderConfig,
    ) -> Result<SynthesisResponse, ProviderError> {
        self.script
            .next(subject.entity_id)
            .await
            .unwrap_or_else(|| {
                Ok(SynthesisResponse {
                    archetype: "humble villager".to_string(),
                    conflict_resolution: "none".to_string(),
                    gap_filling: if visual.no_image {
                        "appearance inferred from text".to_string()
                    } else {
                        "none".to_string()
                    },
                })
            })
    }
}
