//! Fixtures and a wired-up harness for pipeline tests.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::mocks::{
    ScriptedScraper, ScriptedSynthesizer, ScriptedTextAnalyzer, ScriptedVisualAnalyzer,
};
use crate::config::{PipelineConfig, StoreBackend};
use crate::core::{EntityId, RawPayload};
use crate::events::CollectingEventSink;
use crate::pipeline::Orchestrator;
use crate::providers::Providers;
use crate::store::{InMemoryRecordStore, RecordStore};

/// Base URL used for scripted wiki pages.
pub const WIKI_BASE: &str = "https://oldschool.runescape.wiki/w/";

/// Builds a raw payload for `entity_id` named `NPC_<id>`.
#[must_use]
pub fn raw_payload(entity_id: EntityId, media_refs: &[&str]) -> RawPayload {
    let name = format!("NPC {entity_id}");
    let markdown = page_markdown(&name);
    RawPayload {
        entity_id,
        page_url: format!("{WIKI_BASE}{}", name.replace(' ', "_")),
        name,
        variant: None,
        checksum: hex::encode(Sha256::digest(markdown.as_bytes())),
        markdown,
        media_refs: media_refs.iter().map(ToString::to_string).collect(),
        fetched_at: Utc::now(),
    }
}

/// Markdown body used for scripted pages.
#[must_use]
pub fn page_markdown(name: &str) -> String {
    format!("# {name}\n\n{name} is a resident of Lumbridge who greets every traveller.")
}

/// An orchestrator over an in-memory store and scripted providers.
pub struct TestHarness {
    /// The record store.
    pub store: Arc<dyn RecordStore>,
    /// Scripted scraper.
    pub scraper: Arc<ScriptedScraper>,
    /// Scripted text analyzer.
    pub text: Arc<ScriptedTextAnalyzer>,
    /// Scripted visual analyzer.
    pub visual: Arc<ScriptedVisualAnalyzer>,
    /// Scripted synthesizer.
    pub synthesizer: Arc<ScriptedSynthesizer>,
    /// Every emitted stage event.
    pub events: Arc<CollectingEventSink>,
    /// The orchestrator under test.
    pub orchestrator: Orchestrator,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Creates a harness with the default configuration and a memory store.
    #[must_use]
    pub fn new() -> Self {
        let mut config = PipelineConfig::default();
        config.database.backend = StoreBackend::Memory;
        Self::with_config(config)
    }

    /// Creates a harness with `config` and a memory store.
    #[must_use]
    pub fn with_config(config: PipelineConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryRecordStore::new()))
    }

    /// Creates a harness over an arbitrary store.
    #[must_use]
    pub fn with_store(config: PipelineConfig, store: Arc<dyn RecordStore>) -> Self {
        Self::assemble(config, store, ScriptedScraper::new())
    }

    /// Creates a harness whose scraper delays every call.
    #[must_use]
    pub fn with_scraper(config: PipelineConfig, scraper: ScriptedScraper) -> Self {
        Self::assemble(config, Arc::new(InMemoryRecordStore::new()), scraper)
    }

    fn assemble(
        config: PipelineConfig,
        store: Arc<dyn RecordStore>,
        scraper: ScriptedScraper,
    ) -> Self {
        let scraper = Arc::new(scraper);
        let text = Arc::new(ScriptedTextAnalyzer::new());
        let visual = Arc::new(ScriptedVisualAnalyzer::new());
        let synthesizer = Arc::new(ScriptedSynthesizer::new());
        let events = Arc::new(CollectingEventSink::new());

        let providers = Providers {
            scraper: scraper.clone(),
            text: text.clone(),
            visual: visual.clone(),
            synthesizer: synthesizer.clone(),
        };
        let orchestrator = Orchestrator::new(store.clone(), providers, events.clone(), &config);

        Self {
            store,
            scraper,
            text,
            visual,
            synthesizer,
            events,
            orchestrator,
        }
    }

    /// Scripts a wiki page for `entity_id` and returns the id.
    pub fn seed_page(&self, entity_id: u64, title: &str, media_refs: &[&str]) -> EntityId {
        let id = EntityId::new(entity_id);
        let name = title.replace('_', " ");
        self.scraper.push_page(
            id,
            &format!("{WIKI_BASE}{title}"),
            &page_markdown(&name),
            media_refs,
        );
        id
    }

    /// Total calls across all four providers.
    #[must_use]
    pub fn provider_calls(&self) -> usize {
        self.scraper.calls() + self.text.calls() + self.visual.calls() + self.synthesizer.calls()
    }
}
