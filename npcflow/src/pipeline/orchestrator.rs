//! Per-entity stage orchestration.
//!
//! The [`Orchestrator`] walks `Raw → Text → Visual → Synthesis` for one
//! entity, skipping stages whose successful payload is already persisted
//! and writing every stage result to the [`RecordStore`] before moving on.
//! A stage failure is persisted in the stage's slot and halts that entity;
//! only storage errors and invalid arguments escape as [`NpcflowError`].

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::batch::BatchReport;
use super::gate::should_run;
use crate::cancellation::CancellationToken;
use crate::config::{PipelineConfig, ProviderConfig};
use crate::core::{
    CharacterProfile, EntityId, HaltReason, PipelineRecord, PipelineRun, PipelineStatus, Stage,
    StageData, StageOutcome, StageSlot,
};
use crate::errors::{FailureRecord, NpcflowError};
use crate::events::{EventSink, LoggingEventSink, StageEvent};
use crate::extractors::{
    Extractor, RawExtractor, SynthesisExtractor, SynthesisInput, TextExtractor, VisualExtractor,
};
use crate::observability::SpanTimer;
use crate::providers::{Providers, Scraper, Subject, Synthesizer, TextAnalyzer, VisualAnalyzer};
use crate::store::RecordStore;

/// Result of one stage step.
enum Step<T> {
    Continue(T),
    Halt(HaltReason),
}

/// Per-run values shared by every stage step.
struct RunScope<'a> {
    entity_id: EntityId,
    run_id: Uuid,
    force_refresh_from: Option<Stage>,
    cancel: &'a CancellationToken,
}

/// Drives entities through the stage sequence.
pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    raw: RawExtractor,
    text: TextExtractor,
    visual: VisualExtractor,
    synthesis: SynthesisExtractor,
    provider_config: Arc<ProviderConfig>,
    events: Arc<dyn EventSink>,
    max_concurrency: usize,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("raw", &self.raw)
            .field("text", &self.text)
            .field("visual", &self.visual)
            .field("synthesis", &self.synthesis)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator without validating `config`.
    ///
    /// Prefer [`Orchestrator::builder`], which validates.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        providers: Providers,
        events: Arc<dyn EventSink>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            raw: RawExtractor::new(providers.scraper),
            text: TextExtractor::new(providers.text, config.quality.low_confidence),
            visual: VisualExtractor::new(providers.visual),
            synthesis: SynthesisExtractor::new(providers.synthesizer, &config.quality),
            provider_config: Arc::new(config.provider.clone()),
            events,
            max_concurrency: config.batch.max_concurrency.max(1),
        }
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// The record store this orchestrator writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// The configuration passed to every provider call.
    #[must_use]
    pub fn provider_config(&self) -> &ProviderConfig {
        &self.provider_config
    }

    /// Runs the pipeline for one entity.
    ///
    /// Stages with a persisted successful payload are skipped unless
    /// `force_refresh_from` targets them or an earlier stage.
    ///
    /// # Errors
    ///
    /// Returns [`NpcflowError::InvalidRefreshTarget`] for a refresh target
    /// without a slot, and [`NpcflowError::Storage`] if the store fails.
    /// Stage failures are reported through [`PipelineRun::halt`].
    pub async fn run_pipeline(
        &self,
        entity_id: EntityId,
        force_refresh_from: Option<Stage>,
    ) -> Result<PipelineRun, NpcflowError> {
        self.run_pipeline_with_cancel(entity_id, force_refresh_from, &CancellationToken::new())
            .await
    }

    /// Runs the pipeline for one entity, checking `cancel` before each stage.
    ///
    /// A stage already in flight finishes and is persisted; cancellation
    /// then returns a run halted with [`HaltReason::Cancelled`].
    pub async fn run_pipeline_with_cancel(
        &self,
        entity_id: EntityId,
        force_refresh_from: Option<Stage>,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, NpcflowError> {
        let run_id = Uuid::now_v7();
        let span = info_span!("pipeline", entity_id = %entity_id, run_id = %run_id);
        let scope = RunScope {
            entity_id,
            run_id,
            force_refresh_from,
            cancel,
        };
        self.execute(scope).instrument(span).await
    }

    async fn execute(&self, scope: RunScope<'_>) -> Result<PipelineRun, NpcflowError> {
        let entity_id = scope.entity_id;
        let mut record = match scope.force_refresh_from {
            Some(stage) if !stage.has_slot() => {
                return Err(NpcflowError::InvalidRefreshTarget(stage));
            }
            Some(stage) => {
                info!(entity_id = %entity_id, stage = %stage, "Force refresh");
                self.store.reset_from(entity_id, stage).await?
            }
            None => self.store.create_if_absent(entity_id).await?,
        };

        let timer = SpanTimer::start("pipeline");
        let mut outcomes = Vec::with_capacity(Stage::EXTRACTION_ORDER.len());
        let halt = self.drive(&scope, &mut record, &mut outcomes).await?;

        match &halt {
            None => info!(
                entity_id = %entity_id,
                run_id = %scope.run_id,
                stage = %record.stage,
                duration_ms = timer.finish(),
                "Pipeline complete"
            ),
            Some(reason) => warn!(
                entity_id = %entity_id,
                run_id = %scope.run_id,
                stage = %record.stage,
                duration_ms = timer.finish(),
                "Pipeline halted: {reason}"
            ),
        }

        Ok(PipelineRun {
            run_id: scope.run_id,
            record,
            outcomes,
            halt,
        })
    }

    async fn drive(
        &self,
        scope: &RunScope<'_>,
        record: &mut PipelineRecord,
        outcomes: &mut Vec<StageOutcome>,
    ) -> Result<Option<HaltReason>, NpcflowError> {
        let raw = match self
            .step(scope, record, &self.raw, &scope.entity_id, outcomes)
            .await?
        {
            Step::Continue(payload) => payload,
            Step::Halt(reason) => return Ok(Some(reason)),
        };

        let text = match self.step(scope, record, &self.text, &raw, outcomes).await? {
            Step::Continue(payload) => payload,
            Step::Halt(reason) => return Ok(Some(reason)),
        };

        let visual = match self.step(scope, record, &self.visual, &raw, outcomes).await? {
            Step::Continue(payload) => payload,
            Step::Halt(reason) => return Ok(Some(reason)),
        };

        let input = SynthesisInput {
            subject: Subject::from(&raw),
            text,
            visual,
        };
        match self
            .step(scope, record, &self.synthesis, &input, outcomes)
            .await?
        {
            Step::Continue(_) => Ok(None),
            Step::Halt(reason) => Ok(Some(reason)),
        }
    }

    async fn step<E: Extractor>(
        &self,
        scope: &RunScope<'_>,
        record: &mut PipelineRecord,
        extractor: &E,
        input: &E::Input,
        outcomes: &mut Vec<StageOutcome>,
    ) -> Result<Step<E::Output>, NpcflowError> {
        let stage = extractor.stage();
        let entity_id = scope.entity_id;

        if let Some(reason) = scope.cancel.checkpoint() {
            info!(entity_id = %entity_id, stage = %stage, "Cancelled before stage");
            return Ok(Step::Halt(HaltReason::Cancelled {
                reason,
                next_stage: stage,
            }));
        }

        if !should_run(record, stage, scope.force_refresh_from) {
            if let Some(payload) = record.payload::<E::Output>().cloned() {
                debug!(entity_id = %entity_id, stage = %stage, "Stage cached");
                self.events
                    .emit(&StageEvent::cached(entity_id, scope.run_id, stage))
                    .await;
                outcomes.push(StageOutcome::cached(
                    stage,
                    payload.clone().into_stage_payload(),
                    payload.quality(),
                ));
                return Ok(Step::Continue(payload));
            }
        }

        self.events
            .emit(&StageEvent::started(entity_id, scope.run_id, stage))
            .await;
        let timer = SpanTimer::start(stage.as_str());
        let result = extractor.run(input, &self.provider_config).await;
        let duration_ms = timer.finish();

        match result {
            Ok(payload) => {
                *<E::Output as StageData>::slot_mut(record) =
                    Some(StageSlot::succeeded(payload.clone()));
                if record.stage < stage {
                    record.advance_to(stage)?;
                }
                if stage.next() == Some(Stage::Complete) {
                    record.advance_to(Stage::Complete)?;
                }
                *record = self.store.upsert(record).await?;

                info!(
                    entity_id = %entity_id,
                    run_id = %scope.run_id,
                    stage = %stage,
                    duration_ms,
                    "Stage succeeded"
                );
                self.events
                    .emit(&StageEvent::succeeded(entity_id, scope.run_id, stage, duration_ms))
                    .await;

                let quality = payload.quality();
                outcomes.push(
                    StageOutcome::succeeded(stage, payload.clone().into_stage_payload(), quality)
                        .with_duration(duration_ms),
                );
                Ok(Step::Continue(payload))
            }
            Err(err) => {
                let failure = FailureRecord::from(&err);
                *<E::Output as StageData>::slot_mut(record) =
                    Some(StageSlot::Failed(failure.clone()));
                *record = self.store.upsert(record).await?;

                warn!(
                    entity_id = %entity_id,
                    run_id = %scope.run_id,
                    stage = %stage,
                    error_kind = %failure.error_kind,
                    duration_ms,
                    "Stage failed: {}", failure.message
                );
                self.events
                    .emit(&StageEvent::failed(
                        entity_id,
                        scope.run_id,
                        stage,
                        &failure,
                        duration_ms,
                    ))
                    .await;

                let halt = HaltReason::StageFailed {
                    stage,
                    kind: failure.error_kind,
                    message: failure.message.clone(),
                };
                outcomes.push(StageOutcome::failed(stage, failure).with_duration(duration_ms));
                Ok(Step::Halt(halt))
            }
        }
    }

    /// Runs many entities concurrently, up to `batch.max_concurrency`.
    ///
    /// Duplicate ids run once. One entity's error never aborts the others.
    pub async fn run_batch(
        &self,
        entity_ids: &[EntityId],
        force_refresh_from: Option<Stage>,
    ) -> BatchReport {
        self.run_batch_with_cancel(entity_ids, force_refresh_from, &CancellationToken::new())
            .await
    }

    /// [`Orchestrator::run_batch`] with a shared cancellation token.
    pub async fn run_batch_with_cancel(
        &self,
        entity_ids: &[EntityId],
        force_refresh_from: Option<Stage>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let mut seen = HashSet::new();
        let order: Vec<EntityId> = entity_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        info!(
            entities = order.len(),
            max_concurrency = self.max_concurrency,
            "Starting batch"
        );

        let results: Vec<_> = stream::iter(order.iter().copied())
            .map(|entity_id| async move {
                let result = self
                    .run_pipeline_with_cancel(entity_id, force_refresh_from, cancel)
                    .await;
                if let Err(e) = &result {
                    warn!(entity_id = %entity_id, error = %e, "Entity run failed");
                }
                (entity_id, result)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let report = BatchReport::new(order, results);
        let summary = report.summary();
        info!(
            total = summary.total,
            complete = summary.complete,
            halted = summary.halted,
            errored = summary.errored,
            "Batch finished"
        );
        report
    }

    /// Runs a batch over every stored record that is not `Complete`.
    ///
    /// # Errors
    ///
    /// Returns [`NpcflowError::Storage`] if the records cannot be listed.
    pub async fn resume_incomplete(&self) -> Result<BatchReport, NpcflowError> {
        let pending: Vec<EntityId> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|record| !record.is_complete())
            .map(|record| record.entity_id)
            .collect();
        info!(entities = pending.len(), "Resuming incomplete records");
        Ok(self.run_batch(&pending, None).await)
    }

    /// Summarizes the stored record for `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns [`NpcflowError::Storage`] if the store fails.
    pub async fn status(&self, entity_id: EntityId) -> Result<PipelineStatus, NpcflowError> {
        Ok(self
            .store
            .get(entity_id)
            .await?
            .map_or_else(|| PipelineStatus::missing(entity_id), |r| PipelineStatus::from(&r)))
    }

    /// Returns the persisted profile for `entity_id`, if synthesized.
    ///
    /// # Errors
    ///
    /// Returns [`NpcflowError::Storage`] if the store fails.
    pub async fn profile(
        &self,
        entity_id: EntityId,
    ) -> Result<Option<CharacterProfile>, NpcflowError> {
        Ok(self
            .store
            .get(entity_id)
            .await?
            .and_then(|record| record.profile().cloned()))
    }
}

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    store: Option<Arc<dyn RecordStore>>,
    scraper: Option<Arc<dyn Scraper>>,
    text_analyzer: Option<Arc<dyn TextAnalyzer>>,
    visual_analyzer: Option<Arc<dyn VisualAnalyzer>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    events: Option<Arc<dyn EventSink>>,
    config: PipelineConfig,
    resilient: bool,
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("has_store", &self.store.is_some())
            .field("has_scraper", &self.scraper.is_some())
            .field("has_text_analyzer", &self.text_analyzer.is_some())
            .field("has_visual_analyzer", &self.visual_analyzer.is_some())
            .field("has_synthesizer", &self.synthesizer.is_some())
            .field("config", &self.config)
            .field("resilient", &self.resilient)
            .finish()
    }
}

impl OrchestratorBuilder {
    /// Creates an empty builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the page scraper.
    #[must_use]
    pub fn scraper(mut self, scraper: Arc<dyn Scraper>) -> Self {
        self.scraper = Some(scraper);
        self
    }

    /// Sets the text analyzer.
    #[must_use]
    pub fn text_analyzer(mut self, analyzer: Arc<dyn TextAnalyzer>) -> Self {
        self.text_analyzer = Some(analyzer);
        self
    }

    /// Sets the visual analyzer.
    #[must_use]
    pub fn visual_analyzer(mut self, analyzer: Arc<dyn VisualAnalyzer>) -> Self {
        self.visual_analyzer = Some(analyzer);
        self
    }

    /// Sets the synthesizer.
    #[must_use]
    pub fn synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Sets all four providers at once.
    #[must_use]
    pub fn providers(self, providers: Providers) -> Self {
        self.scraper(providers.scraper)
            .text_analyzer(providers.text)
            .visual_analyzer(providers.visual)
            .synthesizer(providers.synthesizer)
    }

    /// Sets the event sink. Defaults to [`LoggingEventSink`].
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Wraps every provider with the configured timeout and retry policy.
    #[must_use]
    pub fn resilient(mut self, enabled: bool) -> Self {
        self.resilient = enabled;
        self
    }

    /// Validates the configuration and builds the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`NpcflowError::Config`] if the configuration is invalid or a
    /// store or provider is missing.
    pub fn build(self) -> Result<Orchestrator, NpcflowError> {
        self.config.validate()?;

        let store = self.store.ok_or_else(|| missing("record store"))?;
        let providers = Providers {
            scraper: self.scraper.ok_or_else(|| missing("scraper"))?,
            text: self.text_analyzer.ok_or_else(|| missing("text analyzer"))?,
            visual: self.visual_analyzer.ok_or_else(|| missing("visual analyzer"))?,
            synthesizer: self.synthesizer.ok_or_else(|| missing("synthesizer"))?,
        };
        let providers = if self.resilient {
            providers.resilient(&self.config.resilience)
        } else {
            providers
        };
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(LoggingEventSink::default()));

        Ok(Orchestrator::new(store, providers, events, &self.config))
    }
}

fn missing(what: &str) -> NpcflowError {
    NpcflowError::Config(format!("orchestrator requires a {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRecordStore;
    use crate::testing::{
        ScriptedScraper, ScriptedSynthesizer, ScriptedTextAnalyzer, ScriptedVisualAnalyzer,
    };

    fn full_builder() -> OrchestratorBuilder {
        Orchestrator::builder()
            .store(Arc::new(InMemoryRecordStore::new()))
            .scraper(Arc::new(ScriptedScraper::new()))
            .text_analyzer(Arc::new(ScriptedTextAnalyzer::new()))
            .visual_analyzer(Arc::new(ScriptedVisualAnalyzer::new()))
            .synthesizer(Arc::new(ScriptedSynthesizer::new()))
    }

    #[test]
    fn test_build_requires_every_provider() {
        let err = Orchestrator::builder()
            .store(Arc::new(InMemoryRecordStore::new()))
            .scraper(Arc::new(ScriptedScraper::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, NpcflowError::Config(ref msg) if msg.contains("text analyzer")));
    }

    #[test]
    fn test_build_validates_config() {
        let mut config = PipelineConfig::default();
        config.batch.max_concurrency = 0;
        let err = full_builder().config(config).build().unwrap_err();
        assert!(matches!(err, NpcflowError::Config(_)));
    }

    #[test]
    fn test_build_with_resilience() {
        let orchestrator = full_builder().resilient(true).build().unwrap();
        assert_eq!(orchestrator.max_concurrency, 4);
        assert_eq!(orchestrator.provider_config().model, "gemini-2.5-flash");
    }

    #[tokio::test]
    async fn test_status_of_unknown_entity() {
        let orchestrator = full_builder().build().unwrap();
        let status = orchestrator.status(EntityId::new(404)).await.unwrap();
        assert!(!status.exists);
        assert_eq!(status.stage, Stage::None);
        assert!(orchestrator
            .profile(EntityId::new(404))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rejects_slotless_refresh_target() {
        let orchestrator = full_builder().build().unwrap();
        for stage in [Stage::None, Stage::Complete] {
            let err = orchestrator
                .run_pipeline(EntityId::new(1), Some(stage))
                .await
                .unwrap_err();
            assert!(matches!(err, NpcflowError::InvalidRefreshTarget(s) if s == stage));
        }
        assert!(orchestrator.store().list().await.unwrap().is_empty());
    }
}
