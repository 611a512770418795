//! Event sink trait and implementations.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::event::{StageEvent, StageEventKind};

/// Trait for event sinks that receive stage events.
///
/// The orchestrator owns one sink, injected at construction.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: &StageEvent);

    /// Tries to emit an event without blocking.
    ///
    /// This method must never panic. Errors are logged and suppressed.
    fn try_emit(&self, event: &StageEvent);
}

/// A no-op event sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &StageEvent) {}

    fn try_emit(&self, _event: &StageEvent) {}
}

/// Writes events to the `tracing` log.
///
/// `stage.failed` logs at `warn` and `stage.succeeded` at `info`. Started and
/// cached events log at `debug` unless the sink is verbose.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink {
    verbose: bool,
}

impl LoggingEventSink {
    /// A sink that logs every event at `info` or above.
    #[must_use]
    pub fn verbose() -> Self {
        Self { verbose: true }
    }

    fn log_event(&self, event: &StageEvent) {
        macro_rules! log_with {
            ($level:ident) => {
                $level!(
                    entity_id = %event.entity_id,
                    run_id = %event.run_id,
                    stage = %event.stage,
                    data = ?event.data,
                    "{}",
                    event.kind
                )
            };
        }

        match event.kind {
            StageEventKind::Failed => log_with!(warn),
            StageEventKind::Succeeded => log_with!(info),
            StageEventKind::Started | StageEventKind::Cached if self.verbose => log_with!(info),
            StageEventKind::Started | StageEventKind::Cached => log_with!(debug),
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &StageEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &StageEvent) {
        self.log_event(event);
    }
}

/// A collecting event sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<StageEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events of the given kind.
    #[must_use]
    pub fn events_of_kind(&self, kind: StageEventKind) -> Vec<StageEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Returns the event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(StageEvent::event_type).collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &StageEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &StageEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityId, Stage};
    use uuid::Uuid;

    fn event(kind: StageEventKind) -> StageEvent {
        StageEvent::new(kind, EntityId::new(1), Uuid::now_v7(), Stage::Raw)
    }

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit(&event(StageEventKind::Started)).await;
        sink.try_emit(&event(StageEventKind::Failed));
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::verbose();
        sink.emit(&event(StageEventKind::Succeeded)).await;
        sink.try_emit(&event(StageEventKind::Failed));
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&event(StageEventKind::Started)).await;
        sink.try_emit(&event(StageEventKind::Succeeded));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.event_types(), vec!["stage.started", "stage.succeeded"]);
    }

    #[tokio::test]
    async fn test_collecting_sink_filter_and_clear() {
        let sink = CollectingEventSink::new();
        sink.emit(&event(StageEventKind::Cached)).await;
        sink.emit(&event(StageEventKind::Cached)).await;
        sink.emit(&event(StageEventKind::Failed)).await;

        assert_eq!(sink.events_of_kind(StageEventKind::Cached).len(), 2);
        assert_eq!(sink.events_of_kind(StageEventKind::Failed).len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
