//! Stage lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::core::{EntityId, Stage};
use crate::errors::FailureRecord;

/// Lifecycle point a [`StageEvent`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageEventKind {
    /// The extractor is about to run.
    Started,
    /// A persisted payload was reused.
    Cached,
    /// The extractor succeeded and the result was persisted.
    Succeeded,
    /// The extractor failed and the failure was persisted.
    Failed,
}

impl StageEventKind {
    /// Returns the dotted event type, e.g. `stage.started`.
    #[must_use]
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::Started => "stage.started",
            Self::Cached => "stage.cached",
            Self::Succeeded => "stage.succeeded",
            Self::Failed => "stage.failed",
        }
    }
}

impl fmt::Display for StageEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_type())
    }
}

/// An event emitted by the orchestrator at a stage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Lifecycle point.
    pub kind: StageEventKind,
    /// The NPC.
    pub entity_id: EntityId,
    /// The run that emitted the event.
    pub run_id: Uuid,
    /// The stage.
    pub stage: Stage,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Extra fields such as `duration_ms` or `error_kind`.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl StageEvent {
    /// Creates a new stage event.
    #[must_use]
    pub fn new(kind: StageEventKind, entity_id: EntityId, run_id: Uuid, stage: Stage) -> Self {
        Self {
            kind,
            entity_id,
            run_id,
            stage,
            timestamp: Utc::now(),
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn add_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Creates a `stage.started` event.
    #[must_use]
    pub fn started(entity_id: EntityId, run_id: Uuid, stage: Stage) -> Self {
        Self::new(StageEventKind::Started, entity_id, run_id, stage)
    }

    /// Creates a `stage.cached` event.
    #[must_use]
    pub fn cached(entity_id: EntityId, run_id: Uuid, stage: Stage) -> Self {
        Self::new(StageEventKind::Cached, entity_id, run_id, stage)
    }

    /// Creates a `stage.succeeded` event.
    #[must_use]
    pub fn succeeded(entity_id: EntityId, run_id: Uuid, stage: Stage, duration_ms: f64) -> Self {
        Self::new(StageEventKind::Succeeded, entity_id, run_id, stage)
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Creates a `stage.failed` event.
    #[must_use]
    pub fn failed(
        entity_id: EntityId,
        run_id: Uuid,
        stage: Stage,
        failure: &FailureRecord,
        duration_ms: f64,
    ) -> Self {
        Self::new(StageEventKind::Failed, entity_id, run_id, stage)
            .add_data("error_kind", serde_json::json!(failure.error_kind))
            .add_data("message", serde_json::json!(failure.message))
            .add_data("duration_ms", serde_json::json!(duration_ms))
    }

    /// Returns the dotted event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Converts the event to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.event_type()));
        map.insert("entity_id".to_string(), serde_json::json!(self.entity_id));
        map.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
        map.insert("stage".to_string(), serde_json::json!(self.stage));
        map.insert(
            "timestamp".to_string(),
            serde_json::json!(self.timestamp.to_rfc3339()),
        );

        if !self.data.is_empty() {
            let data_map: serde_json::Map<String, serde_json::Value> =
                self.data.clone().into_iter().collect();
            map.insert("data".to_string(), serde_json::Value::Object(data_map));
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_event_types() {
        let id = EntityId::new(1);
        let run_id = Uuid::now_v7();
        assert_eq!(StageEvent::started(id, run_id, Stage::Raw).event_type(), "stage.started");
        assert_eq!(StageEvent::cached(id, run_id, Stage::Raw).event_type(), "stage.cached");
        assert_eq!(
            StageEvent::succeeded(id, run_id, Stage::Raw, 1.0).event_type(),
            "stage.succeeded"
        );
    }

    #[test]
    fn test_failed_event_carries_error_kind() {
        let failure = FailureRecord::new(ErrorKind::Inference, "rate limited");
        let event = StageEvent::failed(EntityId::new(5), Uuid::now_v7(), Stage::Text, &failure, 3.0);

        assert_eq!(event.data.get("error_kind"), Some(&serde_json::json!("inference")));
        assert_eq!(event.data.get("message"), Some(&serde_json::json!("rate limited")));
    }

    #[test]
    fn test_event_to_dict() {
        let event = StageEvent::started(EntityId::new(42), Uuid::now_v7(), Stage::Visual)
            .add_data("attempt", serde_json::json!(1));

        let dict = event.to_dict();
        assert_eq!(dict.get("type"), Some(&serde_json::json!("stage.started")));
        assert_eq!(dict.get("entity_id"), Some(&serde_json::json!(42)));
        assert_eq!(dict.get("stage"), Some(&serde_json::json!("visual")));
        assert!(dict.contains_key("data"));
    }

    #[test]
    fn test_event_to_dict_without_data() {
        let event = StageEvent::cached(EntityId::new(1), Uuid::now_v7(), Stage::Raw);
        assert!(!event.to_dict().contains_key("data"));
    }
}
