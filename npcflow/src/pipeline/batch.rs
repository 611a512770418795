//! Batch results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{EntityId, PipelineRun};
use crate::errors::NpcflowError;

/// Counts over one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Distinct entities processed.
    pub total: usize,
    /// Entities that reached `Complete`.
    pub complete: usize,
    /// Entities whose run stopped on a stage failure or cancellation.
    pub halted: usize,
    /// Entities whose run returned an error.
    pub errored: usize,
}

/// Per-entity results of a batch, in first-occurrence order.
#[derive(Debug, Default)]
pub struct BatchReport {
    order: Vec<EntityId>,
    results: BTreeMap<EntityId, Result<PipelineRun, NpcflowError>>,
}

impl BatchReport {
    pub(crate) fn new(
        order: Vec<EntityId>,
        results: impl IntoIterator<Item = (EntityId, Result<PipelineRun, NpcflowError>)>,
    ) -> Self {
        Self {
            order,
            results: results.into_iter().collect(),
        }
    }

    /// Entity ids in the order they were submitted, without duplicates.
    #[must_use]
    pub fn entity_ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Result for one entity.
    #[must_use]
    pub fn get(&self, entity_id: EntityId) -> Option<&Result<PipelineRun, NpcflowError>> {
        self.results.get(&entity_id)
    }

    /// Successful run for one entity, complete or halted.
    #[must_use]
    pub fn run(&self, entity_id: EntityId) -> Option<&PipelineRun> {
        self.get(entity_id).and_then(|r| r.as_ref().ok())
    }

    /// Iterates results in submission order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Result<PipelineRun, NpcflowError>)> {
        self.order
            .iter()
            .filter_map(|id| self.results.get(id).map(|r| (*id, r)))
    }

    /// Ids whose run returned an error.
    #[must_use]
    pub fn errors(&self) -> Vec<(EntityId, &NpcflowError)> {
        self.iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id, e)))
            .collect()
    }

    /// Number of entities in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the batch was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns true if every entity reached `Complete`.
    #[must_use]
    pub fn all_complete(&self) -> bool {
        let summary = self.summary();
        summary.complete == summary.total
    }

    /// Aggregated counts.
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.order.len(),
            ..BatchSummary::default()
        };
        for (_, result) in self.iter() {
            match result {
                Ok(run) if run.is_complete() => summary.complete += 1,
                Ok(_) => summary.halted += 1,
                Err(_) => summary.errored += 1,
            }
        }
        summary
    }
}
