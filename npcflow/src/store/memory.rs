//! In-memory record store.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{apply_reset, RecordStore};
use crate::core::{EntityId, PipelineRecord, Stage};
use crate::errors::StorageError;

/// Volatile store backed by a [`DashMap`].
///
/// Writes go through the entry API, so each one holds the entity's shard
/// lock for its whole read-merge-write.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: DashMap<EntityId, PipelineRecord>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replaces a record wholesale, bypassing merge rules.
    pub fn insert_raw(&self, record: PipelineRecord) {
        self.records.insert(record.entity_id, record);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, entity_id: EntityId) -> Result<Option<PipelineRecord>, StorageError> {
        Ok(self.records.get(&entity_id).map(|r| r.value().clone()))
    }

    async fn upsert(&self, record: &PipelineRecord) -> Result<PipelineRecord, StorageError> {
        let mut entry = self
            .records
            .entry(record.entity_id)
            .or_insert_with(|| record.clone());
        let stored = entry.value_mut();
        stored.merge_from(record);
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn create_if_absent(&self, entity_id: EntityId) -> Result<PipelineRecord, StorageError> {
        Ok(self
            .records
            .entry(entity_id)
            .or_insert_with(|| PipelineRecord::new(entity_id))
            .value()
            .clone())
    }

    async fn reset_from(
        &self,
        entity_id: EntityId,
        stage: Stage,
    ) -> Result<PipelineRecord, StorageError> {
        match self.records.entry(entity_id) {
            Entry::Occupied(mut entry) => {
                let mut updated = entry.get().clone();
                apply_reset(&mut updated, stage)?;
                updated.updated_at = Utc::now();
                entry.insert(updated.clone());
                Ok(updated)
            }
            Entry::Vacant(entry) => {
                let mut created = PipelineRecord::new(entity_id);
                apply_reset(&mut created, stage)?;
                entry.insert(created.clone());
                Ok(created)
            }
        }
    }

    async fn list(&self) -> Result<Vec<PipelineRecord>, StorageError> {
        let mut records: Vec<PipelineRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.entity_id);
        Ok(records)
    }
}
