//! Durable per-entity pipeline records.
//!
//! A [`RecordStore`] holds one [`PipelineRecord`] per entity. Every write is
//! all-or-nothing for that entity. Any failure is a [`StorageError`], which
//! aborts the entity's current run.

mod memory;
mod migrations;
mod sqlite;

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::core::{EntityId, PipelineRecord, Stage};
use crate::errors::StorageError;

/// Storage backend for pipeline records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the record for `entity_id`, if any.
    async fn get(&self, entity_id: EntityId) -> Result<Option<PipelineRecord>, StorageError>;

    /// Creates the record if absent, otherwise merges the filled slots and
    /// the stage pointer of `record` into the stored row. Bumps `updated_at`
    /// and returns the stored record.
    async fn upsert(&self, record: &PipelineRecord) -> Result<PipelineRecord, StorageError>;

    /// Returns the existing record or a new empty one at [`Stage::None`].
    async fn create_if_absent(&self, entity_id: EntityId) -> Result<PipelineRecord, StorageError>;

    /// Clears `stage` and all later slots and moves the pointer to the
    /// stage preceding `stage`, in one write.
    async fn reset_from(
        &self,
        entity_id: EntityId,
        stage: Stage,
    ) -> Result<PipelineRecord, StorageError>;

    /// Returns every record ordered by entity id.
    async fn list(&self) -> Result<Vec<PipelineRecord>, StorageError>;
}

/// Opens the backend selected by `config`.
///
/// # Errors
///
/// Returns [`StorageError`] if the SQLite database cannot be opened or
/// migrated.
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn RecordStore>, StorageError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryRecordStore::new())),
        StoreBackend::Sqlite => Ok(Arc::new(SqliteRecordStore::open(&config.path).await?)),
    }
}

/// Applies a reset to an in-memory copy of a record.
pub(crate) fn apply_reset(record: &mut PipelineRecord, stage: Stage) -> Result<(), StorageError> {
    record
        .clear_from(stage)
        .map_err(|e| StorageError::Backend(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_memory_store() {
        let config = DatabaseConfig {
            backend: StoreBackend::Memory,
            ..DatabaseConfig::default()
        };
        let store = open_store(&config).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_sqlite_store() {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig {
            backend: StoreBackend::Sqlite,
            path: dir.path().join("nested").join("records.db"),
        };
        let store = open_store(&config).await.unwrap();
        let record = store.create_if_absent(EntityId::new(1)).await.unwrap();
        assert_eq!(record.stage, Stage::None);
        assert!(config.path.exists());
    }
}
