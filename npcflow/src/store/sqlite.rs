//! SQLite record store.
//!
//! One `pipeline_records` row per entity. Each stage slot is a JSON text
//! column holding the serialized [`StageSlot`](crate::core::StageSlot).
//! Blocking rusqlite calls run on tokio's blocking pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{apply_reset, migrations, RecordStore};
use crate::core::{EntityId, PipelineRecord, Stage};
use crate::errors::StorageError;

const SELECT_COLUMNS: &str =
    "entity_id, stage, raw, text, visual, synthesis, created_at, updated_at";

/// Durable store backed by a single SQLite connection.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteRecordStore {
    /// Opens (or creates) the database at `path` and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the file cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = open_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Unavailable(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
            let conn = Connection::open(&open_path).map_err(|e| {
                StorageError::Unavailable(format!("failed to open database: {e}"))
            })?;
            configure(&conn)?;
            Ok::<_, StorageError>(conn)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("open task failed: {e}")))??;

        info!(path = %path.display(), "Record store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if migrations fail.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Unavailable(format!("failed to open in-memory db: {e}")))?;
        configure(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("storage task failed: {e}")))?
    }
}

fn configure(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
    .map_err(|e| StorageError::Backend(format!("failed to set pragmas: {e}")))?;
    migrations::run_migrations(conn)
}

fn sql_id(entity_id: EntityId) -> Result<i64, StorageError> {
    i64::try_from(entity_id.get())
        .map_err(|_| StorageError::Backend(format!("entity id {entity_id} exceeds SQLite range")))
}

fn encode_slot<T: Serialize>(
    entity_id: EntityId,
    slot: Option<&T>,
) -> Result<Option<String>, StorageError> {
    slot.map(serde_json::to_string)
        .transpose()
        .map_err(|e| StorageError::Corrupt {
            entity_id,
            message: format!("cannot encode slot: {e}"),
        })
}

fn decode_slot<T: DeserializeOwned>(
    entity_id: EntityId,
    column: &str,
    json: Option<String>,
) -> Result<Option<T>, StorageError> {
    json.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| StorageError::Corrupt {
            entity_id,
            message: format!("cannot decode {column} slot: {e}"),
        })
}

fn decode_time(entity_id: EntityId, value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt {
            entity_id,
            message: format!("bad timestamp '{value}': {e}"),
        })
}

/// Column values as read, before JSON decoding.
struct RawRow {
    entity_id: i64,
    stage: String,
    raw: Option<String>,
    text: Option<String>,
    visual: Option<String>,
    synthesis: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entity_id: row.get(0)?,
            stage: row.get(1)?,
            raw: row.get(2)?,
            text: row.get(3)?,
            visual: row.get(4)?,
            synthesis: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<PipelineRecord, StorageError> {
        let entity_id = u64::try_from(self.entity_id)
            .map(EntityId::new)
            .map_err(|_| StorageError::Backend(format!("negative entity id {}", self.entity_id)))?;
        let stage: Stage = self.stage.parse().map_err(|message| StorageError::Corrupt {
            entity_id,
            message,
        })?;

        Ok(PipelineRecord {
            entity_id,
            stage,
            raw: decode_slot(entity_id, "raw", self.raw)?,
            text: decode_slot(entity_id, "text", self.text)?,
            visual: decode_slot(entity_id, "visual", self.visual)?,
            synthesis: decode_slot(entity_id, "synthesis", self.synthesis)?,
            created_at: decode_time(entity_id, &self.created_at)?,
            updated_at: decode_time(entity_id, &self.updated_at)?,
        })
    }
}

fn fetch(conn: &Connection, entity_id: EntityId) -> Result<Option<PipelineRecord>, StorageError> {
    let row = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM pipeline_records WHERE entity_id = ?1"),
            params![sql_id(entity_id)?],
            RawRow::from_row,
        )
        .optional()?;
    row.map(RawRow::decode).transpose()
}

fn write(conn: &Connection, record: &PipelineRecord) -> Result<(), StorageError> {
    let id = record.entity_id;
    conn.execute(
        "INSERT INTO pipeline_records
            (entity_id, stage, raw, text, visual, synthesis, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(entity_id) DO UPDATE SET
            stage = excluded.stage,
            raw = excluded.raw,
            text = excluded.text,
            visual = excluded.visual,
            synthesis = excluded.synthesis,
            updated_at = excluded.updated_at",
        params![
            sql_id(id)?,
            record.stage.as_str(),
            encode_slot(id, record.raw.as_ref())?,
            encode_slot(id, record.text.as_ref())?,
            encode_slot(id, record.visual.as_ref())?,
            encode_slot(id, record.synthesis.as_ref())?,
            record.created_at.to_rfc3339(),
            record.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, entity_id: EntityId) -> Result<Option<PipelineRecord>, StorageError> {
        self.with_conn(move |conn| fetch(conn, entity_id)).await
    }

    async fn upsert(&self, record: &PipelineRecord) -> Result<PipelineRecord, StorageError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut stored = match fetch(&tx, record.entity_id)? {
                Some(mut existing) => {
                    existing.merge_from(&record);
                    existing
                }
                None => record,
            };
            stored.updated_at = Utc::now();
            write(&tx, &stored)?;
            tx.commit()?;
            debug!(entity_id = %stored.entity_id, stage = %stored.stage, "Record upserted");
            Ok(stored)
        })
        .await
    }

    async fn create_if_absent(&self, entity_id: EntityId) -> Result<PipelineRecord, StorageError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let record = if let Some(existing) = fetch(&tx, entity_id)? {
                existing
            } else {
                let record = PipelineRecord::new(entity_id);
                write(&tx, &record)?;
                record
            };
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn reset_from(
        &self,
        entity_id: EntityId,
        stage: Stage,
    ) -> Result<PipelineRecord, StorageError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut record = fetch(&tx, entity_id)?.unwrap_or_else(|| PipelineRecord::new(entity_id));
            apply_reset(&mut record, stage)?;
            record.updated_at = Utc::now();
            write(&tx, &record)?;
            tx.commit()?;
            Ok(record)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<PipelineRecord>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM pipeline_records ORDER BY entity_id"
            ))?;
            let rows = stmt
                .query_map([], RawRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(RawRow::decode).collect()
        })
        .await
    }
}
