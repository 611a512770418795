//! SQLite schema migrations.

use rusqlite::Connection;
use tracing::info;

use crate::errors::StorageError;

/// Latest schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Runs every migration newer than the recorded version.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| StorageError::Backend(format!("failed to create migrations table: {e}")))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StorageError::Backend(format!("failed to query migration version: {e}")))?;

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }
    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: pipeline_records");
    }

    Ok(())
}

fn apply_v1(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        BEGIN;

        CREATE TABLE IF NOT EXISTS pipeline_records (
            entity_id   INTEGER PRIMARY KEY NOT NULL,
            stage       TEXT NOT NULL DEFAULT 'none'
                        CHECK (stage IN ('none', 'raw', 'text', 'visual', 'synthesis', 'complete')),
            raw         TEXT,
            text        TEXT,
            visual      TEXT,
            synthesis   TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_pipeline_records_stage
            ON pipeline_records (stage);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'pipeline_records');

        COMMIT;
        ",
    )
    .map_err(|e| StorageError::Backend(format!("failed to apply migration v1: {e}")))
}
