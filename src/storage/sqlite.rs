//! SQLite storage implementation
//!
//! This module provides a SQLite-backed document store. Each record is kept
//! as one JSON document per row, keyed by the record id.

use crate::fetch::FetchedRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordSink, RunHistory, StorageError, StorageResult};
use crate::storage::{RunMode, RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite document store
///
/// The connection is shared by all workers behind a mutex. Every store runs
/// in its own transaction, which rolls back on drop if it was not committed.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    collection: String,
}

impl SqliteStore {
    /// Opens (or creates) the store
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `collection` - Table name for documents (already validated)
    /// * `busy_timeout` - How long a write waits on a locked database
    pub fn new(path: &Path, collection: &str, busy_timeout: Duration) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(busy_timeout)?;

        initialize_schema(&conn, collection)?;

        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
        })
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn new_in_memory(collection: &str) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn, collection)?;
        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
        })
    }

    /// Name of the document table
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

fn to_key(id: u64) -> StorageResult<i64> {
    i64::try_from(id).map_err(|_| StorageError::IdOutOfRange(id))
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        mode: RunMode::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunMode::Full),
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
        success_count: row.get::<_, i64>(6)? as u64,
        failure_count: row.get::<_, i64>(7)? as u64,
    })
}

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, mode, status, success_count, failure_count";

impl RecordSink for SqliteStore {
    fn store(&self, record: &FetchedRecord) -> StorageResult<()> {
        let key = to_key(record.id)?;
        let document = serde_json::to_string(&record.document)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {} (id, document, stored_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET document = excluded.document, stored_at = excluded.stored_at",
                self.collection
            ),
            params![key, document, now],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl RunHistory for SqliteStore {
    // ===== Run Management =====

    fn create_run(&self, config_hash: &str, mode: RunMode) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, mode, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                now,
                config_hash,
                mode.to_db_string(),
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
            params![run_id],
            run_from_row,
        )
        .optional()?
        .ok_or(StorageError::RunNotFound(run_id))
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;

        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        success_count: u64,
        failure_count: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, success_count = ?3, failure_count = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                success_count as i64,
                failure_count as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Statistics =====

    fn count_documents(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.collection),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn get_document(&self, id: u64) -> StorageResult<Option<serde_json::Value>> {
        let key = to_key(id)?;
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT document FROM {} WHERE id = ?1", self.collection),
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|e| StorageError::Serialization(e.to_string()))
        })
        .transpose()
    }
}
