//! Storage traits and error types
//!
//! This module defines the trait interfaces for the document store and the
//! run history, plus the associated error types.

use crate::fetch::FetchedRecord;
use crate::storage::{RunMode, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Record id {0} does not fit the store's key range")]
    IdOutOfRange(u64),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persists fetched records
///
/// Writes are upserts keyed by the record id: storing the same id again
/// replaces the earlier document, so retried items never duplicate.
/// Implementations must release whatever resource a call acquires on every
/// exit path.
pub trait RecordSink: Send + Sync + 'static {
    fn store(&self, record: &FetchedRecord) -> StorageResult<()>;
}

/// Run history and store statistics
pub trait RunHistory {
    // ===== Run Management =====

    /// Creates a new run in the `Running` status
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&self, config_hash: &str, mode: RunMode) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent runs, newest first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    /// Records the final status and totals of a run
    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        success_count: u64,
        failure_count: u64,
    ) -> StorageResult<()>;

    // ===== Statistics =====

    /// Counts stored documents
    fn count_documents(&self) -> StorageResult<u64>;

    /// Loads one stored document
    fn get_document(&self, id: u64) -> StorageResult<Option<serde_json::Value>>;
}
