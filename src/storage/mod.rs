//! Storage module for persisting fetched records
//!
//! This module handles all database operations for the ingestion job, including:
//! - SQLite document store initialization
//! - Upserting fetched records keyed by id
//! - Run history tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{RecordSink, RunHistory, StorageError, StorageResult};

use crate::config::StorageConfig;
use std::path::Path;
use std::time::Duration;

/// Opens the document store described by the configuration
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Store opened and schema initialized
/// * `Err(StorageError)` - The backend could not be reached
pub fn open_storage(config: &StorageConfig) -> StorageResult<SqliteStore> {
    SqliteStore::new(
        Path::new(&config.database_path),
        &config.collection,
        Duration::from_millis(config.busy_timeout_ms),
    )
}

/// Represents an ingestion run in the database
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub success_count: u64,
    pub failure_count: u64,
}

/// Whether a run read the input file or a previous report's resume list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    Retry,
}

impl RunMode {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Retry => "retry",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "full" => Some(Self::Full),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }
}

/// Status of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
