//! Catalog-Ingest: a bulk record ingestion job
//!
//! This crate fetches detailed records for a list of external identifiers from a
//! remote HTTP API, persists them into a document store, and keeps a failure
//! ledger that doubles as the resume list for the next run.

pub mod config;
pub mod fetch;
pub mod pipeline;
pub mod report;
pub mod source;
pub mod state;
pub mod storage;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Catalog-Ingest operations
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Failed to read input {path}: {source}")]
    Source {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pipeline transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: pipeline::PipelineState,
        to: pipeline::PipelineState,
    },

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Catalog-Ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use fetch::{FetchOutcome, FetchedRecord, HttpFetcher, RecordFetcher};
pub use pipeline::{Coordinator, PipelineState, RateLimiter, RunSummary};
pub use report::RunReport;
pub use source::{SourceReader, WorkItem};
pub use state::{FailureKind, RunState};
pub use storage::{RecordSink, SqliteStore};
