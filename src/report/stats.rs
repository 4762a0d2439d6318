//! Statistics from the document store
//!
//! This module reads stored-document counts and run history back out of the
//! store for the `--stats` mode.

use crate::storage::{RunHistory, RunRecord, StorageResult};

/// Ingestion statistics summary
#[derive(Debug, Clone)]
pub struct IngestStatistics {
    /// Number of documents in the collection
    pub documents: u64,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The run history to query
/// * `run_limit` - How many recent runs to include
pub fn load_statistics(storage: &dyn RunHistory, run_limit: usize) -> StorageResult<IngestStatistics> {
    let documents = storage.count_documents()?;
    let recent_runs = storage.recent_runs(run_limit)?;

    Ok(IngestStatistics {
        documents,
        recent_runs,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &IngestStatistics) {
    println!("=== Ingestion Statistics ===\n");

    println!("Stored documents: {}", stats.documents);
    println!();

    if stats.recent_runs.is_empty() {
        println!("No runs recorded yet.");
        return;
    }

    println!("Recent Runs:");
    for run in &stats.recent_runs {
        println!(
            "  #{} [{}] {} - started {}, finished {}: {} saved, {} failed",
            run.id,
            run.mode.to_db_string(),
            run.status.to_db_string(),
            run.started_at,
            run.finished_at.as_deref().unwrap_or("-"),
            run.success_count,
            run.failure_count
        );
    }

    if let Some(latest) = stats.recent_runs.first() {
        println!();
        println!(
            "Success Rate (latest run #{}): {:.1}% ({} / {} records saved)",
            latest.id,
            success_rate(latest).unwrap_or(0.0),
            latest.success_count,
            latest.success_count + latest.failure_count
        );
    }
}

/// Share of a run's records that were saved, as a percentage
///
/// A retry pass continues the previous run's totals, so each run's counts
/// already cover everything before it. Summing across runs would count the
/// same records more than once.
pub fn success_rate(run: &RunRecord) -> Option<f64> {
    let total = run.success_count + run.failure_count;
    if total == 0 {
        return None;
    }
    Some(run.success_count as f64 / total as f64 * 100.0)
}
