//! Report module for the JSON run report
//!
//! This module handles:
//! - Serializing the run state into the `dump-state.json` report
//! - Writing the report atomically, both periodically and at the end of a run
//! - Loading a previous report to drive a retry pass
//! - Reading run statistics back out of the document store

pub mod stats;

pub use stats::{load_statistics, print_statistics, success_rate, IngestStatistics};

use crate::state::{FailureKind, RunSnapshot, RunState};
use crate::IngestError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Serialized form of a run's outcome
///
/// `failed` is the retry worklist for the next invocation. The per-id kinds
/// and the aborted list are optional on read so that minimal reports still
/// load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub success_count: u64,
    pub failure_count: u64,
    pub failed: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failure_kinds: BTreeMap<String, FailureKind>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aborted: Vec<String>,
}

impl From<&RunSnapshot> for RunReport {
    fn from(snapshot: &RunSnapshot) -> Self {
        Self {
            success_count: snapshot.success_count,
            failure_count: snapshot.failure_count,
            failed: snapshot.failed.keys().map(|id| id.to_string()).collect(),
            failure_kinds: snapshot
                .failed
                .iter()
                .map(|(id, kind)| (id.to_string(), *kind))
                .collect(),
            aborted: snapshot.aborted.iter().map(|id| id.to_string()).collect(),
        }
    }
}

impl RunReport {
    /// Parses the failed ids back into numbers, with their kinds when known
    fn failed_entries(&self) -> Result<BTreeMap<u64, Option<FailureKind>>, IngestError> {
        self.failed
            .iter()
            .map(|raw| {
                let id = parse_id(raw)?;
                Ok((id, self.failure_kinds.get(raw).copied()))
            })
            .collect()
    }

    /// Ids to dispatch on a retry pass
    ///
    /// Failures of a known permanent kind are left out; ids without a
    /// recorded kind are retried. Aborted ids are always retried.
    pub fn retry_ids(&self) -> Result<Vec<u64>, IngestError> {
        let mut ids: Vec<u64> = self
            .failed_entries()?
            .into_iter()
            .filter(|(_, kind)| kind.map_or(true, |k| k.is_retryable()))
            .map(|(id, _)| id)
            .collect();
        for raw in &self.aborted {
            ids.push(parse_id(raw)?);
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Rebuilds a run state that continues this report's totals
    ///
    /// Failures without a recorded kind are treated as transient. Aborted
    /// ids stay aborted until the new run completes them.
    pub fn to_run_state(&self) -> Result<RunState, IngestError> {
        let failed = self
            .failed_entries()?
            .into_iter()
            .map(|(id, kind)| (id, kind.unwrap_or(FailureKind::Transient)))
            .collect();
        let aborted = self
            .aborted
            .iter()
            .map(|raw| parse_id(raw))
            .collect::<Result<BTreeSet<u64>, _>>()?;
        Ok(RunState::resume(self.success_count, failed, aborted))
    }
}

fn parse_id(raw: &str) -> Result<u64, IngestError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| IngestError::Report(format!("invalid id in report: '{}'", raw)))
}

/// Writes the report as pretty-printed JSON
///
/// The report is written to a sibling temporary file and renamed into place,
/// so a crash mid-write leaves the previous checkpoint intact.
pub fn write_report(report: &RunReport, path: &Path) -> Result<(), IngestError> {
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');

    let tmp_path = temp_path(path);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Loads a report written by a previous run
pub fn load_report(path: &Path) -> Result<RunReport, IngestError> {
    let content = std::fs::read_to_string(path)?;
    let report = serde_json::from_str(&content)?;
    Ok(report)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
