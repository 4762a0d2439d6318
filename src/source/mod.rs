//! Source module for reading work items
//!
//! This module handles:
//! - Decoding the newline-delimited JSON id export
//! - Filtering ineligible (adult) records
//! - Counting parse-skips without treating them as failures
//! - Turning a resume list from a previous report back into work items

mod reader;

pub use reader::SourceReader;

use crate::IngestError;
use serde::Deserialize;
use std::io;
use std::path::Path;

/// One unit of ingestion work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// External record identifier
    pub id: u64,

    /// Human-readable label used in logs
    pub display_name: String,

    /// Whether the record may be ingested at all
    pub eligible: bool,
}

impl WorkItem {
    /// Builds a work item for an id that only survives as a number (resume lists)
    pub fn from_id(id: u64) -> Self {
        Self {
            id,
            display_name: String::new(),
            eligible: true,
        }
    }
}

/// Shape of one line in the daily id export
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DatasetRecord {
    pub id: u64,
    #[serde(default)]
    pub original_title: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub popularity: f64,
    #[serde(default)]
    #[allow(dead_code)]
    pub video: bool,
    #[serde(default)]
    pub adult: bool,
}

impl From<DatasetRecord> for WorkItem {
    fn from(record: DatasetRecord) -> Self {
        Self {
            id: record.id,
            display_name: record.original_title,
            eligible: !record.adult,
        }
    }
}

/// Counters collected while streaming the export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Lines read, including blank and malformed ones
    pub lines: u64,

    /// Lines that failed to decode
    pub parse_skips: u64,

    /// Records filtered out as ineligible
    pub ineligible: u64,

    /// Work items handed to the caller
    pub yielded: u64,
}

/// Streams the whole export once and returns its counters
///
/// Used for the "records found" banner, dry runs, and the progress estimate.
/// No offset or limit is applied.
pub fn survey(path: &Path) -> Result<SourceStats, IngestError> {
    let mut reader = SourceReader::open(path)?;
    for item in reader.by_ref() {
        item.map_err(|source| IngestError::Source {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(reader.stats())
}

/// Turns a list of ids into a work item stream
pub fn resume_items(ids: Vec<u64>) -> impl Iterator<Item = io::Result<WorkItem>> {
    ids.into_iter().map(|id| Ok(WorkItem::from_id(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_survey_counts_everything() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":10,"original_title":"Ten","adult":false}}"#).unwrap();
        writeln!(file, r#"{{"id":11,"original_title":"Eleven","adult":true}}"#).unwrap();
        writeln!(file, "{{broken").unwrap();
        writeln!(file, r#"{{"id":12,"original_title":"Twelve"}}"#).unwrap();
        file.flush().unwrap();

        let stats = survey(file.path()).unwrap();
        assert_eq!(stats.yielded, 2);
        assert_eq!(stats.ineligible, 1);
        assert_eq!(stats.parse_skips, 1);
        assert_eq!(stats.lines, 4);
    }

    #[test]
    fn test_resume_items_are_eligible() {
        let items: Vec<WorkItem> = resume_items(vec![5, 7]).map(|i| i.unwrap()).collect();
        assert_eq!(items, vec![WorkItem::from_id(5), WorkItem::from_id(7)]);
        assert!(items.iter().all(|i| i.eligible));
    }

    #[test]
    fn test_adult_record_is_ineligible() {
        let record: DatasetRecord =
            serde_json::from_str(r#"{"id":1,"original_title":"X","adult":true}"#).unwrap();
        let item = WorkItem::from(record);
        assert!(!item.eligible);
    }
}
