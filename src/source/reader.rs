//! Line-by-line reader over the newline-delimited id export

use crate::source::{DatasetRecord, SourceStats, WorkItem};
use crate::IngestError;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Split};
use std::path::Path;

/// Lazy, single-pass stream of eligible work items
///
/// Each line is decoded on its own from raw bytes. Lines that do not decode,
/// including lines that are not valid UTF-8, are skipped and counted;
/// ineligible records are filtered out before they are yielded. Only a
/// failing read of the underlying stream is an error.
/// The reader can only be restarted by opening the file again.
pub struct SourceReader<R> {
    lines: Split<R>,
    skip_remaining: usize,
    limit: usize,
    stats: SourceStats,
}

impl SourceReader<BufReader<File>> {
    /// Opens the export at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SourceReader)` - The file is open and ready to stream
    /// * `Err(IngestError::Source)` - The file could not be opened
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let file = File::open(path).map_err(|source| IngestError::Source {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> SourceReader<R> {
    /// Wraps any buffered reader
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.split(b'\n'),
            skip_remaining: 0,
            limit: 0,
            stats: SourceStats::default(),
        }
    }

    /// Restricts the stream to a sub-range of the eligible records
    ///
    /// The first `offset` eligible records are skipped, after which at most
    /// `limit` records are yielded (0 means no limit).
    pub fn with_range(mut self, offset: usize, limit: usize) -> Self {
        self.skip_remaining = offset;
        self.limit = limit;
        self
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    fn limit_reached(&self) -> bool {
        self.limit != 0 && self.stats.yielded >= self.limit as u64
    }
}

impl<R: BufRead> Iterator for SourceReader<R> {
    type Item = io::Result<WorkItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.limit_reached() {
                return None;
            }

            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            self.stats.lines += 1;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let record: DatasetRecord = match serde_json::from_slice(&line) {
                Ok(record) => record,
                Err(e) => {
                    self.stats.parse_skips += 1;
                    tracing::trace!("Skipping line {}: {}", self.stats.lines, e);
                    continue;
                }
            };

            let item = WorkItem::from(record);
            if !item.eligible {
                self.stats.ineligible += 1;
                continue;
            }

            if self.skip_remaining > 0 {
                self.skip_remaining -= 1;
                continue;
            }

            self.stats.yielded += 1;
            return Some(Ok(item));
        }
    }
}
