//! Progress estimate for periodic log lines

use std::fmt;
use std::time::Duration;

/// Where a run stands in batch terms
///
/// The remaining time assumes every batch interval is fully used, so it is
/// an estimate and ignores cooldowns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEstimate {
    /// 1-based batch the latest dispatched item belongs to
    pub batch: u64,
    pub total_batches: u64,
    pub remaining: Duration,
}

impl ProgressEstimate {
    pub fn new(dispatched: u64, total: u64, batch_size: u64, batch_delay: Duration) -> Self {
        let batch_size = batch_size.max(1);
        let total_batches = total.div_ceil(batch_size).max(1);
        let batch = (dispatched.saturating_sub(1) / batch_size + 1).min(total_batches);
        let remaining_batches = u32::try_from(total_batches - batch).unwrap_or(u32::MAX);

        Self {
            batch,
            total_batches,
            remaining: batch_delay.saturating_mul(remaining_batches),
        }
    }
}

/// Renders a duration as "H hours, M minutes, S seconds"
pub struct HumanDuration(pub Duration);

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        write!(
            f,
            "{} hours, {} minutes, {} seconds",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    }
}
