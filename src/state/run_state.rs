use crate::state::FailureKind;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Cumulative counters and failure ledger for one ingestion run
///
/// Shared by every worker. All mutation goes through one mutex so the
/// counters and the ledger always move together; the lock is never held
/// across an await point.
#[derive(Debug, Default)]
pub struct RunState {
    inner: Mutex<Tally>,
}

#[derive(Debug, Default, Clone)]
struct Tally {
    success_count: u64,
    failure_count: u64,
    failed: BTreeMap<u64, FailureKind>,
    succeeded: BTreeSet<u64>,
    aborted: BTreeSet<u64>,
    completed: u64,
    rate_limited: bool,
}

/// Point-in-time copy of the run state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSnapshot {
    pub success_count: u64,
    pub failure_count: u64,

    /// Failed ids with the kind of their most recent failure
    pub failed: BTreeMap<u64, FailureKind>,

    /// Ids that were in flight when the run was cancelled
    pub aborted: BTreeSet<u64>,

    /// Items that reached a success or failure in this run
    pub completed: u64,
}

impl RunState {
    /// Creates an empty run state
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a run state that continues from a previous run's totals
    ///
    /// Aborted ids from the previous run stay on the aborted list until they
    /// complete, so a pass that is cut short again does not drop them.
    pub fn resume(
        success_count: u64,
        failed: BTreeMap<u64, FailureKind>,
        aborted: BTreeSet<u64>,
    ) -> Self {
        let tally = Tally {
            success_count,
            failure_count: failed.len() as u64,
            failed,
            aborted,
            ..Tally::default()
        };
        Self {
            inner: Mutex::new(tally),
        }
    }

    // A poisoned lock only means a worker panicked between two plain field
    // updates; the tally itself is still usable.
    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a fetched and stored record
    ///
    /// An id that failed earlier moves from the failure side to the success
    /// side. An id that already succeeded in this run is not counted again.
    pub fn record_success(&self, id: u64) {
        let mut tally = self.lock();
        if tally.failed.remove(&id).is_some() {
            tally.failure_count = tally.failure_count.saturating_sub(1);
        }
        tally.aborted.remove(&id);
        if tally.succeeded.insert(id) {
            tally.success_count += 1;
        }
        tally.completed += 1;
    }

    /// Records a failed record
    ///
    /// Each id is counted once no matter how many times it is reported; a
    /// repeated report only refreshes the failure kind.
    ///
    /// A failure for an id that already succeeded in this run is ignored
    /// for the ledger; its document is already stored.
    pub fn record_failure(&self, id: u64, kind: FailureKind) {
        let mut tally = self.lock();
        tally.aborted.remove(&id);
        tally.completed += 1;
        if kind == FailureKind::RateLimited {
            tally.rate_limited = true;
        }
        if tally.succeeded.contains(&id) {
            return;
        }
        if tally.failed.insert(id, kind).is_none() {
            tally.failure_count += 1;
        }
    }

    /// Records an item whose processing was cut short by cancellation
    pub fn record_aborted(&self, id: u64) {
        self.lock().aborted.insert(id);
    }

    /// Whether a rate-limit response has been seen since the flag was cleared
    pub fn is_rate_limited(&self) -> bool {
        self.lock().rate_limited
    }

    /// Clears the transient rate-limit flag
    pub fn clear_rate_limited(&self) {
        self.lock().rate_limited = false;
    }

    pub fn success_count(&self) -> u64 {
        self.lock().success_count
    }

    pub fn failure_count(&self) -> u64 {
        self.lock().failure_count
    }

    /// Number of items that reached success or failure in this run
    pub fn completed(&self) -> u64 {
        self.lock().completed
    }

    /// Copies the current state out from under the lock
    pub fn snapshot(&self) -> RunSnapshot {
        let tally = self.lock();
        RunSnapshot {
            success_count: tally.success_count,
            failure_count: tally.failure_count,
            failed: tally.failed.clone(),
            aborted: tally.aborted.clone(),
            completed: tally.completed,
        }
    }
}

impl RunSnapshot {
    /// Ids worth dispatching again: retryable failures plus aborted items
    pub fn retry_ids(&self) -> Vec<u64> {
        let mut ids: BTreeSet<u64> = self
            .failed
            .iter()
            .filter(|(_, kind)| kind.is_retryable())
            .map(|(id, _)| *id)
            .collect();
        ids.extend(self.aborted.iter().copied());
        ids.into_iter().collect()
    }

    /// Failures that no later run will fix
    pub fn permanent_failures(&self) -> usize {
        self.failed
            .values()
            .filter(|kind| !kind.is_retryable())
            .count()
    }

    /// Failure counts grouped by kind
    pub fn failures_by_kind(&self) -> BTreeMap<FailureKind, u64> {
        let mut counts = BTreeMap::new();
        for kind in self.failed.values() {
            *counts.entry(*kind).or_insert(0) += 1;
        }
        counts
    }
}
