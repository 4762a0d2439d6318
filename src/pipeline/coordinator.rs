//! Pipeline coordinator - main ingestion loop
//!
//! The work source is read on a blocking thread and handed over through a
//! bounded channel. A single coordinating task receives items and spawns one
//! task per item, bounded by a semaphore sized to the worker pool. It logs
//! progress, writes the report periodically, and joins every task before
//! finalizing.

use crate::config::PipelineConfig;
use crate::fetch::RecordFetcher;
use crate::pipeline::lifecycle::Lifecycle;
use crate::pipeline::progress::{HumanDuration, ProgressEstimate};
use crate::pipeline::worker::{process_item, ItemResult, WorkerContext};
use crate::pipeline::{PipelineState, RateLimiter};
use crate::report::{write_report, RunReport};
use crate::source::WorkItem;
use crate::state::{RunSnapshot, RunState};
use crate::storage::RecordSink;
use crate::IngestError;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Items read ahead of dispatch
const READ_AHEAD: usize = 256;

/// What a finished run looked like
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Final state, including totals carried over from a previous report
    pub snapshot: RunSnapshot,

    /// Items handed to workers in this run
    pub dispatched: u64,

    /// Whether the run stopped early on cancellation
    pub cancelled: bool,

    pub elapsed: Duration,
}

impl RunSummary {
    /// Whether any failure remains that a retry pass cannot fix
    pub fn has_permanent_failures(&self) -> bool {
        self.snapshot.permanent_failures() > 0
    }
}

/// Main pipeline coordinator structure
pub struct Coordinator<F, S> {
    fetcher: Arc<F>,
    sink: Arc<S>,
    limiter: Arc<RateLimiter>,
    state: Arc<RunState>,
    settings: PipelineConfig,
    report_path: Option<PathBuf>,
    expected_total: Option<u64>,
    cancel: CancellationToken,
    lifecycle: Lifecycle,
}

impl<F: RecordFetcher, S: RecordSink> Coordinator<F, S> {
    /// Creates a coordinator with a fresh run state and its own limiter
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Fetches one record per id
    /// * `sink` - Persists fetched records
    /// * `settings` - Pool size, batch rate, and reporting intervals
    pub fn new(fetcher: Arc<F>, sink: Arc<S>, settings: PipelineConfig) -> Self {
        Self {
            fetcher,
            sink,
            limiter: Arc::new(RateLimiter::from_config(&settings)),
            state: Arc::new(RunState::new()),
            settings,
            report_path: None,
            expected_total: None,
            cancel: CancellationToken::new(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Continues from an existing run state (retry passes)
    pub fn with_state(mut self, state: RunState) -> Self {
        self.state = Arc::new(state);
        self
    }

    /// Writes the report here periodically and at the end of the run
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Number of items the source is expected to yield, for progress lines
    pub fn with_expected_total(mut self, total: u64) -> Self {
        self.expected_total = Some(total);
        self
    }

    /// Uses an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> Arc<RunState> {
        Arc::clone(&self.state)
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.lifecycle.state()
    }

    /// Runs the ingestion loop over `items`
    ///
    /// Per-item failures never end the run. A read error from the source
    /// stops dispatch; in-flight work is still drained and the partial report
    /// written before the error is returned.
    ///
    /// The source is iterated on the blocking pool, so file reads never stall
    /// the runtime.
    pub async fn run<I>(&mut self, items: I) -> Result<RunSummary, IngestError>
    where
        I: IntoIterator<Item = io::Result<WorkItem>>,
        I::IntoIter: Send + 'static,
    {
        self.lifecycle.advance(PipelineState::Running)?;
        tracing::info!(
            "Starting ingestion with {} workers, {} requests per {:?}",
            self.settings.pool_size,
            self.settings.batch_size,
            self.settings.batch_delay()
        );

        let start_time = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.settings.pool_size.max(1) as usize));
        let context = WorkerContext {
            fetcher: Arc::clone(&self.fetcher),
            sink: Arc::clone(&self.sink),
            limiter: Arc::clone(&self.limiter),
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
        };

        let mut tasks = JoinSet::new();
        let mut dispatched = 0u64;
        let mut checkpoints = 0u64;
        let mut read_error = None;

        let (tx, mut rx) = mpsc::channel(READ_AHEAD);
        let source = items.into_iter();
        let producer = tokio::task::spawn_blocking(move || feed(source, tx));

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                next = rx.recv() => next,
            };
            let Some(next) = next else {
                break;
            };

            let item = match next {
                Ok(item) => item,
                Err(e) => {
                    tracing::error!("Input read failed after {} items: {}", dispatched, e);
                    read_error = Some(e);
                    break;
                }
            };
            if !item.eligible {
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                break;
            };

            let ctx = context.clone();
            tasks.spawn(async move {
                let _permit = permit;
                process_item(ctx, item).await
            });
            dispatched += 1;

            if self.settings.progress_interval > 0
                && dispatched % self.settings.progress_interval == 0
            {
                self.log_progress(dispatched);
            }

            while let Some(joined) = tasks.try_join_next() {
                handle_joined(joined);
            }
            self.checkpoint(&mut checkpoints);
        }

        // Unblocks a producer waiting on a full channel
        drop(rx);

        self.lifecycle.advance(PipelineState::Draining)?;
        if self.cancel.is_cancelled() {
            tracing::warn!("Cancelled; waiting for {} in-flight items", tasks.len());
        } else {
            tracing::debug!("Source exhausted; waiting for {} in-flight items", tasks.len());
        }

        while let Some(joined) = tasks.join_next().await {
            handle_joined(joined);
            self.checkpoint(&mut checkpoints);
        }
        if let Err(e) = producer.await {
            tracing::error!("Input reader task failed: {}", e);
        }

        self.lifecycle.advance(PipelineState::Finalizing)?;
        let snapshot = self.state.snapshot();
        if let Some(path) = &self.report_path {
            write_report(&RunReport::from(&snapshot), path)?;
            tracing::info!("Report written to {}", path.display());
        }
        self.lifecycle.advance(PipelineState::Done)?;

        let summary = RunSummary {
            snapshot,
            dispatched,
            cancelled: self.cancel.is_cancelled(),
            elapsed: start_time.elapsed(),
        };

        tracing::info!(
            "Ingestion finished: {} dispatched, {} saved, {} failed, {} aborted in {:?}",
            summary.dispatched,
            summary.snapshot.success_count,
            summary.snapshot.failure_count,
            summary.snapshot.aborted.len(),
            summary.elapsed
        );

        match read_error {
            Some(e) => Err(IngestError::Io(e)),
            None => Ok(summary),
        }
    }

    fn log_progress(&self, dispatched: u64) {
        let total = self.expected_total.unwrap_or(dispatched).max(dispatched);
        let estimate = ProgressEstimate::new(
            dispatched,
            total,
            u64::from(self.settings.batch_size),
            self.settings.batch_delay(),
        );

        tracing::info!(
            "Batch {} of {}: {} of {} dispatched, {} saved, {} errors. Estimated time remaining: {}",
            estimate.batch,
            estimate.total_batches,
            dispatched,
            total,
            self.state.success_count(),
            self.state.failure_count(),
            HumanDuration(estimate.remaining)
        );

        if self.state.is_rate_limited() {
            if let Some(until) = self.limiter.cooldown_deadline() {
                let wait = until.saturating_duration_since(tokio::time::Instant::now());
                tracing::warn!("Rate limited since last progress report; requests paused for {:?}", wait);
            } else {
                tracing::warn!("Rate limited since last progress report");
            }
            self.state.clear_rate_limited();
        }
    }

    /// Writes the report each time another `checkpoint_every` items complete
    ///
    /// A failed checkpoint is logged and the run goes on; the final report
    /// write is the one that must succeed.
    fn checkpoint(&self, written: &mut u64) {
        let (Some(path), every) = (&self.report_path, self.settings.checkpoint_every) else {
            return;
        };
        if every == 0 {
            return;
        }

        let due = self.state.completed() / every;
        if due <= *written {
            return;
        }
        *written = due;

        let snapshot = self.state.snapshot();
        match write_report(&RunReport::from(&snapshot), path) {
            Ok(()) => tracing::debug!(
                "Checkpoint: {} saved, {} failed",
                snapshot.success_count,
                snapshot.failure_count
            ),
            Err(e) => tracing::warn!("Failed to write checkpoint to {}: {}", path.display(), e),
        }
    }
}

/// Sends items until the source ends, a read fails, or the receiver is gone
fn feed<It>(source: It, tx: mpsc::Sender<io::Result<WorkItem>>)
where
    It: Iterator<Item = io::Result<WorkItem>>,
{
    for next in source {
        let failed = next.is_err();
        if tx.blocking_send(next).is_err() || failed {
            break;
        }
    }
}

fn handle_joined(joined: Result<(u64, ItemResult), JoinError>) {
    match joined {
        Ok((id, ItemResult::Saved)) => tracing::trace!("[ID={}] finished: saved", id),
        Ok((id, ItemResult::Failed(kind))) => tracing::trace!("[ID={}] finished: {}", id, kind),
        Ok((id, ItemResult::Aborted)) => tracing::trace!("[ID={}] finished: aborted", id),
        Err(e) => tracing::error!("Worker task failed: {}", e),
    }
}
