//! Per-item processing: admit, fetch, store, record

use crate::fetch::{FetchOutcome, RecordFetcher};
use crate::pipeline::RateLimiter;
use crate::source::WorkItem;
use crate::state::{FailureKind, RunState};
use crate::storage::RecordSink;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How one item ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemResult {
    Saved,
    Failed(FailureKind),
    Aborted,
}

/// Shared handles a worker needs; cloned once per spawned item
pub(crate) struct WorkerContext<F, S> {
    pub fetcher: Arc<F>,
    pub sink: Arc<S>,
    pub limiter: Arc<RateLimiter>,
    pub state: Arc<RunState>,
    pub cancel: CancellationToken,
}

impl<F, S> Clone for WorkerContext<F, S> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            sink: Arc::clone(&self.sink),
            limiter: Arc::clone(&self.limiter),
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
        }
    }
}

/// Runs one item to completion or until the run is cancelled
///
/// Every item ends in exactly one of success, failure, or aborted; nothing
/// escapes as an error.
pub(crate) async fn process_item<F, S>(ctx: WorkerContext<F, S>, item: WorkItem) -> (u64, ItemResult)
where
    F: RecordFetcher,
    S: RecordSink,
{
    let id = item.id;
    let result = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => None,
        result = run_item(&ctx, &item) => Some(result),
    };

    match result {
        Some(result) => (id, result),
        None => {
            tracing::debug!("[ID={}] Aborted by cancellation", id);
            ctx.state.record_aborted(id);
            (id, ItemResult::Aborted)
        }
    }
}

async fn run_item<F, S>(ctx: &WorkerContext<F, S>, item: &WorkItem) -> ItemResult
where
    F: RecordFetcher,
    S: RecordSink,
{
    let id = item.id;
    let title = item.display_name.as_str();

    ctx.limiter.admit().await;

    let outcome = ctx.fetcher.fetch(id).await;
    let label = outcome.label();
    let kind = match outcome {
        FetchOutcome::Success(record) => {
            let sink = Arc::clone(&ctx.sink);
            match tokio::task::spawn_blocking(move || sink.store(&record)).await {
                Ok(Ok(())) => {
                    ctx.limiter.report_success();
                    ctx.state.record_success(id);
                    tracing::debug!("[ID={}] {} saved", id, title);
                    return ItemResult::Saved;
                }
                Ok(Err(e)) => {
                    tracing::error!("[ID={}] {} fetched but could not be stored: {}", id, title, e);
                    FailureKind::Storage
                }
                Err(e) => {
                    tracing::error!("[ID={}] {} fetched but the store task failed: {}", id, title, e);
                    FailureKind::Storage
                }
            }
        }
        FetchOutcome::NotFound => {
            tracing::warn!("[ID={}] {} failed: {}", id, title, label);
            FailureKind::NotFound
        }
        FetchOutcome::RateLimited => {
            let until = ctx.limiter.report_rate_limited();
            let wait = until.saturating_duration_since(tokio::time::Instant::now());
            tracing::warn!(
                "[ID={}] {} failed: {}; pausing requests for {:?}",
                id,
                title,
                label,
                wait
            );
            FailureKind::RateLimited
        }
        FetchOutcome::Transient(cause) => {
            tracing::warn!("[ID={}] {} failed: {}: {}", id, title, label, cause);
            FailureKind::Transient
        }
        FetchOutcome::Fatal(cause) => {
            tracing::warn!("[ID={}] {} failed: {}: {}", id, title, label, cause);
            FailureKind::Fatal
        }
    };

    ctx.state.record_failure(id, kind);
    ItemResult::Failed(kind)
}
