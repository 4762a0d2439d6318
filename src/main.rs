//! Catalog-Ingest main entry point
//!
//! This is the command-line interface for the Catalog-Ingest bulk record job.

use anyhow::Context;
use catalog_ingest::config::{load_config_with_hash, Config};
use catalog_ingest::pipeline::RunSummary;
use catalog_ingest::report::{load_report, load_statistics, print_statistics};
use catalog_ingest::source::{resume_items, survey, SourceReader, WorkItem};
use catalog_ingest::state::RunState;
use catalog_ingest::storage::{open_storage, RunHistory, RunMode, RunStatus};
use catalog_ingest::{Coordinator, HttpFetcher};
use clap::Parser;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog-Ingest: bulk record ingestion
///
/// Catalog-Ingest reads a daily export of record ids, fetches each record's
/// details from the remote API at a bounded rate, and upserts them into a
/// document store. Failed ids are written to a report that drives the next
/// retry pass.
#[derive(Parser, Debug)]
#[command(name = "catalog-ingest")]
#[command(version = "1.0.0")]
#[command(about = "Bulk record ingestion into a document store", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Skip this many eligible records (overrides the config)
    #[arg(long)]
    offset: Option<usize>,

    /// Dispatch at most this many records, 0 for all (overrides the config)
    #[arg(long)]
    limit: Option<usize>,

    /// Retry the failed and aborted ids listed in a previous report
    #[arg(long, value_name = "REPORT", conflicts_with_all = ["offset", "limit"])]
    retry_from: Option<PathBuf>,

    /// Stop dispatching after this many seconds and write a partial report
    #[arg(long, value_name = "SECS")]
    deadline_secs: Option<u64>,

    /// Validate config and count the input without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "retry_from"])]
    dry_run: bool,

    /// Show statistics from the document store and exit
    #[arg(long, conflicts_with_all = ["dry_run", "retry_from"])]
    stats: bool,
}

type WorkSource = Box<dyn Iterator<Item = io::Result<WorkItem>> + Send>;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(offset) = cli.offset {
        config.input.offset = offset;
    }
    if let Some(limit) = cli.limit {
        config.input.limit = limit;
    }

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
        Ok(ExitCode::SUCCESS)
    } else if cli.stats {
        handle_stats(&config)?;
        Ok(ExitCode::SUCCESS)
    } else {
        handle_ingest(config, &config_hash, cli.retry_from, cli.deadline_secs).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_ingest=info,warn"),
            1 => EnvFilter::new("catalog_ingest=debug,info"),
            2 => EnvFilter::new("catalog_ingest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and counts the input
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Catalog-Ingest Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Request timeout: {}s", config.api.request_timeout_secs);
    println!("  Language: {}", config.api.language);
    println!("  Append to response: {}", config.api.append_to_response);

    println!("\nPipeline:");
    println!("  Pool size: {}", config.pipeline.pool_size);
    println!(
        "  Rate: {} requests per {}ms",
        config.pipeline.batch_size, config.pipeline.batch_delay_ms
    );
    println!(
        "  Cooldown: {}ms (max {}ms)",
        config.pipeline.cooldown_ms, config.pipeline.max_cooldown_ms
    );

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  Collection: {}", config.storage.collection);
    println!("  Report: {}", config.output.report_path);

    let path = Path::new(&config.input.path);
    let stats = survey(path)
        .with_context(|| format!("failed to read input {}", path.display()))?;

    println!("\nInput: {}", path.display());
    println!("  Lines: {}", stats.lines);
    println!("  Eligible records: {}", stats.yielded);
    println!("  Ineligible records: {}", stats.ineligible);
    println!("  Unparseable lines: {}", stats.parse_skips);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would fetch {} records",
        window(stats.yielded, config.input.offset, config.input.limit)
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the document store
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(&config.storage).context("failed to open the document store")?;
    let stats = load_statistics(&storage, 10)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles a full or retry ingestion run
async fn handle_ingest(
    config: Config,
    config_hash: &str,
    retry_from: Option<PathBuf>,
    deadline_secs: Option<u64>,
) -> anyhow::Result<ExitCode> {
    let store = Arc::new(
        open_storage(&config.storage).context("failed to open the document store")?,
    );
    let fetcher = Arc::new(HttpFetcher::new(&config.api).context("failed to build HTTP client")?);

    // Everything that can fail catastrophically happens before the run is
    // recorded and before anything is dispatched
    let (mode, state, total, items): (RunMode, RunState, u64, WorkSource) =
        match &retry_from {
            Some(report_path) => {
                let report = load_report(report_path).with_context(|| {
                    format!("failed to load report {}", report_path.display())
                })?;
                let ids = report.retry_ids()?;
                let state = report.to_run_state()?;
                println!("{} records to retry.", ids.len());
                let total = ids.len() as u64;
                (RunMode::Retry, state, total, Box::new(resume_items(ids)))
            }
            None => {
                let path = Path::new(&config.input.path);
                let stats = survey(path)
                    .with_context(|| format!("failed to read input {}", path.display()))?;
                println!("{} records found.", stats.yielded);
                let reader = SourceReader::open(path)?
                    .with_range(config.input.offset, config.input.limit);
                let total = window(stats.yielded, config.input.offset, config.input.limit);
                (RunMode::Full, RunState::new(), total, Box::new(reader))
            }
        };

    let run_id = store.create_run(config_hash, mode)?;
    tracing::info!("Starting {} run {}", mode.to_db_string(), run_id);

    let cancel = CancellationToken::new();
    spawn_interrupt_watcher(cancel.clone());
    if let Some(secs) = deadline_secs {
        spawn_deadline(cancel.clone(), Duration::from_secs(secs));
    }

    let report_path = PathBuf::from(&config.output.report_path);
    let mut coordinator = Coordinator::new(fetcher, Arc::clone(&store), config.pipeline.clone())
        .with_state(state)
        .with_report_path(&report_path)
        .with_expected_total(total)
        .with_cancellation(cancel.clone());
    let run_state = coordinator.state();

    let summary = match coordinator.run(items).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Run {} failed: {}", run_id, e);
            if let Err(finish_err) = store.finish_run(
                run_id,
                RunStatus::Failed,
                run_state.success_count(),
                run_state.failure_count(),
            ) {
                tracing::error!("Failed to record run {} as failed: {}", run_id, finish_err);
            }
            return Err(e).context("ingestion aborted");
        }
    };
    cancel.cancel();

    let status = if summary.cancelled {
        RunStatus::Interrupted
    } else {
        RunStatus::Completed
    };
    store.finish_run(
        run_id,
        status,
        summary.snapshot.success_count,
        summary.snapshot.failure_count,
    )?;

    print_summary(&summary, total, &report_path);

    if summary.has_permanent_failures() {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Number of records an offset/limit window selects out of `available`
fn window(available: u64, offset: usize, limit: usize) -> u64 {
    let remaining = available.saturating_sub(offset as u64);
    if limit == 0 {
        remaining
    } else {
        remaining.min(limit as u64)
    }
}

/// Cancels the run on Ctrl-C
fn spawn_interrupt_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    tracing::warn!("Interrupt received; finishing in-flight records");
                    cancel.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
            },
        }
    });
}

/// Cancels the run once the deadline passes
fn spawn_deadline(cancel: CancellationToken, after: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(after) => {
                tracing::warn!("Deadline of {:?} reached; stopping dispatch", after);
                cancel.cancel();
            }
        }
    });
}

fn print_summary(summary: &RunSummary, total: u64, report_path: &Path) {
    let snapshot = &summary.snapshot;

    println!("--------------------");
    if summary.cancelled {
        println!(
            "  Run interrupted after {} of {} records; {} in flight were aborted.",
            summary.dispatched,
            total,
            snapshot.aborted.len()
        );
    }
    for (kind, count) in snapshot.failures_by_kind() {
        println!("  {}: {}", kind, count);
    }
    println!(
        "  Saved {} of {} records. {} errors. See {} for details.",
        snapshot.success_count,
        total,
        snapshot.failure_count,
        report_path.display()
    );
}
