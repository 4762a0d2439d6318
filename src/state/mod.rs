//! State module for tracking ingestion progress
//!
//! # Components
//!
//! - `RunState`: counters and failure ledger shared by all workers
//! - `RunSnapshot`: an unlocked copy of the run state for reporting
//! - `FailureKind`: classification of a per-item failure

mod failure;
mod run_state;

pub use failure::FailureKind;
pub use run_state::{RunSnapshot, RunState};
