//! Pipeline module for the concurrent ingestion loop
//!
//! This module contains:
//! - The coordinator that drains the work source into a bounded worker pool
//! - The per-item worker
//! - The shared rate limiter
//! - Lifecycle states and progress estimates

mod coordinator;
mod lifecycle;
mod limiter;
mod progress;
mod worker;

pub use coordinator::{Coordinator, RunSummary};
pub use lifecycle::PipelineState;
pub use limiter::RateLimiter;
pub use progress::{HumanDuration, ProgressEstimate};
