//! Fetch module for retrieving records from the remote API
//!
//! This module contains:
//! - The `RecordFetcher` seam used by the pipeline
//! - The HTTP implementation and its response classification
//! - The tagged `FetchOutcome` every fetch resolves to

mod http;

pub use http::{build_http_client, decode_record, HttpFetcher};

use std::future::Future;

/// A record fetched from the remote API
///
/// The document is passed through untouched; only its top-level `id` is
/// checked against the requested id.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRecord {
    pub id: u64,
    pub document: serde_json::Value,
}

/// Result of fetching one id
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 2xx with a decodable body whose id matches the request
    Success(FetchedRecord),

    /// The id does not exist upstream; never retried
    NotFound,

    /// The service signaled rate-limit exhaustion
    RateLimited,

    /// Network failure, timeout, or unexpected status; safe to retry later
    Transient(String),

    /// 2xx with a payload that cannot be used
    Fatal(String),
}

impl FetchOutcome {
    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Transient(_) => "transient",
            Self::Fatal(_) => "fatal",
        }
    }
}

/// Performs one bounded fetch per id
///
/// Implementations classify the response and never touch shared pipeline
/// state.
pub trait RecordFetcher: Send + Sync + 'static {
    fn fetch(&self, id: u64) -> impl Future<Output = FetchOutcome> + Send;
}
