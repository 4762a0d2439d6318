//! Failure classification for a single work item
//!
//! Every per-item failure recorded in the run state carries one of these
//! kinds. The kind decides whether the id belongs on the next resume list.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an item failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Remote service answered 404; the id does not exist upstream
    NotFound,

    /// Remote service answered 429
    RateLimited,

    /// Network error, timeout, or unexpected non-2xx status
    Transient,

    /// 2xx response whose payload could not be used
    Fatal,

    /// Record was fetched but could not be persisted
    Storage,
}

impl FailureKind {
    /// Returns true if a later run may succeed for this id
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient | Self::Storage)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
            Self::Storage => "storage",
        }
    }

    /// Returns all failure kinds
    pub fn all() -> [Self; 5] {
        [
            Self::NotFound,
            Self::RateLimited,
            Self::Transient,
            Self::Fatal,
            Self::Storage,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(FailureKind::Transient.is_retryable());
        assert!(FailureKind::Storage.is_retryable());

        assert!(!FailureKind::NotFound.is_retryable());
        assert!(!FailureKind::Fatal.is_retryable());
    }

    #[test]
    fn test_string_form_matches_serde() {
        for kind in FailureKind::all() {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
