//! Error types for the audit ledger

use crate::orchestrator::ViewKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the store, sync controller, memory layer and queries
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Rejected before any write happened
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    /// A stored commit has the same SHA but different identity fields
    #[error("commit {sha} already stored with a different {field}")]
    Conflict { sha: String, field: &'static str },

    #[error("a bootstrap or sync is already running for {repo}")]
    SyncInProgress { repo: String },

    #[error("{repo} is already bootstrapped, use sync instead")]
    AlreadyBootstrapped { repo: String },

    #[error("{repo} has not been bootstrapped yet")]
    NotBootstrapped { repo: String },

    #[error("cursor for {repo} cannot move back from {current} to {requested}")]
    CursorRegression {
        repo: String,
        current: String,
        requested: String,
    },

    #[error("commit source error: {0}")]
    Source(#[from] SourceError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("all {} requested views failed", failures.len())]
    AllViewsFailed { failures: Vec<PartialResultError> },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// True when the caller may simply try again later without changing input
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::SyncInProgress { .. } | LedgerError::Source(_)
        )
    }
}

/// Failures reported by the external collaborators (commit source, findings producer)
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("failed to fetch {what}: {message}")]
    Fetch { what: String, message: String },

    #[error("analysis of {sha} failed: {message}")]
    Analysis { sha: String, message: String },

    #[error("source unavailable: {message}")]
    Unavailable { message: String },
}

impl SourceError {
    pub fn fetch(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn analysis(sha: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Analysis {
            sha: sha.into(),
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Why a single view inside a composite request produced no result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewFailure {
    #[error("{message}")]
    Error { message: String },

    #[error("timed out after {elapsed_ms}ms")]
    TimedOut { elapsed_ms: u64 },

    #[error("view task panicked: {message}")]
    Panicked { message: String },

    #[error("cancelled")]
    Cancelled,
}

impl ViewFailure {
    pub fn timed_out(elapsed: Duration) -> Self {
        Self::TimedOut {
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

impl From<LedgerError> for ViewFailure {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Cancelled => ViewFailure::Cancelled,
            other => ViewFailure::Error {
                message: other.to_string(),
            },
        }
    }
}

/// Per-view failure marker attached to a composite response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("view '{view}' failed: {failure}")]
pub struct PartialResultError {
    pub view: ViewKind,
    pub failure: ViewFailure,
}

impl PartialResultError {
    pub fn new(view: ViewKind, failure: ViewFailure) -> Self {
        Self { view, failure }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(
            LedgerError::SyncInProgress {
                repo: "acme/api".into()
            }
            .is_retryable()
        );
        assert!(LedgerError::Source(SourceError::unavailable("down")).is_retryable());
        assert!(!LedgerError::invalid("count must be positive").is_retryable());
        assert!(
            !LedgerError::AlreadyBootstrapped {
                repo: "acme/api".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_cancelled_maps_to_cancelled_view_failure() {
        assert_eq!(ViewFailure::from(LedgerError::Cancelled), ViewFailure::Cancelled);

        let failure = ViewFailure::from(LedgerError::not_found("commit abc"));
        assert!(matches!(failure, ViewFailure::Error { ref message } if message.contains("abc")));
    }

    #[test]
    fn test_partial_result_error_display() {
        let err = PartialResultError::new(
            ViewKind::RootCause,
            ViewFailure::timed_out(Duration::from_millis(250)),
        );
        let display = err.to_string();
        assert!(display.contains("root_cause"));
        assert!(display.contains("250ms"));
    }

    #[test]
    fn test_all_views_failed_display() {
        let err = LedgerError::AllViewsFailed {
            failures: vec![
                PartialResultError::new(ViewKind::Trend, ViewFailure::Cancelled),
                PartialResultError::new(ViewKind::Authors, ViewFailure::Cancelled),
            ],
        };
        assert_eq!(err.to_string(), "all 2 requested views failed");
    }
}
