//! External collaborators: the commit source and the findings producer
//!
//! The ledger never talks to a hosting platform or parses code itself. It
//! consumes ordered commit metadata from a [`CommitSource`] and
//! already-computed findings from a [`FindingsProducer`].

mod history;

pub use history::{HistoryCommit, HistoryFile, HistorySource};

use crate::error::SourceError;
use crate::model::Issue;
use crate::store::SyncCursor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Position of a commit in upstream history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub sha: String,
    pub timestamp: DateTime<Utc>,
}

/// Commit metadata as delivered by the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCommit {
    pub sha: String,
    pub author: String,
    #[serde(default)]
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
}

impl SourceCommit {
    pub fn commit_ref(&self) -> CommitRef {
        CommitRef {
            sha: self.sha.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Import/export facts for one file touched by a commit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDependencies {
    pub file_path: String,
    #[serde(default)]
    pub imports: BTreeSet<String>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub external_deps: BTreeSet<String>,
}

/// Output of the findings producer for one commit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub dependencies: Vec<FileDependencies>,
    /// Producer-supplied score; computed from the issues when absent
    #[serde(default)]
    pub quality_score: Option<f64>,
}

/// Opens scoped sessions against an upstream repository
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Acquire a session; it is released when the returned box is dropped
    async fn open(&self, repo: &str) -> Result<Box<dyn SourceSession>, SourceError>;
}

/// One acquired connection to the upstream repository
#[async_trait]
pub trait SourceSession: Send {
    /// Commits strictly after `since` (or from the beginning of history),
    /// oldest first, at most `limit` of them
    async fn list_commits(
        &mut self,
        since: Option<&SyncCursor>,
        limit: Option<usize>,
    ) -> Result<Vec<CommitRef>, SourceError>;

    async fn fetch_commit(&mut self, sha: &str) -> Result<SourceCommit, SourceError>;
}

/// Black-box static analysis over a fetched commit
#[async_trait]
pub trait FindingsProducer: Send + Sync {
    async fn analyze(&self, commit: &SourceCommit) -> Result<Analysis, SourceError>;
}
