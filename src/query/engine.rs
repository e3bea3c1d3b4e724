//! Query engine entry point and the commit filter view

use super::{QueryParams, QueryStatus};
use crate::cancel::CancellationToken;
use crate::config::{MemoryPolicy, QuerySettings};
use crate::error::Result;
use crate::model::{CommitAuditRecord, CommitFilter};
use crate::store::StoreHandle;
use serde::Serialize;

/// Response of `filter_commits`
#[derive(Debug, Clone, Serialize)]
pub struct FilterResponse {
    pub status: QueryStatus,
    pub commits: Vec<CommitAuditRecord>,
    /// Matches before the limit was applied
    pub total_found: usize,
}

/// Read-only views over one store handle
pub struct QueryEngine<'a> {
    pub(super) handle: &'a StoreHandle,
    pub(super) settings: &'a QuerySettings,
    pub(super) policy: &'a MemoryPolicy,
    pub(super) cancel: CancellationToken,
}

impl<'a> QueryEngine<'a> {
    pub fn new(handle: &'a StoreHandle, settings: &'a QuerySettings, policy: &'a MemoryPolicy) -> Self {
        Self {
            handle,
            settings,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort long-running views when `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Commits matching any combination of author, files, dates and issue count
    pub fn filter_commits(&self, repo: &str, filter: &CommitFilter) -> Result<FilterResponse> {
        filter.validate()?;
        self.cancel.check()?;

        let limit = filter.limit.unwrap_or(self.settings.default_limit);
        let unbounded = CommitFilter {
            limit: None,
            ..filter.clone()
        };
        let mut commits = self.handle.audit().get_commits(repo, &unbounded)?;
        self.cancel.check()?;

        let total_found = commits.len();
        commits.truncate(limit);

        tracing::debug!(repo, total_found, returned = commits.len(), "Filtered commits");

        Ok(FilterResponse {
            status: if commits.is_empty() {
                QueryStatus::Empty
            } else {
                QueryStatus::Success
            },
            commits,
            total_found,
        })
    }

    /// Every commit in scope of `params`, oldest first
    pub(super) fn scoped_commits(&self, params: &QueryParams) -> Result<Vec<CommitAuditRecord>> {
        params.validate()?;
        self.cancel.check()?;
        let commits = self
            .handle
            .audit()
            .get_commits(&params.repo, &params.commit_filter())?;
        self.cancel.check()?;
        Ok(commits)
    }

    pub(super) fn limit(&self, params: &QueryParams, default: usize) -> usize {
        params.limit.unwrap_or(default)
    }
}
