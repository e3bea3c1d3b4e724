//! Analytical views over the audit store and the memory layer
//!
//! Every view is a read-only function of the stored data and returns a typed
//! result together with the commit SHAs it drew its conclusion from.

mod authors;
mod engine;
mod patterns;
mod root_cause;
mod trend;

pub use authors::{AuthorStat, AuthorsResult};
pub use engine::{FilterResponse, QueryEngine};
pub use patterns::{PatternEntry, PatternsResult};
pub use root_cause::{Contributor, DegradationSignal, RootCauseResult};
pub use trend::{TrendBucket, TrendDirection, TrendResult};

use crate::error::{LedgerError, Result};
use crate::model::{CommitFilter, DateRange, IssueKind, SortOrder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Explicit status carried by every query response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Success,
    Empty,
}

/// Time bucketing for trend and root-cause views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "unit", content = "size")]
pub enum TrendWindow {
    /// One bucket per commit
    PerCommit,
    /// Fixed-width buckets of this many days
    Days(u32),
}

/// Widest accepted fixed window, roughly a century
pub const MAX_WINDOW_DAYS: u32 = 36_500;

impl TrendWindow {
    pub fn validate(&self) -> Result<()> {
        match *self {
            TrendWindow::Days(0) => Err(LedgerError::invalid("trend window must be at least one day")),
            TrendWindow::Days(n) if n > MAX_WINDOW_DAYS => Err(LedgerError::invalid(format!(
                "trend window of {} days exceeds the {} day maximum",
                n, MAX_WINDOW_DAYS
            ))),
            _ => Ok(()),
        }
    }
}

impl Default for TrendWindow {
    fn default() -> Self {
        TrendWindow::Days(7)
    }
}

impl fmt::Display for TrendWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendWindow::PerCommit => f.write_str("commit"),
            TrendWindow::Days(n) => write!(f, "{}d", n),
        }
    }
}

impl FromStr for TrendWindow {
    type Err = LedgerError;

    /// Accepts `commit`, `day`, `week`, `month` or `<n>d`
    fn from_str(s: &str) -> Result<Self> {
        let window = match s.trim().to_lowercase().as_str() {
            "commit" | "per-commit" | "per_commit" => TrendWindow::PerCommit,
            "day" | "daily" => TrendWindow::Days(1),
            "week" | "weekly" => TrendWindow::Days(7),
            "month" | "monthly" => TrendWindow::Days(30),
            other => {
                let days = other
                    .strip_suffix('d')
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(|| LedgerError::invalid(format!("unknown trend window '{}'", s)))?;
                TrendWindow::Days(days)
            }
        };
        window.validate()?;
        Ok(window)
    }
}

/// Parameters shared by every view of one request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryParams {
    pub repo: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default)]
    pub window: TrendWindow,
    /// Cap on returned items; the configured default applies when absent
    #[serde(default)]
    pub limit: Option<usize>,
    /// Author ranking: descending puts the best average score first
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub kind: Option<IssueKind>,
}

impl QueryParams {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.repo.trim().is_empty() {
            return Err(LedgerError::invalid("repository name must not be empty"));
        }
        if self.limit == Some(0) {
            return Err(LedgerError::invalid("limit must be at least 1"));
        }
        self.window.validate()?;
        self.date_range.validate()
    }

    /// Filter selecting every commit in scope, oldest first
    pub(crate) fn commit_filter(&self) -> CommitFilter {
        CommitFilter {
            author: self.author.clone(),
            files: self.file.iter().cloned().collect(),
            date_range: self.date_range,
            min_issues: None,
            limit: None,
            order: SortOrder::Ascending,
        }
    }
}
