//! Audit records, findings and query filters

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Category of a finding produced by the static scanners
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Security,
    Complexity,
}

impl IssueKind {
    pub const ALL: [IssueKind; 2] = [IssueKind::Security, IssueKind::Complexity];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Security => "security",
            IssueKind::Complexity => "complexity",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "security" => Ok(IssueKind::Security),
            "complexity" => Ok(IssueKind::Complexity),
            other => Err(LedgerError::invalid(format!("unknown issue kind '{}'", other))),
        }
    }
}

/// Severity ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding inside a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub file: String,
    pub line: u32,

    /// Scanner rule identifier (e.g. "B608", "cyclomatic")
    pub rule: String,

    #[serde(default)]
    pub message: String,
}

/// Stored quality snapshot for one analyzed commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitAuditRecord {
    pub repo: String,
    pub commit_sha: String,
    pub author: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub files_changed: Vec<String>,
    pub quality_score: f64,
    pub issues: Vec<Issue>,
    pub additions: u32,
    pub deletions: u32,
}

impl CommitAuditRecord {
    /// Returns the name of the first identity field that differs, if any
    pub fn identity_mismatch(&self, other: &CommitAuditRecord) -> Option<&'static str> {
        if self.commit_sha != other.commit_sha {
            Some("commit_sha")
        } else if self.author != other.author {
            Some("author")
        } else if self.author_email != other.author_email {
            Some("author_email")
        } else if self.timestamp != other.timestamp {
            Some("timestamp")
        } else if self.message != other.message {
            Some("message")
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.repo.trim().is_empty() {
            return Err(LedgerError::invalid("repo must not be empty"));
        }
        if self.commit_sha.trim().is_empty() {
            return Err(LedgerError::invalid("commit_sha must not be empty"));
        }
        if !(0.0..=100.0).contains(&self.quality_score) || self.quality_score.is_nan() {
            return Err(LedgerError::invalid(format!(
                "quality_score {} for {} is outside 0-100",
                self.quality_score, self.commit_sha
            )));
        }
        Ok(())
    }

    pub fn short_sha(&self) -> &str {
        short_sha(&self.commit_sha)
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    /// True if any changed path matches `filter` under the path-matching rule
    pub fn touches(&self, filter: &str) -> bool {
        self.files_changed.iter().any(|p| path_matches(p, filter))
    }
}

pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

/// Final segment of a repository-relative path
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Exact path or exact final-segment match, never substring
pub fn path_matches(stored: &str, filter: &str) -> bool {
    stored == filter || basename(stored) == filter
}

/// Dependency snapshot for one file as of a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraphEntry {
    pub repo: String,
    pub file_path: String,
    pub as_of_sha: String,
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub imports: BTreeSet<String>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub external_deps: BTreeSet<String>,
}

/// Inclusive time range; either bound may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<Self> {
        let range = Self { from, to };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(LedgerError::invalid(format!(
                    "date range start {} is after end {}",
                    from.to_rfc3339(),
                    to.to_rfc3339()
                )));
            }
        }
        Ok(())
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|f| at >= f) && self.to.is_none_or(|t| at <= t)
    }

    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl FromStr for SortOrder {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(LedgerError::invalid(format!("unknown sort order '{}'", other))),
        }
    }
}

/// Filter for `AuditStore::get_commits`; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitFilter {
    pub author: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub date_range: DateRange,
    pub min_issues: Option<u32>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub order: SortOrder,
}

impl CommitFilter {
    pub fn validate(&self) -> Result<()> {
        self.date_range.validate()?;
        if self.limit == Some(0) {
            return Err(LedgerError::invalid("limit must be at least 1"));
        }
        if self.files.iter().any(|f| f.trim().is_empty()) {
            return Err(LedgerError::invalid("file filters must not be empty"));
        }
        if let Some(author) = &self.author {
            if author.trim().is_empty() {
                return Err(LedgerError::invalid("author filter must not be empty"));
            }
        }
        Ok(())
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_date_range(mut self, range: DateRange) -> Self {
        self.date_range = range;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}
