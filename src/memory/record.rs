//! Memory record variants and their fold rules

use super::confidence;
use crate::config::MemoryPolicy;
use crate::model::{CommitAuditRecord, Issue, IssueKind, Severity};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::LazyLock;

static CONVENTIONAL_COMMIT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(feat|fix|docs|style|refactor|perf|test|tests|build|ci|chore|revert|security)(\([^)]+\))?!?: \S",
    )
    .ok()
});

pub fn is_conventional_commit(message: &str) -> bool {
    let subject = message.lines().next().unwrap_or_default();
    CONVENTIONAL_COMMIT
        .as_ref()
        .is_some_and(|re| re.is_match(subject))
}

/// Stable identifier for a recurring issue signature
pub fn pattern_fingerprint(kind: IssueKind, rule: &str) -> String {
    let digest = blake3::hash(format!("{}:{}", kind.as_str(), rule.trim()).as_bytes());
    digest.to_hex()[..16].to_string()
}

/// A unit of retained knowledge, discriminated by `memory_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "memory_type", rename_all = "snake_case")]
pub enum MemoryRecord {
    ReviewPattern(ReviewPatternMemory),
    TeamStandard(TeamStandardMemory),
    AuthorPreference(AuthorPreferenceMemory),
}

impl MemoryRecord {
    pub fn as_review_pattern(&self) -> Option<&ReviewPatternMemory> {
        match self {
            MemoryRecord::ReviewPattern(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_team_standard(&self) -> Option<&TeamStandardMemory> {
        match self {
            MemoryRecord::TeamStandard(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_author_preference(&self) -> Option<&AuthorPreferenceMemory> {
        match self {
            MemoryRecord::AuthorPreference(a) => Some(a),
            _ => None,
        }
    }

    /// Copy with time-dependent fields evaluated at `at`
    pub(crate) fn decayed(mut self, at: DateTime<Utc>, policy: &MemoryPolicy) -> Self {
        if let MemoryRecord::ReviewPattern(pattern) = &mut self {
            pattern.confidence = pattern.effective_confidence(at, policy);
        }
        self
    }
}

/// A recurring issue signature, e.g. the same scanner rule firing again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPatternMemory {
    pub fingerprint: String,
    pub kind: IssueKind,
    pub rule: String,
    pub description: String,
    pub severity: Severity,
    pub occurrence_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub confidence: f64,
    pub evidence_commit_shas: Vec<String>,
    pub example_files: Vec<String>,
}

impl ReviewPatternMemory {
    pub(crate) fn first(issues: &[&Issue], sha: &str, at: DateTime<Utc>, policy: &MemoryPolicy) -> Option<Self> {
        let head = issues.first()?;
        let mut pattern = Self {
            fingerprint: pattern_fingerprint(head.kind, &head.rule),
            kind: head.kind,
            rule: head.rule.clone(),
            description: head.message.clone(),
            severity: head.severity,
            occurrence_count: 1,
            first_seen: at,
            last_seen: at,
            confidence: confidence::initial(policy),
            evidence_commit_shas: Vec::new(),
            example_files: Vec::new(),
        };
        pattern.absorb(issues, sha, policy);
        Some(pattern)
    }

    /// Fold one more commit exhibiting this pattern
    pub(crate) fn reinforce(
        &mut self,
        issues: &[&Issue],
        sha: &str,
        at: DateTime<Utc>,
        policy: &MemoryPolicy,
    ) {
        self.confidence = confidence::reinforce(self.confidence, self.last_seen, at, policy);
        self.occurrence_count += 1;
        self.first_seen = self.first_seen.min(at);
        self.last_seen = self.last_seen.max(at);
        self.absorb(issues, sha, policy);
    }

    fn absorb(&mut self, issues: &[&Issue], sha: &str, policy: &MemoryPolicy) {
        for issue in issues {
            self.severity = self.severity.max(issue.severity);
            if self.description.is_empty() && !issue.message.is_empty() {
                self.description = issue.message.clone();
            }
            if !self.example_files.contains(&issue.file) {
                push_capped(&mut self.example_files, issue.file.clone(), policy.evidence_limit);
            }
        }
        push_capped(&mut self.evidence_commit_shas, sha.to_string(), policy.evidence_limit);
    }

    pub fn effective_confidence(&self, at: DateTime<Utc>, policy: &MemoryPolicy) -> f64 {
        confidence::effective(self.confidence, self.last_seen, at, policy)
    }
}

/// Conventions the team can be inferred to follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standard {
    ConventionalCommits,
    CleanCommits(IssueKind),
}

impl Standard {
    pub fn all() -> [Standard; 3] {
        [
            Standard::ConventionalCommits,
            Standard::CleanCommits(IssueKind::Security),
            Standard::CleanCommits(IssueKind::Complexity),
        ]
    }

    pub fn identifier(&self) -> String {
        match self {
            Standard::ConventionalCommits => "conventional_commits".to_string(),
            Standard::CleanCommits(kind) => format!("no_{}_issues", kind.as_str()),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Standard::ConventionalCommits => {
                "commit subjects follow `type(scope): subject`".to_string()
            }
            Standard::CleanCommits(kind) => {
                format!("commits land without {} findings", kind.as_str())
            }
        }
    }

    pub fn holds_for(&self, record: &CommitAuditRecord) -> bool {
        match self {
            Standard::ConventionalCommits => is_conventional_commit(&record.message),
            Standard::CleanCommits(kind) => record.issues_of(*kind).next().is_none(),
        }
    }
}

/// An inferred team convention and how consistently it holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStandardMemory {
    pub rule: String,
    pub description: String,
    pub observations: u64,
    pub conforming: u64,
    pub strength: f64,
    pub evidence_commit_shas: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

impl TeamStandardMemory {
    pub(crate) fn empty(standard: Standard, at: DateTime<Utc>) -> Self {
        Self {
            rule: standard.identifier(),
            description: standard.description(),
            observations: 0,
            conforming: 0,
            strength: 0.0,
            evidence_commit_shas: Vec::new(),
            last_seen: at,
        }
    }

    pub(crate) fn observe(
        &mut self,
        conforms: bool,
        sha: &str,
        at: DateTime<Utc>,
        policy: &MemoryPolicy,
    ) {
        self.observations += 1;
        if conforms {
            self.conforming += 1;
            push_capped(&mut self.evidence_commit_shas, sha.to_string(), policy.evidence_limit);
        }
        self.strength = self.conforming as f64 / self.observations as f64;
        self.last_seen = self.last_seen.max(at);
    }
}

/// Per-author tendencies with a rolling window of recent scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorPreferenceMemory {
    pub author: String,
    pub author_email: String,
    pub commit_count: u64,
    pub issue_count: u64,
    pub issue_rate: f64,
    pub issues_by_kind: BTreeMap<String, u64>,
    pub recent_scores: VecDeque<f64>,
    pub average_recent_score: f64,
    pub average_change_size: f64,
    pub conventional_commit_ratio: f64,
    pub evidence_commit_shas: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

impl AuthorPreferenceMemory {
    pub(crate) fn empty(record: &CommitAuditRecord) -> Self {
        Self {
            author: record.author.clone(),
            author_email: record.author_email.clone(),
            commit_count: 0,
            issue_count: 0,
            issue_rate: 0.0,
            issues_by_kind: BTreeMap::new(),
            recent_scores: VecDeque::new(),
            average_recent_score: 0.0,
            average_change_size: 0.0,
            conventional_commit_ratio: 0.0,
            evidence_commit_shas: Vec::new(),
            last_seen: record.timestamp,
        }
    }

    pub(crate) fn observe(&mut self, record: &CommitAuditRecord, policy: &MemoryPolicy) {
        let previous = self.commit_count as f64;
        self.commit_count += 1;
        let count = self.commit_count as f64;

        self.issue_count += record.issue_count() as u64;
        self.issue_rate = self.issue_count as f64 / count;
        for issue in &record.issues {
            *self
                .issues_by_kind
                .entry(issue.kind.as_str().to_string())
                .or_insert(0) += 1;
        }

        let change_size = f64::from(record.additions) + f64::from(record.deletions);
        self.average_change_size = (self.average_change_size * previous + change_size) / count;

        let conventional = if is_conventional_commit(&record.message) { 1.0 } else { 0.0 };
        self.conventional_commit_ratio =
            (self.conventional_commit_ratio * previous + conventional) / count;

        self.recent_scores.push_back(record.quality_score);
        while self.recent_scores.len() > policy.score_window {
            self.recent_scores.pop_front();
        }
        self.average_recent_score =
            self.recent_scores.iter().sum::<f64>() / self.recent_scores.len() as f64;

        push_capped(
            &mut self.evidence_commit_shas,
            record.commit_sha.clone(),
            policy.evidence_limit,
        );
        self.last_seen = self.last_seen.max(record.timestamp);
    }
}

/// Append keeping only the newest `limit` entries
fn push_capped(items: &mut Vec<String>, item: String, limit: usize) {
    items.push(item);
    if items.len() > limit {
        let excess = items.len() - limit;
        items.drain(..excess);
    }
}
