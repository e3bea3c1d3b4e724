//! Author view: per-author quality ranking with cited commits

use super::engine::QueryEngine;
use super::trend::round2;
use super::{QueryParams, QueryStatus};
use crate::error::Result;
use crate::model::{CommitAuditRecord, IssueKind, SortOrder};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Commits cited per author
const EVIDENCE_PER_AUTHOR: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorStat {
    pub author: String,
    pub author_email: String,
    pub commit_count: usize,
    pub avg_quality_score: f64,
    pub min_quality_score: f64,
    pub issue_count: usize,
    pub security_issues: usize,
    pub complexity_issues: usize,
    pub issues_per_commit: f64,
    /// Lowest-scoring commits first
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorsResult {
    pub status: QueryStatus,
    pub repo: String,
    pub order: SortOrder,
    pub authors: Vec<AuthorStat>,
    /// Each ranked author's cited commits, in rank order
    pub evidence: Vec<String>,
}

impl<'a> QueryEngine<'a> {
    pub fn authors(&self, params: &QueryParams) -> Result<AuthorsResult> {
        let commits = self.scoped_commits(params)?;

        let mut by_author: BTreeMap<&str, Vec<&CommitAuditRecord>> = BTreeMap::new();
        for commit in &commits {
            by_author.entry(commit.author.as_str()).or_default().push(commit);
        }
        self.cancel.check()?;

        let mut authors: Vec<AuthorStat> = by_author
            .into_iter()
            .map(|(author, commits)| summarize(author, &commits))
            .collect();

        authors.sort_by(|a, b| {
            let by_score = a
                .avg_quality_score
                .partial_cmp(&b.avg_quality_score)
                .unwrap_or(Ordering::Equal);
            let by_score = match params.order {
                SortOrder::Descending => by_score.reverse(),
                SortOrder::Ascending => by_score,
            };
            by_score.then_with(|| a.author.cmp(&b.author))
        });
        authors.truncate(self.limit(params, self.settings.default_limit));

        tracing::debug!(repo = %params.repo, authors = authors.len(), "Ranked authors");

        Ok(AuthorsResult {
            status: if authors.is_empty() {
                QueryStatus::Empty
            } else {
                QueryStatus::Success
            },
            repo: params.repo.clone(),
            order: params.order,
            evidence: authors.iter().flat_map(|a| a.evidence.iter().cloned()).collect(),
            authors,
        })
    }
}

fn summarize(author: &str, commits: &[&CommitAuditRecord]) -> AuthorStat {
    let count = commits.len();
    let total_score: f64 = commits.iter().map(|c| c.quality_score).sum();
    let issue_count: usize = commits.iter().map(|c| c.issue_count()).sum();

    let mut worst: Vec<&&CommitAuditRecord> = commits.iter().collect();
    worst.sort_by(|a, b| {
        a.quality_score
            .partial_cmp(&b.quality_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    AuthorStat {
        author: author.to_string(),
        author_email: commits
            .last()
            .map(|c| c.author_email.clone())
            .unwrap_or_default(),
        commit_count: count,
        avg_quality_score: round2(total_score / count.max(1) as f64),
        min_quality_score: commits
            .iter()
            .map(|c| c.quality_score)
            .fold(f64::INFINITY, f64::min),
        issue_count,
        security_issues: commits
            .iter()
            .map(|c| c.issues_of(IssueKind::Security).count())
            .sum(),
        complexity_issues: commits
            .iter()
            .map(|c| c.issues_of(IssueKind::Complexity).count())
            .sum(),
        issues_per_commit: round2(issue_count as f64 / count.max(1) as f64),
        evidence: worst
            .into_iter()
            .take(EVIDENCE_PER_AUTHOR)
            .map(|c| c.commit_sha.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryPolicy, QuerySettings};
    use crate::query::fixtures::{degrading_history, seeded};

    #[test]
    fn test_best_authors_first_by_default() {
        let (_dir, _db, handle) = seeded(&degrading_history());
        let settings = QuerySettings::default();
        let policy = MemoryPolicy::default();
        let engine = QueryEngine::new(&handle, &settings, &policy);

        let result = engine.authors(&QueryParams::new("acme/api")).unwrap();
        let names: Vec<_> = result.authors.iter().map(|a| a.author.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob", "Carol"]);

        let alice = &result.authors[0];
        assert_eq!(alice.commit_count, 2);
        assert_eq!(alice.avg_quality_score, 88.0);
        assert_eq!(alice.evidence, vec!["c3", "c1"]);

        let bob = &result.authors[1];
        assert_eq!(bob.avg_quality_score, 78.0);
        assert_eq!(bob.security_issues, 2);
        assert_eq!(bob.min_quality_score, 62.0);

        assert_eq!(result.evidence, vec!["c3", "c1", "c5", "c2", "c4"]);
    }

    #[test]
    fn test_worst_first_when_ascending() {
        let (_dir, _db, handle) = seeded(&degrading_history());
        let settings = QuerySettings::default();
        let policy = MemoryPolicy::default();
        let engine = QueryEngine::new(&handle, &settings, &policy);

        let params = QueryParams {
            order: SortOrder::Ascending,
            limit: Some(1),
            ..QueryParams::new("acme/api")
        };
        let result = engine.authors(&params).unwrap();
        assert_eq!(result.authors.len(), 1);
        assert_eq!(result.authors[0].author, "Carol");
        assert_eq!(result.evidence, vec!["c4"]);
    }
}
