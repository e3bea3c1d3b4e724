//! Root-cause view: which commits drove a quality drop

use super::engine::QueryEngine;
use super::trend::{TrendBucket, TrendDirection, bucketize, classify, round2};
use super::{QueryParams, QueryStatus, TrendWindow};
use crate::error::Result;
use crate::model::{CommitAuditRecord, Issue};
use crate::scoring;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Days over which recency weight halves
const RECENCY_SCALE_DAYS: f64 = 7.0;

/// The window a degradation was detected in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradationSignal {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub baseline_score: f64,
    pub degraded_score: f64,
    pub drop: f64,
}

/// One ranked commit inside a degradation window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contributor {
    pub commit_sha: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub quality_score: f64,
    pub severity_score: f64,
    pub recency: f64,
    pub rank_score: f64,
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RootCauseResult {
    pub status: QueryStatus,
    pub repo: String,
    pub window: TrendWindow,
    /// `None` when quality did not drop beyond the threshold
    pub signal: Option<DegradationSignal>,
    pub contributors: Vec<Contributor>,
    /// Contributor SHAs in rank order
    pub evidence: Vec<String>,
}

impl<'a> QueryEngine<'a> {
    pub fn root_cause(&self, params: &QueryParams) -> Result<RootCauseResult> {
        let commits = self.scoped_commits(params)?;
        let buckets = bucketize(&commits, params.window);
        let threshold = self.settings.trend_threshold;

        let found = find_degradation(&buckets, threshold);
        let mut contributors = Vec::new();
        let mut signal = None;

        if let Some((signal_found, window)) = found {
            let in_window: HashSet<&str> = window
                .iter()
                .flat_map(|b| b.commit_shas.iter().map(String::as_str))
                .collect();
            let candidates: Vec<&CommitAuditRecord> = commits
                .iter()
                .filter(|c| in_window.contains(c.commit_sha.as_str()))
                .collect();

            self.cancel.check()?;
            contributors = rank_contributors(&candidates);
            contributors.truncate(self.limit(params, self.settings.root_cause_top));
            signal = Some(signal_found);
        }

        tracing::debug!(
            repo = %params.repo,
            degraded = signal.is_some(),
            contributors = contributors.len(),
            "Computed root cause"
        );

        Ok(RootCauseResult {
            status: if contributors.is_empty() {
                QueryStatus::Empty
            } else {
                QueryStatus::Success
            },
            repo: params.repo.clone(),
            window: params.window,
            evidence: contributors.iter().map(|c| c.commit_sha.clone()).collect(),
            signal,
            contributors,
        })
    }
}

/// Overall degradation spans everything after the baseline window;
/// otherwise the sharpest single step down beyond the threshold
fn find_degradation(
    buckets: &[TrendBucket],
    threshold: f64,
) -> Option<(DegradationSignal, &[TrendBucket])> {
    let (direction, _, _) = classify(buckets, threshold);

    if direction == TrendDirection::Degrading {
        let first = buckets.first()?;
        let last = buckets.last()?;
        return Some((
            DegradationSignal {
                start: first.start,
                end: last.end,
                baseline_score: first.avg_quality_score,
                degraded_score: last.avg_quality_score,
                drop: round2(first.avg_quality_score - last.avg_quality_score),
            },
            &buckets[1..],
        ));
    }

    let mut sharpest: Option<(usize, f64)> = None;
    for (i, pair) in buckets.windows(2).enumerate() {
        let drop = pair[0].avg_quality_score - pair[1].avg_quality_score;
        if drop > threshold && sharpest.is_none_or(|(_, best)| drop > best) {
            sharpest = Some((i + 1, drop));
        }
    }

    let (index, drop) = sharpest?;
    let before = &buckets[index - 1];
    let after = &buckets[index];
    Some((
        DegradationSignal {
            start: after.start,
            end: after.end,
            baseline_score: before.avg_quality_score,
            degraded_score: after.avg_quality_score,
            drop: round2(drop),
        },
        &buckets[index..=index],
    ))
}

/// Severity × recency, ties broken by earlier timestamp then SHA
fn rank_contributors(candidates: &[&CommitAuditRecord]) -> Vec<Contributor> {
    let Some(window_end) = candidates.iter().map(|c| c.timestamp).max() else {
        return Vec::new();
    };

    let mut ranked: Vec<Contributor> = candidates
        .iter()
        .filter_map(|commit| {
            let severity = scoring::severity_score(&commit.issues);
            if severity <= 0.0 {
                return None;
            }
            let recency = recency_weight(commit.timestamp, window_end);
            Some(Contributor {
                commit_sha: commit.commit_sha.clone(),
                author: commit.author.clone(),
                timestamp: commit.timestamp,
                quality_score: commit.quality_score,
                severity_score: severity,
                recency: round2(recency),
                rank_score: round2(severity * recency),
                issues: commit.issues.clone(),
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.rank_score
            .partial_cmp(&a.rank_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
            .then_with(|| a.commit_sha.cmp(&b.commit_sha))
    });
    ranked
}

/// Whole days before the window end, so commits on the same day weigh the same
pub(super) fn recency_weight(at: DateTime<Utc>, window_end: DateTime<Utc>) -> f64 {
    let age_days = (window_end - at).num_days().max(0) as f64;
    1.0 / (1.0 + age_days / RECENCY_SCALE_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryPolicy, QuerySettings};
    use crate::model::{IssueKind, Severity};
    use crate::query::fixtures::{commit, day, degrading_history, issue, seeded};
    use chrono::Duration;

    #[test]
    fn test_ranks_by_severity_and_recency() {
        let (_dir, _db, handle) = seeded(&degrading_history());
        let settings = QuerySettings::default();
        let policy = MemoryPolicy::default();
        let engine = QueryEngine::new(&handle, &settings, &policy);

        let result = engine
            .root_cause(&QueryParams {
                window: TrendWindow::Days(7),
                ..QueryParams::new("acme/api")
            })
            .unwrap();

        let signal = result.signal.unwrap();
        assert_eq!(signal.baseline_score, 95.0);
        assert_eq!(signal.degraded_score, 62.0);
        assert_eq!(result.evidence, vec!["c5", "c4", "c3"]);
        assert_eq!(result.contributors[0].rank_score, 20.0);
        assert_eq!(result.contributors[0].issues.len(), 2);
    }

    #[test]
    fn test_equal_scores_break_ties_by_earlier_timestamp() {
        let sql = || issue(IssueKind::Security, Severity::High, "app/db.py", "B608");
        let history = vec![
            commit("base", "Alice", day(0), 98.0, &["a.py"], vec![]),
            commit("aa-late", "Bob", day(3) + Duration::hours(5), 80.0, &["b.py"], vec![sql()]),
            commit("zz-early", "Carol", day(3) + Duration::hours(1), 80.0, &["c.py"], vec![sql()]),
        ];
        let (_dir, _db, handle) = seeded(&history);
        let settings = QuerySettings::default();
        let policy = MemoryPolicy::default();
        let engine = QueryEngine::new(&handle, &settings, &policy);
        let params = QueryParams {
            window: TrendWindow::PerCommit,
            ..QueryParams::new("acme/api")
        };

        for _ in 0..3 {
            let result = engine.root_cause(&params).unwrap();
            assert_eq!(result.evidence, vec!["zz-early", "aa-late"]);
        }
    }

    #[test]
    fn test_sharpest_step_used_when_overall_flat() {
        let secret = || issue(IssueKind::Security, Severity::Critical, "app/config.py", "B105");
        let history = vec![
            commit("c1", "Alice", day(0), 90.0, &["a.py"], vec![]),
            commit("c2", "Bob", day(1), 70.0, &["b.py"], vec![secret()]),
            commit("c3", "Alice", day(2), 91.0, &["a.py"], vec![]),
        ];
        let (_dir, _db, handle) = seeded(&history);
        let settings = QuerySettings::default();
        let policy = MemoryPolicy::default();
        let engine = QueryEngine::new(&handle, &settings, &policy);

        let result = engine
            .root_cause(&QueryParams {
                window: TrendWindow::PerCommit,
                ..QueryParams::new("acme/api")
            })
            .unwrap();
        assert_eq!(result.signal.unwrap().drop, 20.0);
        assert_eq!(result.evidence, vec!["c2"]);
    }

    #[test]
    fn test_no_degradation_is_empty() {
        let history = vec![
            commit("c1", "Alice", day(0), 80.0, &["a.py"], vec![]),
            commit("c2", "Alice", day(1), 90.0, &["a.py"], vec![]),
        ];
        let (_dir, _db, handle) = seeded(&history);
        let settings = QuerySettings::default();
        let policy = MemoryPolicy::default();
        let engine = QueryEngine::new(&handle, &settings, &policy);

        let result = engine.root_cause(&QueryParams::new("acme/api")).unwrap();
        assert_eq!(result.status, QueryStatus::Empty);
        assert!(result.signal.is_none());
        assert!(result.evidence.is_empty());
    }

    #[test]
    fn test_recency_weight_is_day_quantised() {
        let end = day(10);
        assert_eq!(recency_weight(end, end), 1.0);
        assert_eq!(recency_weight(end - Duration::hours(20), end), 1.0);
        assert_eq!(recency_weight(end - Duration::days(7), end), 0.5);
    }
}
