//! Trend view: bucketed quality over time and its direction

use super::engine::QueryEngine;
use super::{MAX_WINDOW_DAYS, QueryParams, QueryStatus, TrendWindow};
use crate::error::Result;
use crate::model::{CommitAuditRecord, IssueKind};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Degrading,
    Flat,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Degrading => "degrading",
            TrendDirection::Flat => "flat",
        }
    }
}

/// Aggregates for one time window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendBucket {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub commit_count: usize,
    pub avg_quality_score: f64,
    pub min_quality_score: f64,
    pub issue_count: usize,
    pub security_issues: usize,
    pub complexity_issues: usize,
    /// Commits in this bucket, oldest first
    pub commit_shas: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendResult {
    pub status: QueryStatus,
    pub repo: String,
    pub file: Option<String>,
    pub window: TrendWindow,
    pub buckets: Vec<TrendBucket>,
    pub direction: TrendDirection,
    /// Latest-window mean minus earliest-window mean
    pub delta: f64,
    pub insufficient_data: bool,
    /// Every commit considered, in chronological order
    pub evidence: Vec<String>,
}

impl<'a> QueryEngine<'a> {
    pub fn trend(&self, params: &QueryParams) -> Result<TrendResult> {
        let commits = self.scoped_commits(params)?;
        let buckets = bucketize(&commits, params.window);
        self.cancel.check()?;

        let (direction, delta, insufficient_data) =
            classify(&buckets, self.settings.trend_threshold);

        tracing::debug!(
            repo = %params.repo,
            buckets = buckets.len(),
            direction = ?direction,
            delta,
            "Computed trend"
        );

        Ok(TrendResult {
            status: if commits.is_empty() {
                QueryStatus::Empty
            } else {
                QueryStatus::Success
            },
            repo: params.repo.clone(),
            file: params.file.clone(),
            window: params.window,
            evidence: commits.iter().map(|c| c.commit_sha.clone()).collect(),
            buckets,
            direction,
            delta,
            insufficient_data,
        })
    }
}

/// Group chronologically ordered commits into windows; empty windows are skipped
pub(super) fn bucketize(commits: &[CommitAuditRecord], window: TrendWindow) -> Vec<TrendBucket> {
    let Some(first) = commits.first() else {
        return Vec::new();
    };

    let mut buckets: Vec<TrendBucket> = Vec::new();
    let mut current_index: Option<i64> = None;

    let origin = match first.timestamp.date_naive().and_hms_opt(0, 0, 0) {
        Some(midnight) => midnight.and_utc(),
        None => first.timestamp,
    };

    for (position, commit) in commits.iter().enumerate() {
        let (index, start, end) = match window {
            TrendWindow::PerCommit => (position as i64, commit.timestamp, commit.timestamp),
            TrendWindow::Days(days) => {
                let width = Duration::days(i64::from(days.clamp(1, MAX_WINDOW_DAYS)));
                let index = (commit.timestamp - origin).num_seconds() / width.num_seconds();
                let start = width
                    .checked_mul(index as i32)
                    .and_then(|offset| origin.checked_add_signed(offset))
                    .unwrap_or(origin);
                let end = start.checked_add_signed(width).unwrap_or(start);
                (index, start, end)
            }
        };

        if current_index != Some(index) {
            buckets.push(TrendBucket {
                start,
                end,
                commit_count: 0,
                avg_quality_score: 0.0,
                min_quality_score: f64::MAX,
                issue_count: 0,
                security_issues: 0,
                complexity_issues: 0,
                commit_shas: Vec::new(),
            });
            current_index = Some(index);
        }

        if let Some(bucket) = buckets.last_mut() {
            let n = bucket.commit_count as f64;
            bucket.avg_quality_score = (bucket.avg_quality_score * n + commit.quality_score) / (n + 1.0);
            bucket.commit_count += 1;
            bucket.min_quality_score = bucket.min_quality_score.min(commit.quality_score);
            bucket.issue_count += commit.issue_count();
            bucket.security_issues += commit.issues_of(IssueKind::Security).count();
            bucket.complexity_issues += commit.issues_of(IssueKind::Complexity).count();
            bucket.commit_shas.push(commit.commit_sha.clone());
        }
    }

    for bucket in &mut buckets {
        bucket.avg_quality_score = round2(bucket.avg_quality_score);
    }
    buckets
}

/// Delta-of-means between the earliest and latest bucket
pub(super) fn classify(buckets: &[TrendBucket], threshold: f64) -> (TrendDirection, f64, bool) {
    match (buckets.first(), buckets.last()) {
        (Some(first), Some(last)) if buckets.len() >= 2 => {
            let delta = round2(last.avg_quality_score - first.avg_quality_score);
            let direction = if delta > threshold {
                TrendDirection::Improving
            } else if delta < -threshold {
                TrendDirection::Degrading
            } else {
                TrendDirection::Flat
            };
            (direction, delta, false)
        }
        _ => (TrendDirection::Flat, 0.0, true),
    }
}

pub(super) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryPolicy, QuerySettings};
    use crate::query::fixtures::{commit, day, degrading_history, seeded};

    #[test]
    fn test_weekly_trend_degrades() {
        let (_dir, _db, handle) = seeded(&degrading_history());
        let settings = QuerySettings::default();
        let policy = MemoryPolicy::default();
        let engine = QueryEngine::new(&handle, &settings, &policy);

        let params = QueryParams {
            window: TrendWindow::Days(7),
            ..QueryParams::new("acme/api")
        };
        let trend = engine.trend(&params).unwrap();

        assert_eq!(trend.buckets.len(), 3);
        assert_eq!(trend.buckets[0].commit_shas, vec!["c1", "c2"]);
        assert_eq!(trend.buckets[0].avg_quality_score, 95.0);
        assert_eq!(trend.buckets[1].avg_quality_score, 75.0);
        assert_eq!(trend.buckets[1].security_issues, 1);
        assert_eq!(trend.buckets[1].complexity_issues, 2);
        assert_eq!(trend.buckets[2].avg_quality_score, 62.0);
        assert_eq!(trend.direction, TrendDirection::Degrading);
        assert_eq!(trend.delta, -33.0);
        assert_eq!(trend.evidence, vec!["c1", "c2", "c3", "c4", "c5"]);
    }

    #[test]
    fn test_huge_window_puts_history_in_one_bucket() {
        let mut commits = degrading_history();
        commits.sort_by_key(|c| c.timestamp);

        let buckets = bucketize(&commits, TrendWindow::Days(u32::MAX));
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].commit_count, commits.len());
        assert!(buckets[0].end > buckets[0].start);
    }

    #[test]
    fn test_per_commit_trend_for_one_file() {
        let (_dir, _db, handle) = seeded(&degrading_history());
        let settings = QuerySettings::default();
        let policy = MemoryPolicy::default();
        let engine = QueryEngine::new(&handle, &settings, &policy);

        let params = QueryParams {
            file: Some("main.py".into()),
            window: TrendWindow::PerCommit,
            ..QueryParams::new("acme/api")
        };
        let trend = engine.trend(&params).unwrap();
        let shas: Vec<_> = trend.buckets.iter().map(|b| b.commit_shas[0].as_str()).collect();
        assert_eq!(shas, vec!["c1", "c4", "c5"]);
        assert_eq!(trend.direction, TrendDirection::Degrading);
    }

    #[test]
    fn test_small_changes_are_flat() {
        let history = vec![
            commit("a", "Alice", day(0), 90.0, &["x.py"], vec![]),
            commit("b", "Alice", day(1), 91.5, &["x.py"], vec![]),
        ];
        let (_dir, _db, handle) = seeded(&history);
        let settings = QuerySettings::default();
        let policy = MemoryPolicy::default();
        let engine = QueryEngine::new(&handle, &settings, &policy);

        let params = QueryParams {
            window: TrendWindow::PerCommit,
            ..QueryParams::new("acme/api")
        };
        let trend = engine.trend(&params).unwrap();
        assert_eq!(trend.direction, TrendDirection::Flat);
        assert!(!trend.insufficient_data);
    }

    #[test]
    fn test_single_window_is_insufficient() {
        let history = vec![commit("a", "Alice", day(0), 90.0, &["x.py"], vec![])];
        let (_dir, _db, handle) = seeded(&history);
        let settings = QuerySettings::default();
        let policy = MemoryPolicy::default();
        let engine = QueryEngine::new(&handle, &settings, &policy);

        let trend = engine.trend(&QueryParams::new("acme/api")).unwrap();
        assert_eq!(trend.direction, TrendDirection::Flat);
        assert!(trend.insufficient_data);

        let empty = engine.trend(&QueryParams::new("acme/unknown")).unwrap();
        assert_eq!(empty.status, QueryStatus::Empty);
        assert!(empty.buckets.is_empty());
    }
}
