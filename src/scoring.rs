//! Quality scoring for commits whose findings arrive without a score

use crate::model::{Issue, IssueKind, Severity};

/// Penalty points a single finding of this severity costs
pub fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 20.0,
        Severity::High => 10.0,
        Severity::Medium => 5.0,
        Severity::Low => 1.0,
    }
}

/// Sum of severity weights over a set of findings
pub fn severity_score(issues: &[Issue]) -> f64 {
    issues.iter().map(|i| severity_weight(i.severity)).sum()
}

pub fn security_score(issues: &[Issue]) -> f64 {
    let penalty: f64 = issues
        .iter()
        .filter(|i| i.kind == IssueKind::Security)
        .map(|i| severity_weight(i.severity))
        .sum();
    (100.0 - penalty).max(0.0)
}

pub fn complexity_score(issues: &[Issue]) -> f64 {
    let hot_spots = issues
        .iter()
        .filter(|i| i.kind == IssueKind::Complexity && i.severity >= Severity::High)
        .count();
    (100.0 - hot_spots as f64 * 3.0).max(0.0)
}

/// Security weighted 60%, complexity 40%, rounded to two decimals
pub fn quality_score(issues: &[Issue]) -> f64 {
    let score = security_score(issues) * 0.6 + complexity_score(issues) * 0.4;
    (score.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(kind: IssueKind, severity: Severity) -> Issue {
        Issue {
            kind,
            severity,
            file: "app/database.py".into(),
            line: 12,
            rule: "B608".into(),
            message: String::new(),
        }
    }

    #[test]
    fn test_clean_commit_scores_100() {
        assert_eq!(quality_score(&[]), 100.0);
    }

    #[test]
    fn test_security_findings_are_weighted_by_severity() {
        let issues = vec![
            issue(IssueKind::Security, Severity::Critical),
            issue(IssueKind::Security, Severity::Low),
        ];
        assert_eq!(security_score(&issues), 79.0);
        // 79 * 0.6 + 100 * 0.4
        assert_eq!(quality_score(&issues), 87.4);
    }

    #[test]
    fn test_only_high_complexity_counts() {
        let issues = vec![
            issue(IssueKind::Complexity, Severity::Medium),
            issue(IssueKind::Complexity, Severity::High),
            issue(IssueKind::Complexity, Severity::Critical),
        ];
        assert_eq!(complexity_score(&issues), 94.0);
    }

    #[test]
    fn test_security_score_floors_at_zero() {
        let issues: Vec<_> = (0..8)
            .map(|_| issue(IssueKind::Security, Severity::Critical))
            .collect();
        assert_eq!(security_score(&issues), 0.0);
        assert_eq!(quality_score(&issues), 40.0);
    }
}
