//! Confidence reinforcement and lazy decay

use crate::config::MemoryPolicy;
use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Confidence as seen at `at`, given the last observation time
///
/// Full value inside the staleness window, then halving every
/// `half_life` beyond it. Never exceeds the stored value.
pub fn effective(
    confidence: f64,
    last_seen: DateTime<Utc>,
    at: DateTime<Utc>,
    policy: &MemoryPolicy,
) -> f64 {
    let elapsed = at - last_seen;
    let stale_for = elapsed - policy.staleness_window();
    if stale_for <= chrono::Duration::zero() {
        return confidence;
    }

    let half_lives =
        stale_for.num_seconds() as f64 / (policy.half_life().num_seconds() as f64).max(1.0);
    (confidence * 0.5_f64.powf(half_lives)).clamp(0.0, 1.0)
}

/// Confidence after one more observation at `at`
///
/// Starts from the decayed value and moves a fixed fraction of the
/// remaining distance towards 1.0.
pub fn reinforce(
    confidence: f64,
    last_seen: DateTime<Utc>,
    at: DateTime<Utc>,
    policy: &MemoryPolicy,
) -> f64 {
    let base = effective(confidence, last_seen, at, policy);
    (base + (1.0 - base) * policy.learning_rate).clamp(0.0, 1.0)
}

/// Confidence of a pattern seen exactly once
pub fn initial(policy: &MemoryPolicy) -> f64 {
    policy.learning_rate.clamp(0.0, 1.0)
}

/// Days since `since`, as a float; negative spans count as zero
pub fn days_between(since: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
    ((at - since).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0)
}
