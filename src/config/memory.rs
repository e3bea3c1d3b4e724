//! Retention policy for the memory layer

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// How long patterns stay fresh and how fast confidence moves
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryPolicy {
    /// Observations within this many days of `last_seen` keep full confidence
    #[serde(default = "default_staleness_window_days")]
    pub staleness_window_days: u32,

    /// Days for confidence to halve once the staleness window has elapsed
    #[serde(default = "default_half_life_days")]
    pub half_life_days: u32,

    /// Fraction of the remaining distance to 1.0 gained per observation
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Number of recent quality scores kept per author
    #[serde(default = "default_score_window")]
    pub score_window: usize,

    /// Maximum evidence SHAs kept on a single memory record
    #[serde(default = "default_evidence_limit")]
    pub evidence_limit: usize,
}

fn default_staleness_window_days() -> u32 {
    30
}

fn default_half_life_days() -> u32 {
    14
}

fn default_learning_rate() -> f64 {
    0.3
}

fn default_score_window() -> usize {
    10
}

fn default_evidence_limit() -> usize {
    10
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            staleness_window_days: default_staleness_window_days(),
            half_life_days: default_half_life_days(),
            learning_rate: default_learning_rate(),
            score_window: default_score_window(),
            evidence_limit: default_evidence_limit(),
        }
    }
}

impl MemoryPolicy {
    pub fn staleness_window(&self) -> Duration {
        Duration::days(i64::from(self.staleness_window_days))
    }

    pub fn half_life(&self) -> Duration {
        Duration::days(i64::from(self.half_life_days.max(1)))
    }

    /// Validate ranges that serde cannot express
    pub fn validate(&self) -> Result<(), String> {
        if !(self.learning_rate > 0.0 && self.learning_rate < 1.0) {
            return Err(format!(
                "memory.learning_rate must be in (0, 1), got {}",
                self.learning_rate
            ));
        }
        if self.score_window == 0 {
            return Err("memory.score_window must be at least 1".into());
        }
        if self.evidence_limit == 0 {
            return Err("memory.evidence_limit must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial() {
        let policy: MemoryPolicy = toml::from_str("staleness_window_days = 7").unwrap();
        assert_eq!(policy.staleness_window_days, 7);
        assert_eq!(policy.half_life_days, 14);
        assert_eq!(policy.score_window, 10);
    }

    #[test]
    fn test_validate_learning_rate() {
        let policy = MemoryPolicy {
            learning_rate: 1.5,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
        assert!(MemoryPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_reject_unknown_fields() {
        let result: Result<MemoryPolicy, _> = toml::from_str("decay = 3");
        assert!(result.is_err());
    }
}
