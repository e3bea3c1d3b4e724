//! Query engine and orchestrator settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySettings {
    /// Per-view timeout inside a composite request
    #[serde(default = "default_view_timeout_ms")]
    pub view_timeout_ms: u64,

    /// Score delta (points) separating flat from improving/degrading
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold: f64,

    /// Row cap applied when a caller gives no limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Contributors returned by the root-cause view
    #[serde(default = "default_root_cause_top")]
    pub root_cause_top: usize,

    /// Patterns returned by the pattern view
    #[serde(default = "default_pattern_top")]
    pub pattern_top: usize,
}

fn default_view_timeout_ms() -> u64 {
    5000
}

fn default_trend_threshold() -> f64 {
    2.0
}

fn default_limit() -> usize {
    100
}

fn default_root_cause_top() -> usize {
    5
}

fn default_pattern_top() -> usize {
    10
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            view_timeout_ms: default_view_timeout_ms(),
            trend_threshold: default_trend_threshold(),
            default_limit: default_limit(),
            root_cause_top: default_root_cause_top(),
            pattern_top: default_pattern_top(),
        }
    }
}

impl QuerySettings {
    pub fn view_timeout(&self) -> Duration {
        Duration::from_millis(self.view_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings: QuerySettings = toml::from_str("").unwrap();
        assert_eq!(settings, QuerySettings::default());
        assert_eq!(settings.view_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_override_threshold() {
        let settings: QuerySettings = toml::from_str("trend_threshold = 0.5").unwrap();
        assert_eq!(settings.trend_threshold, 0.5);
        assert_eq!(settings.root_cause_top, 5);
    }
}
