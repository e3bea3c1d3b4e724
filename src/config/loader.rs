//! Configuration loading with multi-layer merge

use super::{MemoryPolicy, QuerySettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level ledger configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub memory: MemoryPolicy,

    #[serde(default)]
    pub query: QuerySettings,
}

/// Where the audit database lives
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Database file; `~` and `$VARS` are expanded
    pub database: Option<String>,

    /// How long a writer waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/quality-ledger/config.toml
    /// 3. .quality-ledger/config.toml (project)
    /// 4. An explicit file, if given
    pub fn load(project_dir: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = Self::project_dir(project_dir).join("config.toml");
        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        if let Some(path) = explicit {
            let explicit_config =
                Self::load_file(path).with_context(|| format!("loading {}", path.display()))?;
            config.merge(explicit_config);
        }

        config
            .memory
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/quality-ledger/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("quality-ledger/config.toml"))
    }

    fn project_dir(project_dir: Option<&Path>) -> PathBuf {
        project_dir
            .map(|p| p.join(".quality-ledger"))
            .unwrap_or_else(|| PathBuf::from(".quality-ledger"))
    }

    /// Resolve the database path, expanding `~` and environment variables
    pub fn database_path(&self, project_dir: Option<&Path>) -> Result<PathBuf> {
        match &self.storage.database {
            Some(raw) => {
                let expanded = shellexpand::full(raw)
                    .with_context(|| format!("expanding database path '{}'", raw))?;
                Ok(PathBuf::from(expanded.as_ref()))
            }
            None => Ok(Self::project_dir(project_dir).join("ledger.db")),
        }
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        let storage_defaults = StorageConfig::default();
        if other.storage.database.is_some() {
            self.storage.database = other.storage.database;
        }
        if other.storage.busy_timeout_ms != storage_defaults.busy_timeout_ms {
            self.storage.busy_timeout_ms = other.storage.busy_timeout_ms;
        }

        let memory_defaults = MemoryPolicy::default();
        if other.memory.staleness_window_days != memory_defaults.staleness_window_days {
            self.memory.staleness_window_days = other.memory.staleness_window_days;
        }
        if other.memory.half_life_days != memory_defaults.half_life_days {
            self.memory.half_life_days = other.memory.half_life_days;
        }
        if other.memory.learning_rate != memory_defaults.learning_rate {
            self.memory.learning_rate = other.memory.learning_rate;
        }
        if other.memory.score_window != memory_defaults.score_window {
            self.memory.score_window = other.memory.score_window;
        }
        if other.memory.evidence_limit != memory_defaults.evidence_limit {
            self.memory.evidence_limit = other.memory.evidence_limit;
        }

        let query_defaults = QuerySettings::default();
        if other.query.view_timeout_ms != query_defaults.view_timeout_ms {
            self.query.view_timeout_ms = other.query.view_timeout_ms;
        }
        if other.query.trend_threshold != query_defaults.trend_threshold {
            self.query.trend_threshold = other.query.trend_threshold;
        }
        if other.query.default_limit != query_defaults.default_limit {
            self.query.default_limit = other.query.default_limit;
        }
        if other.query.root_cause_top != query_defaults.root_cause_top {
            self.query.root_cause_top = other.query.root_cause_top;
        }
        if other.query.pattern_top != query_defaults.pattern_top {
            self.query.pattern_top = other.query.pattern_top;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert!(config.storage.database.is_none());
        assert_eq!(config.memory.staleness_window_days, 30);
        assert_eq!(config.query.view_timeout_ms, 5000);
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
            [storage]
            database = "/var/lib/ledger/audit.db"

            [memory]
            half_life_days = 7

            [query]
            view_timeout_ms = 250
        "#
        )
        .unwrap();

        let config = LedgerConfig::load_file(&config_path).unwrap();
        assert_eq!(
            config.storage.database.as_deref(),
            Some("/var/lib/ledger/audit.db")
        );
        assert_eq!(config.memory.half_life_days, 7);
        assert_eq!(config.memory.staleness_window_days, 30);
        assert_eq!(config.query.view_timeout_ms, 250);
    }

    #[test]
    fn test_project_layer_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join(".quality-ledger");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(
            project.join("config.toml"),
            "[query]\ntrend_threshold = 1.0\n",
        )
        .unwrap();

        let config = LedgerConfig::load(Some(dir.path()), None).unwrap();
        assert_eq!(config.query.trend_threshold, 1.0);
        assert_eq!(
            config.database_path(Some(dir.path())).unwrap(),
            project.join("ledger.db")
        );
    }

    #[test]
    fn test_config_merge() {
        let mut base = LedgerConfig::default();
        base.memory.half_life_days = 21;
        base.storage.database = Some("base.db".into());

        let mut other = LedgerConfig::default();
        other.memory.staleness_window_days = 10;
        other.storage.database = Some("other.db".into());

        base.merge(other);

        assert_eq!(base.memory.half_life_days, 21);
        assert_eq!(base.memory.staleness_window_days, 10);
        assert_eq!(base.storage.database.as_deref(), Some("other.db"));
    }

    #[test]
    fn test_reject_unknown_section() {
        let result: Result<LedgerConfig, _> = toml::from_str("[backends]\nx = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_memory_policy_fails_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[memory]\nlearning_rate = 2.0\n").unwrap();

        assert!(LedgerConfig::load(Some(dir.path()), Some(&path)).is_err());
    }
}
