//! Long-lived patterns derived from stored audit records
//!
//! Records are addressed by [`StorageKey`] rather than by commit SHA and are
//! merged in place: a second observation of the same pattern updates the
//! existing record. Confidence decays lazily when read.

pub mod confidence;
mod layer;
mod record;

pub use layer::{MemoryEntry, MemoryLayer, MemoryStats};
pub use record::{
    AuthorPreferenceMemory, MemoryRecord, ReviewPatternMemory, Standard, TeamStandardMemory,
    is_conventional_commit, pattern_fingerprint,
};

use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between repository and author in a scope
pub const SCOPE_SEPARATOR: &str = "::";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    ReviewPattern,
    TeamStandard,
    AuthorPreference,
}

impl MemoryType {
    pub const ALL: [MemoryType; 3] = [
        MemoryType::ReviewPattern,
        MemoryType::TeamStandard,
        MemoryType::AuthorPreference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::ReviewPattern => "review_pattern",
            MemoryType::TeamStandard => "team_standard",
            MemoryType::AuthorPreference => "author_preference",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "review_pattern" | "pattern" | "patterns" => Ok(MemoryType::ReviewPattern),
            "team_standard" | "standard" | "standards" => Ok(MemoryType::TeamStandard),
            "author_preference" | "author" | "authors" => Ok(MemoryType::AuthorPreference),
            other => Err(LedgerError::invalid(format!("unknown memory type '{}'", other))),
        }
    }
}

/// Composite address of one memory record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageKey {
    pub memory_type: MemoryType,
    pub scope: String,
    pub identifier: String,
}

impl StorageKey {
    pub fn new(
        memory_type: MemoryType,
        scope: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            memory_type,
            scope: scope.into(),
            identifier: identifier.into(),
        }
    }

    /// Scope of everything known about one author inside a repository
    pub fn author_scope(repo: &str, author: &str) -> String {
        format!("{}{}{}", repo, SCOPE_SEPARATOR, author)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.memory_type, self.scope, self.identifier)
    }
}

/// True if `scope` equals `prefix` or sits underneath it
pub fn scope_matches(scope: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || scope == prefix
        || scope
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(SCOPE_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_matching() {
        assert!(scope_matches("acme/api", "acme/api"));
        assert!(scope_matches("acme/api::Alice", "acme/api"));
        assert!(scope_matches("acme/api", ""));
        assert!(!scope_matches("acme/api-v2", "acme/api"));
        assert!(!scope_matches("acme/api", "acme/api::Alice"));
    }

    #[test]
    fn test_memory_type_parse() {
        assert_eq!("review-pattern".parse::<MemoryType>().unwrap(), MemoryType::ReviewPattern);
        assert_eq!("authors".parse::<MemoryType>().unwrap(), MemoryType::AuthorPreference);
        assert!("facts".parse::<MemoryType>().is_err());
    }
}
