//! Pattern view: highest-confidence recurring review findings

use super::engine::QueryEngine;
use super::{QueryParams, QueryStatus};
use crate::error::Result;
use crate::memory::{MemoryType, ReviewPatternMemory, StorageKey};
use chrono::Utc;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternEntry {
    pub key: StorageKey,
    /// Confidence after decay at query time
    pub effective_confidence: f64,
    pub pattern: ReviewPatternMemory,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternsResult {
    pub status: QueryStatus,
    pub scope: String,
    pub patterns: Vec<PatternEntry>,
    /// Commits cited by the returned patterns, strongest pattern first
    pub evidence: Vec<String>,
}

impl<'a> QueryEngine<'a> {
    /// Patterns for the repository, or for one author when `params.author` is set
    pub fn patterns(&self, params: &QueryParams) -> Result<PatternsResult> {
        params.validate()?;
        self.cancel.check()?;

        let scope = match &params.author {
            Some(author) => {
                // Match commits: case-insensitive name or email, stored name wins
                let name = self
                    .handle
                    .audit()
                    .resolve_author(&params.repo, author)?
                    .unwrap_or_else(|| author.clone());
                StorageKey::author_scope(&params.repo, &name)
            }
            None => params.repo.clone(),
        };

        let now = Utc::now();
        let memory = self.handle.memory(self.policy);
        let mut patterns: Vec<PatternEntry> = memory
            .lookup_prefix_at(MemoryType::ReviewPattern, &scope, now)?
            .into_iter()
            .filter(|entry| entry.key.scope == scope)
            .filter_map(|entry| {
                let pattern = entry.record.as_review_pattern()?.clone();
                Some(PatternEntry {
                    key: entry.key,
                    effective_confidence: pattern.confidence,
                    pattern,
                })
            })
            .filter(|entry| params.kind.is_none_or(|kind| entry.pattern.kind == kind))
            .collect();
        self.cancel.check()?;

        patterns.sort_by(|a, b| {
            b.effective_confidence
                .partial_cmp(&a.effective_confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.pattern.occurrence_count.cmp(&a.pattern.occurrence_count))
                .then_with(|| a.pattern.fingerprint.cmp(&b.pattern.fingerprint))
        });
        patterns.truncate(self.limit(params, self.settings.pattern_top));

        let mut evidence: Vec<String> = Vec::new();
        for entry in &patterns {
            for sha in &entry.pattern.evidence_commit_shas {
                if !evidence.contains(sha) {
                    evidence.push(sha.clone());
                }
            }
        }

        tracing::debug!(scope = %scope, patterns = patterns.len(), "Collected patterns");

        Ok(PatternsResult {
            status: if patterns.is_empty() {
                QueryStatus::Empty
            } else {
                QueryStatus::Success
            },
            scope,
            patterns,
            evidence,
        })
    }
}
