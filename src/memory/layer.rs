//! Memory layer: observe, merge and look up retained patterns

use super::record::{
    AuthorPreferenceMemory, MemoryRecord, ReviewPatternMemory, Standard, TeamStandardMemory,
    pattern_fingerprint,
};
use super::{MemoryType, SCOPE_SEPARATOR, StorageKey, scope_matches};
use crate::config::MemoryPolicy;
use crate::error::{LedgerError, Result};
use crate::model::{CommitAuditRecord, Issue, IssueKind, short_sha};
use crate::store::{json_from_text, time_to_text, with_write};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::collections::BTreeMap;

/// A stored record together with its address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryEntry {
    pub key: StorageKey,
    pub last_commit_sha: String,
    pub record: MemoryRecord,
}

/// Counts over a scope
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryStats {
    pub records_by_type: BTreeMap<MemoryType, usize>,
    pub total_records: usize,
    pub pattern_occurrences: u64,
    pub observed_commits: usize,
}

/// Sole writer of memory records
pub struct MemoryLayer<'a> {
    conn: &'a Connection,
    policy: &'a MemoryPolicy,
}

impl<'a> MemoryLayer<'a> {
    pub(crate) fn new(conn: &'a Connection, policy: &'a MemoryPolicy) -> Self {
        Self { conn, policy }
    }

    /// Fold a newly stored commit into the records it touches
    ///
    /// Replaying a commit that was already folded changes nothing and
    /// returns no keys. All merges for one commit commit together.
    pub fn observe(&self, repo: &str, record: &CommitAuditRecord) -> Result<Vec<StorageKey>> {
        if record.repo != repo {
            return Err(LedgerError::invalid(format!(
                "commit {} belongs to {}, not {}",
                record.short_sha(),
                record.repo,
                repo
            )));
        }

        let policy = self.policy;
        with_write(self.conn, |conn| {
            let fresh = conn.execute(
                "INSERT OR IGNORE INTO memory_observations (repo, commit_sha, observed_at)
                 VALUES (?1, ?2, ?3)",
                params![repo, record.commit_sha, time_to_text(Utc::now())],
            )?;
            if fresh == 0 {
                tracing::debug!(
                    repo,
                    sha = record.short_sha(),
                    "Commit already folded into memory, skipping"
                );
                return Ok(Vec::new());
            }

            let mut keys = Vec::new();
            keys.extend(Self::fold_patterns(conn, repo, record, policy)?);
            keys.extend(Self::fold_standards(conn, repo, record, policy)?);
            keys.push(Self::fold_author(conn, repo, record, policy)?);

            tracing::debug!(
                repo,
                sha = record.short_sha(),
                updated = keys.len(),
                "Observed commit"
            );
            Ok(keys)
        })
    }

    fn fold_patterns(
        conn: &Connection,
        repo: &str,
        record: &CommitAuditRecord,
        policy: &MemoryPolicy,
    ) -> Result<Vec<StorageKey>> {
        let mut groups: BTreeMap<(IssueKind, String), Vec<&Issue>> = BTreeMap::new();
        for issue in &record.issues {
            groups
                .entry((issue.kind, issue.rule.trim().to_string()))
                .or_default()
                .push(issue);
        }

        let at = record.timestamp;
        let sha = record.commit_sha.as_str();
        let scopes = [
            repo.to_string(),
            StorageKey::author_scope(repo, &record.author),
        ];

        let mut keys = Vec::new();
        for ((kind, rule), issues) in &groups {
            let fingerprint = pattern_fingerprint(*kind, rule);
            for scope in &scopes {
                let key = StorageKey::new(MemoryType::ReviewPattern, scope.clone(), fingerprint.clone());
                let pattern = match load(conn, &key)? {
                    Some(MemoryRecord::ReviewPattern(mut existing)) => {
                        existing.reinforce(issues, sha, at, policy);
                        existing
                    }
                    _ => match ReviewPatternMemory::first(issues, sha, at, policy) {
                        Some(pattern) => pattern,
                        None => continue,
                    },
                };
                save(conn, &key, &MemoryRecord::ReviewPattern(pattern), sha)?;
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn fold_standards(
        conn: &Connection,
        repo: &str,
        record: &CommitAuditRecord,
        policy: &MemoryPolicy,
    ) -> Result<Vec<StorageKey>> {
        let mut keys = Vec::new();
        for standard in Standard::all() {
            let key = StorageKey::new(MemoryType::TeamStandard, repo, standard.identifier());
            let mut memory = match load(conn, &key)? {
                Some(MemoryRecord::TeamStandard(existing)) => existing,
                _ => TeamStandardMemory::empty(standard, record.timestamp),
            };
            memory.observe(
                standard.holds_for(record),
                &record.commit_sha,
                record.timestamp,
                policy,
            );
            save(conn, &key, &MemoryRecord::TeamStandard(memory), &record.commit_sha)?;
            keys.push(key);
        }
        Ok(keys)
    }

    fn fold_author(
        conn: &Connection,
        repo: &str,
        record: &CommitAuditRecord,
        policy: &MemoryPolicy,
    ) -> Result<StorageKey> {
        let identifier = if record.author_email.trim().is_empty() {
            record.author.to_lowercase()
        } else {
            record.author_email.to_lowercase()
        };
        let key = StorageKey::new(
            MemoryType::AuthorPreference,
            StorageKey::author_scope(repo, &record.author),
            identifier,
        );

        let mut memory = match load(conn, &key)? {
            Some(MemoryRecord::AuthorPreference(existing)) => existing,
            _ => AuthorPreferenceMemory::empty(record),
        };
        memory.observe(record, policy);
        save(conn, &key, &MemoryRecord::AuthorPreference(memory), &record.commit_sha)?;
        Ok(key)
    }

    /// Point lookup with confidence evaluated now
    pub fn lookup(&self, key: &StorageKey) -> Result<Option<MemoryRecord>> {
        self.lookup_at(key, Utc::now())
    }

    pub fn lookup_at(&self, key: &StorageKey, at: DateTime<Utc>) -> Result<Option<MemoryRecord>> {
        Ok(load(self.conn, key)?.map(|record| record.decayed(at, self.policy)))
    }

    /// Every record of a type whose scope equals or sits under `scope_prefix`
    pub fn lookup_prefix(
        &self,
        memory_type: MemoryType,
        scope_prefix: &str,
    ) -> Result<Vec<MemoryEntry>> {
        self.lookup_prefix_at(memory_type, scope_prefix, Utc::now())
    }

    pub fn lookup_prefix_at(
        &self,
        memory_type: MemoryType,
        scope_prefix: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<MemoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT scope, identifier, payload, last_commit_sha FROM memory_records
             WHERE memory_type = ?1
               AND substr(scope, 1, length(?2)) = ?2
             ORDER BY scope, identifier",
        )?;

        let rows = stmt.query_map(params![memory_type.as_str(), scope_prefix], |row| {
            let payload: String = row.get(2)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                json_from_text::<MemoryRecord>(2, &payload)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (scope, identifier, record, last_commit_sha) = row?;
            if !scope_matches(&scope, scope_prefix) {
                continue;
            }
            entries.push(MemoryEntry {
                key: StorageKey::new(memory_type, scope, identifier),
                last_commit_sha,
                record: record.decayed(at, self.policy),
            });
        }
        Ok(entries)
    }

    pub fn stats(&self, scope_prefix: &str) -> Result<MemoryStats> {
        let mut stats = MemoryStats::default();

        for memory_type in MemoryType::ALL {
            let entries = self.lookup_prefix(memory_type, scope_prefix)?;
            if memory_type == MemoryType::ReviewPattern {
                stats.pattern_occurrences = entries
                    .iter()
                    .filter_map(|e| e.record.as_review_pattern())
                    .map(|p| p.occurrence_count)
                    .sum();
            }
            stats.total_records += entries.len();
            stats.records_by_type.insert(memory_type, entries.len());
        }

        let repo = scope_prefix
            .split(SCOPE_SEPARATOR)
            .next()
            .unwrap_or_default();
        let observed: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM memory_observations WHERE ?1 = '' OR repo = ?1",
            [repo],
            |row| row.get(0),
        )?;
        stats.observed_commits = observed as usize;

        Ok(stats)
    }

}

fn load(conn: &Connection, key: &StorageKey) -> Result<Option<MemoryRecord>> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM memory_records
             WHERE memory_type = ?1 AND scope = ?2 AND identifier = ?3",
            params![key.memory_type.as_str(), key.scope, key.identifier],
            |row| row.get(0),
        )
        .optional()?;

    match payload {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn save(conn: &Connection, key: &StorageKey, record: &MemoryRecord, sha: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO memory_records (memory_type, scope, identifier, payload, last_commit_sha, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(memory_type, scope, identifier) DO UPDATE SET
            payload = excluded.payload,
            last_commit_sha = excluded.last_commit_sha,
            updated_at = excluded.updated_at",
        params![
            key.memory_type.as_str(),
            key.scope,
            key.identifier,
            serde_json::to_string(record)?,
            sha,
            time_to_text(Utc::now()),
        ],
    )?;
    tracing::trace!(key = %key, sha = short_sha(sha), "Merged memory record");
    Ok(())
}
