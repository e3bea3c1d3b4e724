//! Commit audit records and dependency snapshots

use super::{json_from_text, time_from_text, time_to_text, with_write};
use crate::error::{LedgerError, Result};
use crate::model::{
    CommitAuditRecord, CommitFilter, DependencyGraphEntry, SortOrder, basename, short_sha,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::Serialize;

const COMMIT_COLUMNS: &str = "c.repo, c.commit_sha, c.author, c.author_email, c.timestamp, \
     c.message, c.files_changed, c.quality_score, c.issues, c.additions, c.deletions";

const SNAPSHOT_COLUMNS: &str =
    "repo, file_path, as_of_sha, as_of, imports, exports, external_deps";

/// What `put_*` did with the submitted row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PutOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct PutResult {
    pub outcome: PutOutcome,
    pub record: CommitAuditRecord,
}

/// Aggregate facts about one repository's stored history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryStats {
    pub repo: String,
    pub commit_count: usize,
    pub first_commit_at: DateTime<Utc>,
    pub last_commit_at: DateTime<Utc>,
    pub avg_quality_score: f64,
    pub total_issues: usize,
}

/// Keyed storage for commit audit records; sole writer of the commits tables
pub struct AuditStore<'c> {
    conn: &'c Connection,
}

impl<'c> AuditStore<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // ========== Commit Operations ==========

    /// Upsert a record by `(repo, commit_sha)`
    ///
    /// Identical input is a no-op. A record whose identity fields differ from
    /// the stored one is rejected with `Conflict`; otherwise the analytical
    /// fields are overwritten.
    pub fn put_commit(&self, record: &CommitAuditRecord) -> Result<PutResult> {
        record.validate()?;

        with_write(self.conn, |conn| {
            let existing = Self::load_commit(conn, &record.repo, &record.commit_sha)?;

            let outcome = match existing {
                Some(stored) => {
                    if let Some(field) = stored.identity_mismatch(record) {
                        return Err(LedgerError::Conflict {
                            sha: record.commit_sha.clone(),
                            field,
                        });
                    }
                    if stored == *record {
                        PutOutcome::Unchanged
                    } else {
                        Self::update_commit(conn, record)?;
                        PutOutcome::Updated
                    }
                }
                None => {
                    Self::insert_commit(conn, record)?;
                    PutOutcome::Inserted
                }
            };

            tracing::debug!(
                repo = %record.repo,
                sha = short_sha(&record.commit_sha),
                outcome = ?outcome,
                "Stored commit audit"
            );

            Ok(PutResult {
                outcome,
                record: record.clone(),
            })
        })
    }

    fn insert_commit(conn: &Connection, record: &CommitAuditRecord) -> Result<()> {
        let now = time_to_text(Utc::now());
        conn.execute(
            "INSERT INTO commits (repo, commit_sha, author, author_email, timestamp, ts_micros,
                message, files_changed, quality_score, issues, issue_count, additions, deletions,
                ingested_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                record.repo,
                record.commit_sha,
                record.author,
                record.author_email,
                time_to_text(record.timestamp),
                record.timestamp.timestamp_micros(),
                record.message,
                serde_json::to_string(&record.files_changed)?,
                record.quality_score,
                serde_json::to_string(&record.issues)?,
                record.issues.len() as i64,
                record.additions,
                record.deletions,
                now,
                now,
            ],
        )?;
        Self::write_files(conn, record)
    }

    fn update_commit(conn: &Connection, record: &CommitAuditRecord) -> Result<()> {
        conn.execute(
            "UPDATE commits SET files_changed = ?3, quality_score = ?4, issues = ?5,
                issue_count = ?6, additions = ?7, deletions = ?8, updated_at = ?9
             WHERE repo = ?1 AND commit_sha = ?2",
            params![
                record.repo,
                record.commit_sha,
                serde_json::to_string(&record.files_changed)?,
                record.quality_score,
                serde_json::to_string(&record.issues)?,
                record.issues.len() as i64,
                record.additions,
                record.deletions,
                time_to_text(Utc::now()),
            ],
        )?;
        conn.execute(
            "DELETE FROM commit_files WHERE repo = ?1 AND commit_sha = ?2",
            params![record.repo, record.commit_sha],
        )?;
        Self::write_files(conn, record)
    }

    fn write_files(conn: &Connection, record: &CommitAuditRecord) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO commit_files (repo, commit_sha, position, path, basename)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (position, path) in record.files_changed.iter().enumerate() {
            stmt.execute(params![
                record.repo,
                record.commit_sha,
                position as i64,
                path,
                basename(path),
            ])?;
        }
        Ok(())
    }

    fn load_commit(conn: &Connection, repo: &str, sha: &str) -> Result<Option<CommitAuditRecord>> {
        let sql = format!(
            "SELECT {} FROM commits c WHERE c.repo = ?1 AND c.commit_sha = ?2",
            COMMIT_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![repo, sha], row_to_commit)
            .optional()?)
    }

    /// Point lookup by full SHA or an unambiguous prefix (at least 4 characters)
    pub fn get_commit(&self, repo: &str, sha: &str) -> Result<CommitAuditRecord> {
        if let Some(record) = Self::load_commit(self.conn, repo, sha)? {
            return Ok(record);
        }

        if sha.len() >= 4 {
            let sql = format!(
                "SELECT {} FROM commits c
                 WHERE c.repo = ?1 AND substr(c.commit_sha, 1, length(?2)) = ?2 LIMIT 2",
                COMMIT_COLUMNS
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut matches = stmt
                .query_map(params![repo, sha], row_to_commit)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            match matches.len() {
                1 => return Ok(matches.remove(0)),
                0 => {}
                _ => {
                    return Err(LedgerError::invalid(format!(
                        "commit prefix '{}' is ambiguous in {}",
                        sha, repo
                    )));
                }
            }
        }

        Err(LedgerError::not_found(format!("commit {} in {}", sha, repo)))
    }

    /// Whether the exact commit is stored
    pub fn contains_commit(&self, repo: &str, sha: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM commits WHERE repo = ?1 AND commit_sha = ?2",
                params![repo, sha],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Stored author name for a name or email, matched case-insensitively
    ///
    /// Uses the name on the newest matching commit; `None` when nothing matches.
    pub fn resolve_author(&self, repo: &str, author: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT author FROM commits
                 WHERE repo = ?1 AND (author = ?2 COLLATE NOCASE OR author_email = ?2 COLLATE NOCASE)
                 ORDER BY ts_micros DESC, commit_sha DESC LIMIT 1",
                params![repo, author],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Filtered commits, newest first unless the filter asks otherwise
    pub fn get_commits(&self, repo: &str, filter: &CommitFilter) -> Result<Vec<CommitAuditRecord>> {
        filter.validate()?;

        let mut sql = format!("SELECT {} FROM commits c WHERE c.repo = ?", COMMIT_COLUMNS);
        let mut values: Vec<Value> = vec![Value::Text(repo.to_string())];

        if let Some(author) = &filter.author {
            sql.push_str(
                " AND (c.author = ? COLLATE NOCASE OR c.author_email = ? COLLATE NOCASE)",
            );
            values.push(Value::Text(author.clone()));
            values.push(Value::Text(author.clone()));
        }

        if let Some(from) = filter.date_range.from {
            sql.push_str(" AND c.ts_micros >= ?");
            values.push(Value::Integer(from.timestamp_micros()));
        }

        if let Some(to) = filter.date_range.to {
            sql.push_str(" AND c.ts_micros <= ?");
            values.push(Value::Integer(to.timestamp_micros()));
        }

        if let Some(min_issues) = filter.min_issues {
            sql.push_str(" AND c.issue_count >= ?");
            values.push(Value::Integer(i64::from(min_issues)));
        }

        if !filter.files.is_empty() {
            let placeholders = vec!["?"; filter.files.len()].join(", ");
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM commit_files f
                    WHERE f.repo = c.repo AND f.commit_sha = c.commit_sha
                    AND (f.path IN ({0}) OR f.basename IN ({0})))",
                placeholders
            ));
            for file in &filter.files {
                values.push(Value::Text(file.clone()));
            }
            for file in &filter.files {
                values.push(Value::Text(file.clone()));
            }
        }

        match filter.order {
            SortOrder::Descending => {
                sql.push_str(" ORDER BY c.ts_micros DESC, c.commit_sha DESC")
            }
            SortOrder::Ascending => sql.push_str(" ORDER BY c.ts_micros ASC, c.commit_sha ASC"),
        }

        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let commits = stmt
            .query_map(params_from_iter(values), row_to_commit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(commits)
    }

    pub fn count_commits(&self, repo: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM commits WHERE repo = ?1",
            [repo],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// All repositories with at least one stored commit
    pub fn list_repositories(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT repo FROM commits ORDER BY repo")?;
        let repos = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(repos)
    }

    pub fn repository_stats(&self, repo: &str) -> Result<RepositoryStats> {
        let row: Option<(i64, Option<i64>, Option<i64>, Option<f64>, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT COUNT(*), MIN(ts_micros), MAX(ts_micros), AVG(quality_score), SUM(issue_count)
                 FROM commits WHERE repo = ?1",
                [repo],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        match row {
            Some((count, Some(first), Some(last), Some(avg), total)) if count > 0 => {
                Ok(RepositoryStats {
                    repo: repo.to_string(),
                    commit_count: count as usize,
                    first_commit_at: micros_to_time(first)?,
                    last_commit_at: micros_to_time(last)?,
                    avg_quality_score: (avg * 100.0).round() / 100.0,
                    total_issues: total.unwrap_or(0) as usize,
                })
            }
            _ => Err(LedgerError::not_found(format!("repository {}", repo))),
        }
    }

    // ========== Dependency Snapshot Operations ==========

    /// Store a snapshot keyed by `(repo, file_path, as_of_sha)`; older
    /// snapshots stay available for as-of queries
    pub fn put_dependency_snapshot(&self, entry: &DependencyGraphEntry) -> Result<PutOutcome> {
        if entry.file_path.trim().is_empty() {
            return Err(LedgerError::invalid("dependency snapshot needs a file_path"));
        }

        with_write(self.conn, |conn| {
            let sql = format!(
                "SELECT {} FROM dependency_snapshots
                 WHERE repo = ?1 AND file_path = ?2 AND as_of_sha = ?3",
                SNAPSHOT_COLUMNS
            );
            let existing = conn
                .query_row(
                    &sql,
                    params![entry.repo, entry.file_path, entry.as_of_sha],
                    row_to_snapshot,
                )
                .optional()?;

            if existing.as_ref() == Some(entry) {
                return Ok(PutOutcome::Unchanged);
            }

            conn.execute(
                "INSERT INTO dependency_snapshots
                    (repo, file_path, as_of_sha, as_of, as_of_micros, imports, exports, external_deps, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(repo, file_path, as_of_sha) DO UPDATE SET
                    as_of = excluded.as_of,
                    as_of_micros = excluded.as_of_micros,
                    imports = excluded.imports,
                    exports = excluded.exports,
                    external_deps = excluded.external_deps,
                    recorded_at = excluded.recorded_at",
                params![
                    entry.repo,
                    entry.file_path,
                    entry.as_of_sha,
                    time_to_text(entry.as_of),
                    entry.as_of.timestamp_micros(),
                    serde_json::to_string(&entry.imports)?,
                    serde_json::to_string(&entry.exports)?,
                    serde_json::to_string(&entry.external_deps)?,
                    time_to_text(Utc::now()),
                ],
            )?;

            Ok(if existing.is_some() {
                PutOutcome::Updated
            } else {
                PutOutcome::Inserted
            })
        })
    }

    /// Latest snapshot for a file
    pub fn get_dependency_snapshot(&self, repo: &str, file_path: &str) -> Result<DependencyGraphEntry> {
        self.snapshot_before(repo, file_path, i64::MAX)?
            .ok_or_else(|| LedgerError::not_found(format!("dependencies of {} in {}", file_path, repo)))
    }

    /// Latest snapshot taken at or before `at`
    pub fn get_dependency_snapshot_as_of(
        &self,
        repo: &str,
        file_path: &str,
        at: DateTime<Utc>,
    ) -> Result<DependencyGraphEntry> {
        self.snapshot_before(repo, file_path, at.timestamp_micros())?
            .ok_or_else(|| {
                LedgerError::not_found(format!(
                    "dependencies of {} in {} as of {}",
                    file_path,
                    repo,
                    at.to_rfc3339()
                ))
            })
    }

    /// Every retained snapshot for a file, newest first
    pub fn dependency_history(&self, repo: &str, file_path: &str) -> Result<Vec<DependencyGraphEntry>> {
        let sql = format!(
            "SELECT {} FROM dependency_snapshots
             WHERE repo = ?1 AND file_path = ?2
             ORDER BY as_of_micros DESC, rowid DESC",
            SNAPSHOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let history = stmt
            .query_map(params![repo, file_path], row_to_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(history)
    }

    fn snapshot_before(
        &self,
        repo: &str,
        file_path: &str,
        micros: i64,
    ) -> Result<Option<DependencyGraphEntry>> {
        let sql = format!(
            "SELECT {} FROM dependency_snapshots
             WHERE repo = ?1 AND file_path = ?2 AND as_of_micros <= ?3
             ORDER BY as_of_micros DESC, rowid DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![repo, file_path, micros], row_to_snapshot)
            .optional()?)
    }
}

fn micros_to_time(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| LedgerError::invalid(format!("stored timestamp {} out of range", micros)))
}

fn row_to_commit(row: &rusqlite::Row) -> rusqlite::Result<CommitAuditRecord> {
    let timestamp: String = row.get(4)?;
    let files: String = row.get(6)?;
    let issues: String = row.get(8)?;

    Ok(CommitAuditRecord {
        repo: row.get(0)?,
        commit_sha: row.get(1)?,
        author: row.get(2)?,
        author_email: row.get(3)?,
        timestamp: time_from_text(4, &timestamp)?,
        message: row.get(5)?,
        files_changed: json_from_text(6, &files)?,
        quality_score: row.get(7)?,
        issues: json_from_text(8, &issues)?,
        additions: row.get(9)?,
        deletions: row.get(10)?,
    })
}

fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<DependencyGraphEntry> {
    let as_of: String = row.get(3)?;
    let imports: String = row.get(4)?;
    let exports: String = row.get(5)?;
    let external: String = row.get(6)?;

    Ok(DependencyGraphEntry {
        repo: row.get(0)?,
        file_path: row.get(1)?,
        as_of_sha: row.get(2)?,
        as_of: time_from_text(3, &as_of)?,
        imports: json_from_text(4, &imports)?,
        exports: json_from_text(5, &exports)?,
        external_deps: json_from_text(6, &external)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, Issue, IssueKind, Severity};
    use crate::store::Database;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("ledger.db")).unwrap();
        (dir, db)
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, day, 9, 0, 0).unwrap()
    }

    fn commit(sha: &str, author: &str, day: u32, files: &[&str]) -> CommitAuditRecord {
        CommitAuditRecord {
            repo: "acme/api".into(),
            commit_sha: sha.into(),
            author: author.into(),
            author_email: format!("{}@example.com", author.to_lowercase().replace(' ', ".")),
            timestamp: at(day),
            message: format!("change {}", sha),
            files_changed: files.iter().map(|f| f.to_string()).collect(),
            quality_score: 80.0,
            issues: Vec::new(),
            additions: 5,
            deletions: 1,
        }
    }

    fn issue(file: &str) -> Issue {
        Issue {
            kind: IssueKind::Security,
            severity: Severity::High,
            file: file.into(),
            line: 3,
            rule: "B105".into(),
            message: "hardcoded password".into(),
        }
    }

    #[test]
    fn test_put_commit_is_idempotent() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let store = handle.audit();
        let record = commit("aaa111", "Alice", 1, &["app/main.py"]);

        assert_eq!(store.put_commit(&record).unwrap().outcome, PutOutcome::Inserted);
        assert_eq!(store.put_commit(&record).unwrap().outcome, PutOutcome::Unchanged);
        assert_eq!(store.count_commits("acme/api").unwrap(), 1);
    }

    #[test]
    fn test_put_commit_overwrites_analytical_fields() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let store = handle.audit();
        let mut record = commit("aaa111", "Alice", 1, &["app/main.py"]);
        store.put_commit(&record).unwrap();

        record.quality_score = 55.0;
        record.issues = vec![issue("app/main.py")];
        record.files_changed.push("app/auth.py".into());

        assert_eq!(store.put_commit(&record).unwrap().outcome, PutOutcome::Updated);

        let stored = store.get_commit("acme/api", "aaa111").unwrap();
        assert_eq!(stored, record);
        assert_eq!(
            store
                .get_commits("acme/api", &CommitFilter::default().with_files(["auth.py"]))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_put_commit_rejects_identity_change() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let store = handle.audit();
        let record = commit("aaa111", "Alice", 1, &["app/main.py"]);
        store.put_commit(&record).unwrap();

        let mut divergent = record.clone();
        divergent.message = "rewritten history".into();

        let err = store.put_commit(&divergent).unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { field: "message", .. }));
        assert_eq!(store.get_commit("acme/api", "aaa111").unwrap(), record);
    }

    #[test]
    fn test_file_filter_matches_path_or_basename_only() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let store = handle.audit();
        store.put_commit(&commit("c1", "Alice", 1, &["app/main.py"])).unwrap();
        store.put_commit(&commit("c2", "Alice", 2, &["app/domain.py"])).unwrap();
        store.put_commit(&commit("c3", "Bob", 3, &["main.py", "README.md"])).unwrap();
        store.put_commit(&commit("c4", "Bob", 4, &["lib/main.pyc"])).unwrap();

        let by_name = store
            .get_commits("acme/api", &CommitFilter::default().with_files(["main.py"]))
            .unwrap();
        let shas: Vec<_> = by_name.iter().map(|c| c.commit_sha.as_str()).collect();
        assert_eq!(shas, vec!["c3", "c1"]);

        let by_path = store
            .get_commits("acme/api", &CommitFilter::default().with_files(["app/main.py"]))
            .unwrap();
        assert_eq!(by_path.len(), 1);
        assert_eq!(by_path[0].commit_sha, "c1");
    }

    #[test]
    fn test_filters_combine() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let store = handle.audit();
        for day in 1..=5 {
            let author = if day % 2 == 0 { "Bob" } else { "Alice" };
            let mut record = commit(&format!("c{}", day), author, day, &["app/main.py"]);
            if day >= 3 {
                record.issues = vec![issue("app/main.py")];
            }
            store.put_commit(&record).unwrap();
        }

        let filter = CommitFilter::default()
            .with_author("alice")
            .with_date_range(DateRange::new(Some(at(2)), Some(at(5))).unwrap());
        let shas: Vec<_> = store
            .get_commits("acme/api", &filter)
            .unwrap()
            .into_iter()
            .map(|c| c.commit_sha)
            .collect();
        assert_eq!(shas, vec!["c5", "c3"]);

        let filter = CommitFilter {
            min_issues: Some(1),
            order: SortOrder::Ascending,
            limit: Some(2),
            ..Default::default()
        };
        let shas: Vec<_> = store
            .get_commits("acme/api", &filter)
            .unwrap()
            .into_iter()
            .map(|c| c.commit_sha)
            .collect();
        assert_eq!(shas, vec!["c3", "c4"]);
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let commits = handle
            .audit()
            .get_commits("acme/unknown", &CommitFilter::default().with_author("nobody"))
            .unwrap();
        assert!(commits.is_empty());
    }

    #[test]
    fn test_get_commit_by_prefix() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let store = handle.audit();
        store.put_commit(&commit("abcdef123456", "Alice", 1, &["a.py"])).unwrap();
        store.put_commit(&commit("abcd99999999", "Alice", 2, &["b.py"])).unwrap();

        assert_eq!(
            store.get_commit("acme/api", "abcdef1").unwrap().commit_sha,
            "abcdef123456"
        );
        assert!(matches!(
            store.get_commit("acme/api", "abcd"),
            Err(LedgerError::InvalidArgument { .. })
        ));
        assert!(matches!(
            store.get_commit("acme/api", "ffff"),
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn test_prefix_wildcards_are_literal() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let store = handle.audit();
        store.put_commit(&commit("abcdef123456", "Alice", 1, &["a.py"])).unwrap();

        for pattern in ["abc_", "abc%", "%%%%", "____"] {
            assert!(matches!(
                store.get_commit("acme/api", pattern),
                Err(LedgerError::NotFound { .. })
            ));
        }
        assert!(store.contains_commit("acme/api", "abcdef123456").unwrap());
        assert!(!store.contains_commit("acme/api", "abcdef").unwrap());
    }

    #[test]
    fn test_resolve_author_by_name_or_email() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let store = handle.audit();
        store.put_commit(&commit("c1", "Alice", 1, &["a.py"])).unwrap();

        let email = store.get_commit("acme/api", "c1").unwrap().author_email;
        assert_eq!(store.resolve_author("acme/api", "alice").unwrap().as_deref(), Some("Alice"));
        assert_eq!(
            store.resolve_author("acme/api", &email.to_uppercase()).unwrap().as_deref(),
            Some("Alice")
        );
        assert_eq!(store.resolve_author("acme/api", "mallory").unwrap(), None);
    }

    #[test]
    fn test_repository_stats() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let store = handle.audit();
        assert!(store.repository_stats("acme/api").is_err());

        let mut low = commit("c1", "Alice", 1, &["a.py"]);
        low.quality_score = 60.0;
        low.issues = vec![issue("a.py"), issue("a.py")];
        store.put_commit(&low).unwrap();
        store.put_commit(&commit("c2", "Alice", 3, &["a.py"])).unwrap();

        let stats = store.repository_stats("acme/api").unwrap();
        assert_eq!(stats.commit_count, 2);
        assert_eq!(stats.first_commit_at, at(1));
        assert_eq!(stats.last_commit_at, at(3));
        assert_eq!(stats.avg_quality_score, 70.0);
        assert_eq!(stats.total_issues, 2);
        assert_eq!(store.list_repositories().unwrap(), vec!["acme/api"]);
    }

    #[test]
    fn test_dependency_snapshots_keep_history() {
        let (_dir, db) = db();
        let handle = db.connect().unwrap();
        let store = handle.audit();

        let v1 = DependencyGraphEntry {
            repo: "acme/api".into(),
            file_path: "app/main.py".into(),
            as_of_sha: "c1".into(),
            as_of: at(1),
            imports: ["os".to_string()].into_iter().collect(),
            exports: vec!["main".into()],
            external_deps: Default::default(),
        };
        let mut v2 = v1.clone();
        v2.as_of_sha = "c2".into();
        v2.as_of = at(4);
        v2.imports.insert("logging".into());
        v2.external_deps.insert("flask".into());

        assert_eq!(store.put_dependency_snapshot(&v1).unwrap(), PutOutcome::Inserted);
        assert_eq!(store.put_dependency_snapshot(&v2).unwrap(), PutOutcome::Inserted);
        assert_eq!(store.put_dependency_snapshot(&v2).unwrap(), PutOutcome::Unchanged);

        assert_eq!(store.get_dependency_snapshot("acme/api", "app/main.py").unwrap(), v2);
        assert_eq!(
            store
                .get_dependency_snapshot_as_of("acme/api", "app/main.py", at(2))
                .unwrap(),
            v1
        );
        assert_eq!(store.dependency_history("acme/api", "app/main.py").unwrap(), vec![v2, v1]);
        assert!(matches!(
            store.get_dependency_snapshot("acme/api", "app/other.py"),
            Err(LedgerError::NotFound { .. })
        ));
    }
}
