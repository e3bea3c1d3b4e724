//! Per-repository sync cursors

use super::{time_from_text, time_to_text, with_write};
use crate::error::{LedgerError, Result};
use crate::model::short_sha;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which ingestion phase last moved the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Bootstrap,
    Sync,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Bootstrap => "bootstrap",
            SyncPhase::Sync => "sync",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncPhase {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bootstrap" => Ok(SyncPhase::Bootstrap),
            "sync" => Ok(SyncPhase::Sync),
            other => Err(LedgerError::invalid(format!("unknown sync phase '{}'", other))),
        }
    }
}

/// Last durably ingested commit for a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub repo: String,
    pub last_synced_sha: String,
    pub last_synced_timestamp: DateTime<Utc>,
    pub phase: SyncPhase,
}

pub struct CursorStore<'c> {
    conn: &'c Connection,
}

impl<'c> CursorStore<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, repo: &str) -> Result<Option<SyncCursor>> {
        let row = self
            .conn
            .query_row(
                "SELECT repo, last_synced_sha, last_synced_timestamp, phase
                 FROM sync_cursors WHERE repo = ?1",
                [repo],
                |row| {
                    let ts: String = row.get(2)?;
                    let phase: String = row.get(3)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        time_from_text(2, &ts)?,
                        phase,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((repo, sha, ts, phase)) => Ok(Some(SyncCursor {
                repo,
                last_synced_sha: sha,
                last_synced_timestamp: ts,
                phase: phase.parse()?,
            })),
            None => Ok(None),
        }
    }

    /// Create or move the cursor forward; moving it backwards is refused
    pub fn advance(
        &self,
        repo: &str,
        sha: &str,
        timestamp: DateTime<Utc>,
        phase: SyncPhase,
    ) -> Result<SyncCursor> {
        with_write(self.conn, |conn| {
            let current: Option<(String, i64)> = conn
                .query_row(
                    "SELECT last_synced_sha, last_synced_micros FROM sync_cursors WHERE repo = ?1",
                    [repo],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            if let Some((current_sha, current_micros)) = current {
                if timestamp.timestamp_micros() < current_micros {
                    return Err(LedgerError::CursorRegression {
                        repo: repo.to_string(),
                        current: short_sha(&current_sha).to_string(),
                        requested: short_sha(sha).to_string(),
                    });
                }
            }

            let now = time_to_text(Utc::now());
            conn.execute(
                "INSERT INTO sync_cursors
                    (repo, last_synced_sha, last_synced_timestamp, last_synced_micros, phase, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(repo) DO UPDATE SET
                    last_synced_sha = excluded.last_synced_sha,
                    last_synced_timestamp = excluded.last_synced_timestamp,
                    last_synced_micros = excluded.last_synced_micros,
                    phase = excluded.phase,
                    updated_at = excluded.updated_at",
                params![
                    repo,
                    sha,
                    time_to_text(timestamp),
                    timestamp.timestamp_micros(),
                    phase.as_str(),
                    now,
                ],
            )?;

            Ok(SyncCursor {
                repo: repo.to_string(),
                last_synced_sha: sha.to_string(),
                last_synced_timestamp: timestamp,
                phase,
            })
        })
    }

    /// Remove the cursor; returns whether one existed
    pub fn delete(&self, repo: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sync_cursors WHERE repo = ?1", [repo])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_cursor_lifecycle() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("ledger.db")).unwrap();
        let handle = db.connect().unwrap();
        let cursors = handle.cursors();

        assert!(cursors.get("acme/api").unwrap().is_none());

        let t1 = Utc.with_ymd_and_hms(2024, 11, 1, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 11, 2, 9, 0, 0).unwrap();

        cursors.advance("acme/api", "c1", t1, SyncPhase::Bootstrap).unwrap();
        cursors.advance("acme/api", "c2", t2, SyncPhase::Sync).unwrap();

        let cursor = cursors.get("acme/api").unwrap().unwrap();
        assert_eq!(cursor.last_synced_sha, "c2");
        assert_eq!(cursor.last_synced_timestamp, t2);
        assert_eq!(cursor.phase, SyncPhase::Sync);

        assert!(cursors.delete("acme/api").unwrap());
        assert!(!cursors.delete("acme/api").unwrap());
        assert!(cursors.get("acme/api").unwrap().is_none());
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("ledger.db")).unwrap();
        let handle = db.connect().unwrap();
        let cursors = handle.cursors();

        let later = Utc.with_ymd_and_hms(2024, 11, 5, 9, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 11, 1, 9, 0, 0).unwrap();
        cursors.advance("acme/api", "c5", later, SyncPhase::Sync).unwrap();

        let err = cursors
            .advance("acme/api", "c1", earlier, SyncPhase::Sync)
            .unwrap_err();
        assert!(matches!(err, LedgerError::CursorRegression { .. }));
        assert_eq!(cursors.get("acme/api").unwrap().unwrap().last_synced_sha, "c5");
    }
}
