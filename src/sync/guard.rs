//! Single-writer guard for per-repository ingestion
//!
//! Claims live in the `sync_locks` table so that separate processes sharing a
//! ledger exclude each other, not just tasks inside one controller. A claim is
//! refreshed as commits are stored; one left behind by a crashed process is
//! taken over once it has gone untouched for [`STALE_AFTER`].

use crate::error::{LedgerError, Result};
use crate::store::{Database, StoreHandle};
use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Claims untouched for this long are considered abandoned
pub const STALE_AFTER: Duration = Duration::from_secs(15 * 60);

static NEXT_CLAIM: AtomicU64 = AtomicU64::new(1);

/// Claim `repo`, failing fast if a live claim is held elsewhere
pub fn acquire(db: &Database, repo: &str) -> Result<RepoGuard> {
    let holder = format!(
        "{}:{}",
        std::process::id(),
        NEXT_CLAIM.fetch_add(1, Ordering::Relaxed)
    );
    let handle = db.connect()?;
    let now = Utc::now().timestamp_micros();
    let stale_before = now - STALE_AFTER.as_micros() as i64;

    let tx = handle.begin_immediate()?;
    let existing: Option<(String, i64)> = tx
        .query_row(
            "SELECT holder, refreshed_micros FROM sync_locks WHERE repo = ?1",
            [repo],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((other, refreshed)) = existing {
        if refreshed >= stale_before {
            return Err(LedgerError::SyncInProgress {
                repo: repo.to_string(),
            });
        }
        tracing::warn!(repo, holder = %other, "Taking over abandoned sync claim");
    }

    tx.execute(
        "INSERT INTO sync_locks (repo, holder, acquired_micros, refreshed_micros)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(repo) DO UPDATE SET
            holder = excluded.holder,
            acquired_micros = excluded.acquired_micros,
            refreshed_micros = excluded.refreshed_micros",
        params![repo, holder, now],
    )?;
    tx.commit()?;

    tracing::debug!(repo, holder = %holder, "Claimed repository");
    Ok(RepoGuard {
        db: db.clone(),
        repo: repo.to_string(),
        holder,
    })
}

/// Whether a live claim is currently held on `repo`
pub fn is_claimed(handle: &StoreHandle, repo: &str) -> Result<bool> {
    let stale_before = Utc::now().timestamp_micros() - STALE_AFTER.as_micros() as i64;
    let found: Option<i64> = handle
        .connection()
        .query_row(
            "SELECT 1 FROM sync_locks WHERE repo = ?1 AND refreshed_micros >= ?2",
            params![repo, stale_before],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Releases the repository claim when dropped
#[derive(Debug)]
pub struct RepoGuard {
    db: Database,
    repo: String,
    holder: String,
}

impl RepoGuard {
    /// Mark the claim as still alive; runs inside the caller's transaction
    pub(crate) fn refresh(&self, handle: &StoreHandle) -> Result<()> {
        handle.connection().execute(
            "UPDATE sync_locks SET refreshed_micros = ?3 WHERE repo = ?1 AND holder = ?2",
            params![self.repo, self.holder, Utc::now().timestamp_micros()],
        )?;
        Ok(())
    }

    fn release(&self) -> Result<()> {
        self.db.connect()?.connection().execute(
            "DELETE FROM sync_locks WHERE repo = ?1 AND holder = ?2",
            params![self.repo, self.holder],
        )?;
        Ok(())
    }
}

impl Drop for RepoGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(repo = %self.repo, error = %e, "Failed to release sync claim");
        }
    }
}
