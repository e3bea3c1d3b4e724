//! Bootstrap / sync state machine over the audit store

use super::guard::{self, RepoGuard};
use crate::config::MemoryPolicy;
use crate::error::{LedgerError, Result};
use crate::model::{CommitAuditRecord, DependencyGraphEntry, short_sha};
use crate::scoring;
use crate::source::{Analysis, CommitRef, CommitSource, FindingsProducer, SourceCommit, SourceSession};
use crate::store::{Database, PutOutcome, StoreHandle, SyncCursor, SyncPhase};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a successful bootstrap
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub repo: String,
    /// Commits durably stored (new or already present)
    pub stored: usize,
    /// Of those, commits that were not in the store before
    pub inserted: usize,
    pub last_sha: Option<String>,
    #[serde(skip)]
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    UpToDate,
    Synced,
}

/// Result of a successful sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub repo: String,
    pub status: SyncStatus,
    pub added: usize,
    pub last_sha: Option<String>,
    #[serde(skip)]
    pub duration: Duration,
}

/// Outcome of storing one batch
struct BatchOutcome {
    stored: usize,
    inserted: usize,
    last_sha: Option<String>,
}

/// Drives ingestion for any number of repositories, one writer per repository
pub struct SyncController {
    db: Database,
    source: Arc<dyn CommitSource>,
    findings: Arc<dyn FindingsProducer>,
    policy: MemoryPolicy,
}

impl SyncController {
    pub fn new(
        db: Database,
        source: Arc<dyn CommitSource>,
        findings: Arc<dyn FindingsProducer>,
        policy: MemoryPolicy,
    ) -> Self {
        Self {
            db,
            source,
            findings,
            policy,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Current cursor, if the repository was bootstrapped
    pub fn cursor(&self, repo: &str) -> Result<Option<SyncCursor>> {
        self.db.connect()?.cursors().get(repo)
    }

    /// Store the first `count` commits of a repository, oldest first
    pub async fn bootstrap(&self, repo: &str, count: usize) -> Result<BootstrapReport> {
        validate_repo(repo)?;
        if count == 0 {
            return Err(LedgerError::invalid("bootstrap count must be a positive integer"));
        }

        let guard = guard::acquire(&self.db, repo)?;
        let start = Instant::now();

        if self.cursor(repo)?.is_some() {
            return Err(LedgerError::AlreadyBootstrapped {
                repo: repo.to_string(),
            });
        }

        tracing::info!(repo, count, "Starting bootstrap");

        let mut session = self.source.open(repo).await?;
        let mut refs = session.list_commits(None, Some(count)).await?;
        sort_chronologically(&mut refs);
        refs.truncate(count);

        let outcome = self
            .ingest(repo, session.as_mut(), &refs, SyncPhase::Bootstrap, &guard)
            .await?;

        tracing::info!(
            repo,
            stored = outcome.stored,
            inserted = outcome.inserted,
            last_sha = outcome.last_sha.as_deref().map(short_sha).unwrap_or("-"),
            "Bootstrap complete"
        );

        Ok(BootstrapReport {
            repo: repo.to_string(),
            stored: outcome.stored,
            inserted: outcome.inserted,
            last_sha: outcome.last_sha,
            duration: start.elapsed(),
        })
    }

    /// Store every upstream commit after the cursor, oldest first
    pub async fn sync(&self, repo: &str) -> Result<SyncReport> {
        validate_repo(repo)?;
        let guard = guard::acquire(&self.db, repo)?;
        let start = Instant::now();

        let cursor = self
            .cursor(repo)?
            .ok_or_else(|| LedgerError::NotBootstrapped {
                repo: repo.to_string(),
            })?;

        tracing::info!(
            repo,
            since = short_sha(&cursor.last_synced_sha),
            "Checking for new commits"
        );

        let mut session = self.source.open(repo).await?;
        let listed = session.list_commits(Some(&cursor), None).await?;
        let mut refs = self.pending_after(repo, &cursor, listed)?;
        sort_chronologically(&mut refs);

        if refs.is_empty() {
            tracing::info!(repo, "Repository up to date");
            return Ok(SyncReport {
                repo: repo.to_string(),
                status: SyncStatus::UpToDate,
                added: 0,
                last_sha: Some(cursor.last_synced_sha),
                duration: start.elapsed(),
            });
        }

        let outcome = self
            .ingest(repo, session.as_mut(), &refs, SyncPhase::Sync, &guard)
            .await?;

        tracing::info!(
            repo,
            added = outcome.inserted,
            stored = outcome.stored,
            "Sync complete"
        );

        let status = if outcome.inserted == 0 {
            SyncStatus::UpToDate
        } else {
            SyncStatus::Synced
        };
        Ok(SyncReport {
            repo: repo.to_string(),
            status,
            added: outcome.inserted,
            last_sha: outcome.last_sha.or(Some(cursor.last_synced_sha)),
            duration: start.elapsed(),
        })
    }

    /// Forget the cursor so the repository can be bootstrapped again
    ///
    /// Stored commits and memory are kept; a later bootstrap over them is a
    /// no-op per commit.
    pub fn reset(&self, repo: &str) -> Result<bool> {
        reset_cursor(&self.db, repo)
    }

    /// Drop refs at or before the cursor's (timestamp, sha) position and refs
    /// already stored; sources may list `since` inclusively
    fn pending_after(
        &self,
        repo: &str,
        cursor: &SyncCursor,
        listed: Vec<CommitRef>,
    ) -> Result<Vec<CommitRef>> {
        let position = (cursor.last_synced_timestamp, cursor.last_synced_sha.as_str());
        let handle = self.db.connect()?;
        let audit = handle.audit();

        let mut pending = Vec::with_capacity(listed.len());
        for commit_ref in listed {
            if (commit_ref.timestamp, commit_ref.sha.as_str()) <= position {
                continue;
            }
            if audit.contains_commit(repo, &commit_ref.sha)? {
                tracing::debug!(repo, sha = short_sha(&commit_ref.sha), "Skipping stored commit");
                continue;
            }
            pending.push(commit_ref);
        }
        Ok(pending)
    }

    async fn ingest(
        &self,
        repo: &str,
        session: &mut dyn SourceSession,
        refs: &[CommitRef],
        phase: SyncPhase,
        guard: &RepoGuard,
    ) -> Result<BatchOutcome> {
        let handle = self.db.connect()?;
        let mut outcome = BatchOutcome {
            stored: 0,
            inserted: 0,
            last_sha: None,
        };

        for commit_ref in refs {
            let fetched = session.fetch_commit(&commit_ref.sha).await;
            let commit = match fetched {
                Ok(commit) => commit,
                Err(e) => {
                    tracing::warn!(
                        repo,
                        sha = short_sha(&commit_ref.sha),
                        stored = outcome.stored,
                        error = %e,
                        "Fetch failed, stopping batch"
                    );
                    return Err(e.into());
                }
            };
            let analysis = self.findings.analyze(&commit).await?;

            let (record, dependencies) = build_record(repo, commit, analysis);
            let put = self.store_commit(&handle, &record, &dependencies, phase, guard)?;

            outcome.stored += 1;
            if put == PutOutcome::Inserted {
                outcome.inserted += 1;
            }
            outcome.last_sha = Some(record.commit_sha.clone());

            tracing::debug!(
                repo,
                sha = record.short_sha(),
                score = record.quality_score,
                issues = record.issue_count(),
                outcome = ?put,
                "Ingested commit"
            );
        }

        Ok(outcome)
    }

    /// Store one commit, its snapshots, its memory fold and the cursor move
    /// as a single transaction
    fn store_commit(
        &self,
        handle: &StoreHandle,
        record: &CommitAuditRecord,
        dependencies: &[DependencyGraphEntry],
        phase: SyncPhase,
        guard: &RepoGuard,
    ) -> Result<PutOutcome> {
        let tx = handle.begin_immediate()?;

        let put = handle.audit().put_commit(record)?;
        for entry in dependencies {
            handle.audit().put_dependency_snapshot(entry)?;
        }
        if put.outcome == PutOutcome::Inserted {
            handle.memory(&self.policy).observe(&record.repo, record)?;
        }
        handle
            .cursors()
            .advance(&record.repo, &record.commit_sha, record.timestamp, phase)?;
        guard.refresh(handle)?;

        tx.commit()?;
        Ok(put.outcome)
    }
}

/// Forget a repository's cursor without needing a commit source
///
/// Takes the same claim as ingestion, so it fails fast while a bootstrap or
/// sync of `repo` is running in any process.
pub fn reset_cursor(db: &Database, repo: &str) -> Result<bool> {
    validate_repo(repo)?;
    let _guard = guard::acquire(db, repo)?;
    let removed = db.connect()?.cursors().delete(repo)?;
    tracing::info!(repo, removed, "Reset sync cursor");
    Ok(removed)
}

fn validate_repo(repo: &str) -> Result<()> {
    if repo.trim().is_empty() {
        return Err(LedgerError::invalid("repository name must not be empty"));
    }
    Ok(())
}

fn sort_chronologically(refs: &mut [CommitRef]) {
    refs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.sha.cmp(&b.sha)));
}

fn build_record(
    repo: &str,
    commit: SourceCommit,
    analysis: Analysis,
) -> (CommitAuditRecord, Vec<DependencyGraphEntry>) {
    let quality_score = analysis
        .quality_score
        .unwrap_or_else(|| scoring::quality_score(&analysis.issues));

    let dependencies = analysis
        .dependencies
        .into_iter()
        .map(|d| DependencyGraphEntry {
            repo: repo.to_string(),
            file_path: d.file_path,
            as_of_sha: commit.sha.clone(),
            as_of: commit.timestamp,
            imports: d.imports,
            exports: d.exports,
            external_deps: d.external_deps,
        })
        .collect();

    let record = CommitAuditRecord {
        repo: repo.to_string(),
        commit_sha: commit.sha,
        author: commit.author,
        author_email: commit.author_email,
        timestamp: commit.timestamp,
        message: commit.message,
        files_changed: commit.files_changed,
        quality_score,
        issues: analysis.issues,
        additions: commit.additions,
        deletions: commit.deletions,
    };

    (record, dependencies)
}
