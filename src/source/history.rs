//! Commit history loaded from a JSON file with embedded findings

use super::{Analysis, CommitRef, CommitSource, FindingsProducer, SourceCommit, SourceSession};
use crate::error::SourceError;
use crate::store::SyncCursor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// On-disk layout: one repository and its commits in any order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryFile {
    pub repo: String,
    pub commits: Vec<HistoryCommit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryCommit {
    #[serde(flatten)]
    pub commit: SourceCommit,

    #[serde(flatten)]
    pub analysis: Analysis,
}

/// Serves a fixed history as both commit source and findings producer
#[derive(Debug, Clone)]
pub struct HistorySource {
    repo: String,
    commits: Arc<Vec<HistoryCommit>>,
    by_sha: Arc<HashMap<String, usize>>,
}

impl HistorySource {
    pub fn new(repo: impl Into<String>, mut commits: Vec<HistoryCommit>) -> Self {
        commits.sort_by(|a, b| {
            a.commit
                .timestamp
                .cmp(&b.commit.timestamp)
                .then_with(|| a.commit.sha.cmp(&b.commit.sha))
        });
        let by_sha = commits
            .iter()
            .enumerate()
            .map(|(i, c)| (c.commit.sha.clone(), i))
            .collect();

        Self {
            repo: repo.into(),
            commits: Arc::new(commits),
            by_sha: Arc::new(by_sha),
        }
    }

    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let what = path.display().to_string();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SourceError::fetch(what.clone(), e.to_string()))?;
        let file: HistoryFile =
            serde_json::from_str(&raw).map_err(|e| SourceError::fetch(what, e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            repo = %file.repo,
            commits = file.commits.len(),
            "Loaded commit history"
        );
        Ok(Self::new(file.repo, file.commits))
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    fn find(&self, sha: &str) -> Option<&HistoryCommit> {
        self.by_sha.get(sha).and_then(|&i| self.commits.get(i))
    }
}

#[async_trait]
impl CommitSource for HistorySource {
    async fn open(&self, repo: &str) -> Result<Box<dyn SourceSession>, SourceError> {
        if repo != self.repo {
            return Err(SourceError::unavailable(format!(
                "history holds {}, not {}",
                self.repo, repo
            )));
        }
        tracing::debug!(repo, "Opened history session");
        Ok(Box::new(HistorySession {
            source: self.clone(),
        }))
    }
}

#[async_trait]
impl FindingsProducer for HistorySource {
    async fn analyze(&self, commit: &SourceCommit) -> Result<Analysis, SourceError> {
        self.find(&commit.sha)
            .map(|c| c.analysis.clone())
            .ok_or_else(|| SourceError::analysis(&commit.sha, "no findings recorded"))
    }
}

struct HistorySession {
    source: HistorySource,
}

#[async_trait]
impl SourceSession for HistorySession {
    async fn list_commits(
        &mut self,
        since: Option<&SyncCursor>,
        limit: Option<usize>,
    ) -> Result<Vec<CommitRef>, SourceError> {
        let commits = self.source.commits.as_slice();
        let start = match since {
            None => 0,
            Some(cursor) => match self.source.by_sha.get(&cursor.last_synced_sha) {
                Some(&i) => i + 1,
                None => commits
                    .iter()
                    .position(|c| c.commit.timestamp > cursor.last_synced_timestamp)
                    .unwrap_or(commits.len()),
            },
        };

        let refs = commits[start..]
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|c| c.commit.commit_ref())
            .collect();
        Ok(refs)
    }

    async fn fetch_commit(&mut self, sha: &str) -> Result<SourceCommit, SourceError> {
        self.source
            .find(sha)
            .map(|c| c.commit.clone())
            .ok_or_else(|| SourceError::fetch(sha, "commit not in history"))
    }
}

impl Drop for HistorySession {
    fn drop(&mut self) {
        tracing::debug!(repo = %self.source.repo, "Released history session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SyncPhase;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, day, 12, 0, 0).unwrap()
    }

    fn history() -> HistorySource {
        let commits = [(3, "c3"), (1, "c1"), (2, "c2")]
            .into_iter()
            .map(|(day, sha)| HistoryCommit {
                commit: SourceCommit {
                    sha: sha.into(),
                    author: "Alice".into(),
                    author_email: "alice@example.com".into(),
                    timestamp: at(day),
                    message: format!("feat: {}", sha),
                    files_changed: vec!["app/main.py".into()],
                    additions: 1,
                    deletions: 0,
                },
                analysis: Analysis::default(),
            })
            .collect();
        HistorySource::new("acme/api", commits)
    }

    #[tokio::test]
    async fn test_lists_oldest_first_after_cursor() {
        let source = history();
        let mut session = source.open("acme/api").await.unwrap();

        let all = session.list_commits(None, None).await.unwrap();
        let shas: Vec<_> = all.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(shas, vec!["c1", "c2", "c3"]);

        let first_two = session.list_commits(None, Some(2)).await.unwrap();
        assert_eq!(first_two.len(), 2);

        let cursor = SyncCursor {
            repo: "acme/api".into(),
            last_synced_sha: "c2".into(),
            last_synced_timestamp: at(2),
            phase: SyncPhase::Bootstrap,
        };
        let rest = session.list_commits(Some(&cursor), None).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].sha, "c3");
    }

    #[tokio::test]
    async fn test_open_rejects_other_repo() {
        let source = history();
        assert!(source.open("acme/web").await.is_err());
    }

    #[test]
    fn test_history_file_format() {
        let raw = r#"{
            "repo": "acme/api",
            "commits": [{
                "sha": "abc123",
                "author": "DevOps Team",
                "author_email": "devops@example.com",
                "timestamp": "2024-11-04T10:00:00Z",
                "message": "refactor: Move secrets to environment variables",
                "files_changed": ["app/config.py"],
                "issues": [{
                    "kind": "security",
                    "severity": "medium",
                    "file": "app/config.py",
                    "line": 4,
                    "rule": "B105"
                }],
                "quality_score": 97.0
            }]
        }"#;

        let file: HistoryFile = serde_json::from_str(raw).unwrap();
        let commit = &file.commits[0];
        assert_eq!(commit.commit.author, "DevOps Team");
        assert_eq!(commit.analysis.issues.len(), 1);
        assert_eq!(commit.analysis.quality_score, Some(97.0));
        assert!(commit.analysis.dependencies.is_empty());
    }
}
