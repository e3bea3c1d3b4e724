//! Database schema for the audit ledger

use rusqlite::Connection;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS commits (
            repo TEXT NOT NULL,
            commit_sha TEXT NOT NULL,
            author TEXT NOT NULL,
            author_email TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            ts_micros INTEGER NOT NULL,
            message TEXT NOT NULL,
            files_changed TEXT NOT NULL,
            quality_score REAL NOT NULL,
            issues TEXT NOT NULL,
            issue_count INTEGER NOT NULL,
            additions INTEGER NOT NULL,
            deletions INTEGER NOT NULL,
            ingested_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (repo, commit_sha)
        );

        CREATE INDEX IF NOT EXISTS idx_commits_repo_ts ON commits(repo, ts_micros);
        CREATE INDEX IF NOT EXISTS idx_commits_author ON commits(repo, author COLLATE NOCASE);
        CREATE INDEX IF NOT EXISTS idx_commits_email ON commits(repo, author_email COLLATE NOCASE);

        CREATE TABLE IF NOT EXISTS commit_files (
            repo TEXT NOT NULL,
            commit_sha TEXT NOT NULL,
            position INTEGER NOT NULL,
            path TEXT NOT NULL,
            basename TEXT NOT NULL,
            PRIMARY KEY (repo, commit_sha, position),
            FOREIGN KEY (repo, commit_sha) REFERENCES commits(repo, commit_sha) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_commit_files_path ON commit_files(repo, path);
        CREATE INDEX IF NOT EXISTS idx_commit_files_basename ON commit_files(repo, basename);

        CREATE TABLE IF NOT EXISTS dependency_snapshots (
            repo TEXT NOT NULL,
            file_path TEXT NOT NULL,
            as_of_sha TEXT NOT NULL,
            as_of TEXT NOT NULL,
            as_of_micros INTEGER NOT NULL,
            imports TEXT NOT NULL,
            exports TEXT NOT NULL,
            external_deps TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (repo, file_path, as_of_sha)
        );

        CREATE INDEX IF NOT EXISTS idx_dependency_latest
            ON dependency_snapshots(repo, file_path, as_of_micros);

        CREATE TABLE IF NOT EXISTS sync_cursors (
            repo TEXT PRIMARY KEY,
            last_synced_sha TEXT NOT NULL,
            last_synced_timestamp TEXT NOT NULL,
            last_synced_micros INTEGER NOT NULL,
            phase TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_locks (
            repo TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            acquired_micros INTEGER NOT NULL,
            refreshed_micros INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS memory_records (
            memory_type TEXT NOT NULL,
            scope TEXT NOT NULL,
            identifier TEXT NOT NULL,
            payload TEXT NOT NULL,
            last_commit_sha TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (memory_type, scope, identifier)
        );

        CREATE INDEX IF NOT EXISTS idx_memory_scope ON memory_records(memory_type, scope);

        CREATE TABLE IF NOT EXISTS memory_observations (
            repo TEXT NOT NULL,
            commit_sha TEXT NOT NULL,
            observed_at TEXT NOT NULL,
            PRIMARY KEY (repo, commit_sha)
        );
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for table in [
            "commits",
            "commit_files",
            "dependency_snapshots",
            "sync_cursors",
            "sync_locks",
            "memory_records",
            "memory_observations",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }
}
