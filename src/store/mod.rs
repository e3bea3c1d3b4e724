//! Durable storage for audit records, dependency snapshots, cursors and memory
//!
//! A [`Database`] is only a path plus connection settings; it is cheap to clone
//! and safe to hand to other threads. Every operation works through a
//! [`StoreHandle`], which owns exactly one SQLite connection and releases it
//! when dropped, so a handle acquired for a call or a batch is closed on every
//! exit path.
//!
//! # Example
//!
//! ```ignore
//! let db = Database::open(".quality-ledger/ledger.db")?;
//! let handle = db.connect()?;
//! let commits = handle.audit().get_commits("acme/api", &CommitFilter::default())?;
//! ```

mod audit;
mod cursor;
mod schema;

pub use audit::{AuditStore, PutOutcome, PutResult, RepositoryStats};
pub use cursor::{CursorStore, SyncCursor, SyncPhase};

use crate::config::MemoryPolicy;
use crate::error::{LedgerError, Result};
use crate::memory::MemoryLayer;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Location and settings of the ledger database
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// Open or create the database and make sure the schema exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LedgerError::invalid(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let db = Self {
            path,
            busy_timeout: Duration::from_secs(5),
        };

        let conn = db.raw_connection()?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        schema::init_schema(&conn)?;

        tracing::debug!(path = %db.path.display(), "Opened ledger database");
        Ok(db)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire a scoped handle; the connection closes when it is dropped
    pub fn connect(&self) -> Result<StoreHandle> {
        let conn = self.raw_connection()?;
        Ok(StoreHandle { conn })
    }

    fn raw_connection(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }
}

/// One open connection to the ledger
pub struct StoreHandle {
    conn: Connection,
}

impl StoreHandle {
    pub fn audit(&self) -> AuditStore<'_> {
        AuditStore::new(&self.conn)
    }

    pub fn cursors(&self) -> CursorStore<'_> {
        CursorStore::new(&self.conn)
    }

    pub fn memory<'a>(&'a self, policy: &'a MemoryPolicy) -> MemoryLayer<'a> {
        MemoryLayer::new(&self.conn, policy)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start a write transaction that takes the database write lock up front
    pub(crate) fn begin_immediate(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

/// Run `f` atomically: inside the caller's transaction if one is open,
/// otherwise inside a fresh immediate transaction
pub(crate) fn with_write<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    if conn.is_autocommit() {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    } else {
        f(conn)
    }
}

pub(crate) fn time_to_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

pub(crate) fn time_from_text(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

pub(crate) fn json_from_text<T: serde::de::DeserializeOwned>(
    idx: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
