//! Command-line interface for `qledger`
//!
//! This module provides:
//! - The clap command tree
//! - Command implementations (bootstrap, sync, queries, memory, repos)
//! - Output handlers (console, JSON, quiet)
//! - Signal handling that cancels in-flight work

pub mod commands;
pub mod output;
pub mod signals;

pub use commands::{CommandContext, execute};
pub use output::{OutputEvent, OutputHandler, OutputMode, Report, create_handler};
pub use signals::setup_signal_handlers;

use crate::error::LedgerError;
use crate::memory::MemoryType;
use crate::model::{DateRange, IssueKind, SortOrder};
use crate::orchestrator::ViewKind;
use crate::query::{QueryParams, TrendWindow};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "qledger")]
#[command(about = "Commit quality ledger - audit history, trends and learned review patterns")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory holding `.quality-ledger/` (defaults to current)
    #[arg(long, global = true)]
    pub dir: Option<PathBuf>,

    /// Extra configuration file, applied last
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file (overrides configuration)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Suppress normal output
    #[arg(long, global = true)]
    pub quiet: bool,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Console
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Store the first commits of a repository and start tracking it
    Bootstrap {
        #[command(flatten)]
        history: HistoryArgs,

        /// Number of commits to store, oldest first
        #[arg(long, short = 'n', default_value_t = 50)]
        count: usize,
    },

    /// Store commits added since the last bootstrap or sync
    Sync {
        #[command(flatten)]
        history: HistoryArgs,
    },

    /// Forget a repository's sync cursor so it can be bootstrapped again
    Reset {
        repo: String,
    },

    /// List commits matching author, file, date and issue filters
    Filter {
        #[command(flatten)]
        query: QueryArgs,

        /// Only commits with at least this many issues
        #[arg(long)]
        min_issues: Option<u32>,
    },

    /// Quality score trend over time windows
    Trend {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Commits most likely responsible for a quality drop
    RootCause {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Per-author quality ranking
    Authors {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Recurring review findings learned from history
    Patterns {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Run several views at once and merge their evidence
    Composite {
        #[command(flatten)]
        query: QueryArgs,

        /// Views to run (trend, root-cause, authors, patterns)
        #[arg(long, value_delimiter = ',', default_value = "trend,root-cause,authors,patterns")]
        views: Vec<ViewKind>,
    },

    /// Show one stored commit by full or abbreviated SHA
    Show {
        repo: String,
        sha: String,
    },

    /// Dependency snapshots recorded for a file
    Deps {
        repo: String,
        file: String,

        /// Snapshot in effect at this time instead of the latest
        #[arg(long, value_parser = parse_time)]
        as_of: Option<DateTime<Utc>>,

        /// Every retained snapshot, newest first
        #[arg(long, conflicts_with = "as_of")]
        history: bool,
    },

    /// Inspect memory records under a scope (`repo` or `repo::author`)
    Memory {
        scope: String,

        /// Only this memory type (review_pattern, team_standard, author_preference)
        #[arg(long = "type")]
        memory_type: Option<MemoryType>,

        /// Print counts instead of records
        #[arg(long)]
        stats: bool,
    },

    /// List tracked repositories, or summarize one
    Repos {
        repo: Option<String>,
    },
}

/// Where commits come from during ingestion
#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// JSON history file with commits and their findings
    #[arg(long)]
    pub history: PathBuf,

    /// Repository name (defaults to the one recorded in the history file)
    #[arg(long)]
    pub repo: Option<String>,
}

/// Parameters shared by every query command
#[derive(Debug, Args)]
pub struct QueryArgs {
    pub repo: String,

    #[arg(long)]
    pub author: Option<String>,

    #[arg(long)]
    pub file: Option<String>,

    /// Earliest commit time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    pub since: Option<DateTime<Utc>>,

    /// Latest commit time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_time)]
    pub until: Option<DateTime<Utc>>,

    /// Trend window: commit, day, week, month or <n>d
    #[arg(long, default_value = "week")]
    pub window: TrendWindow,

    #[arg(long)]
    pub limit: Option<usize>,

    /// asc or desc
    #[arg(long, default_value = "desc")]
    pub order: SortOrder,

    /// Only findings of this kind (security, complexity)
    #[arg(long)]
    pub kind: Option<IssueKind>,
}

impl QueryArgs {
    pub fn params(&self) -> crate::error::Result<QueryParams> {
        let params = QueryParams {
            repo: self.repo.clone(),
            file: self.file.clone(),
            author: self.author.clone(),
            date_range: DateRange::new(self.since, self.until)?,
            window: self.window,
            limit: self.limit,
            order: self.order,
            kind: self.kind,
        };
        params.validate()?;
        Ok(params)
    }
}

/// Exit code for work interrupted by a signal
pub const EXIT_CANCELLED: i32 = 130;

/// Exit code for failures worth retrying unchanged (`EX_TEMPFAIL`)
pub const EXIT_RETRY_LATER: i32 = 75;

/// Process exit code for a command that failed with `err`
pub fn error_exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<LedgerError>() {
        Some(LedgerError::Cancelled) => EXIT_CANCELLED,
        Some(e) if e.is_retryable() => EXIT_RETRY_LATER,
        _ => 1,
    }
}

/// Accept RFC 3339 timestamps or plain dates (midnight UTC)
fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
        .ok_or_else(|| format!("'{}' is neither RFC 3339 nor YYYY-MM-DD", raw))
}
