//! CLI command implementations

use super::output::{OutputEvent, OutputHandler, Report};
use super::{Commands, HistoryArgs, QueryArgs};
use crate::cancel::{CancellationToken, with_cancellation};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::memory::{MemoryEntry, MemoryRecord, MemoryStats, MemoryType};
use crate::model::{CommitFilter, short_sha};
use crate::orchestrator::{
    CompositeRequest, CompositeResponse, Orchestrator, SectionOutcome, ViewKind, ViewResult,
};
use crate::query::{
    AuthorsResult, FilterResponse, PatternsResult, QueryEngine, RootCauseResult, TrendResult,
};
use crate::source::HistorySource;
use crate::store::{Database, RepositoryStats};
use crate::sync::{
    BootstrapReport, SyncController, SyncReport, SyncStatus, is_claimed, reset_cursor,
};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything a command needs besides its own arguments
pub struct CommandContext {
    pub config: LedgerConfig,
    pub db: Database,
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn open(config: LedgerConfig, database: PathBuf, cancel: CancellationToken) -> Result<Self> {
        let db = Database::open(&database)
            .with_context(|| format!("opening ledger database {}", database.display()))?
            .with_busy_timeout(Duration::from_millis(config.storage.busy_timeout_ms));

        Ok(Self { config, db, cancel })
    }
}

/// Run one command and report through `handler`; returns the exit code
pub async fn execute(
    command: Commands,
    ctx: &CommandContext,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let report = match command {
        Commands::Bootstrap { history, count } => bootstrap(ctx, &history, count, handler).await?,
        Commands::Sync { history } => sync(ctx, &history, handler).await?,
        Commands::Reset { repo } => reset(ctx, &repo)?,
        Commands::Filter { query, min_issues } => filter(ctx, &query, min_issues).await?,
        Commands::Trend { query } => trend(ctx, &query).await?,
        Commands::RootCause { query } => root_cause(ctx, &query).await?,
        Commands::Authors { query } => authors(ctx, &query).await?,
        Commands::Patterns { query } => patterns(ctx, &query).await?,
        Commands::Composite { query, views } => composite(ctx, &query, views, handler).await?,
        Commands::Show { repo, sha } => show(ctx, &repo, &sha)?,
        Commands::Deps {
            repo,
            file,
            as_of,
            history,
        } => deps(ctx, &repo, &file, as_of, history)?,
        Commands::Memory {
            scope,
            memory_type,
            stats,
        } => memory(ctx, &scope, memory_type, stats)?,
        Commands::Repos { repo } => repos(ctx, repo.as_deref())?,
    };

    handler.report(&report);
    Ok(report.exit_code())
}

fn history_controller(ctx: &CommandContext, args: &HistoryArgs) -> Result<(SyncController, String)> {
    let source = HistorySource::load(&args.history)
        .with_context(|| format!("loading history {}", args.history.display()))?;
    let repo = args
        .repo
        .clone()
        .unwrap_or_else(|| source.repo().to_string());

    let source = Arc::new(source);
    let controller = SyncController::new(
        ctx.db.clone(),
        source.clone(),
        source,
        ctx.config.memory.clone(),
    );
    Ok((controller, repo))
}

async fn bootstrap(
    ctx: &CommandContext,
    args: &HistoryArgs,
    count: usize,
    handler: &dyn OutputHandler,
) -> Result<Report> {
    let (controller, repo) = history_controller(ctx, args)?;
    handler.emit(OutputEvent::CommandStart {
        command: "bootstrap".into(),
        repo: Some(repo.clone()),
    });

    let report = with_cancellation(&ctx.cancel, controller.bootstrap(&repo, count))
        .await
        .ok_or(LedgerError::Cancelled)??;

    Ok(Report::new("bootstrap", &report)?.lines(bootstrap_summary(&report)))
}

async fn sync(ctx: &CommandContext, args: &HistoryArgs, handler: &dyn OutputHandler) -> Result<Report> {
    let (controller, repo) = history_controller(ctx, args)?;
    handler.emit(OutputEvent::CommandStart {
        command: "sync".into(),
        repo: Some(repo.clone()),
    });

    let report = with_cancellation(&ctx.cancel, controller.sync(&repo))
        .await
        .ok_or(LedgerError::Cancelled)??;

    Ok(Report::new("sync", &report)?.lines(sync_summary(&report)))
}

fn reset(ctx: &CommandContext, repo: &str) -> Result<Report> {
    let removed = reset_cursor(&ctx.db, repo)?;
    let line = if removed {
        format!("Reset sync cursor for {}", repo)
    } else {
        format!("{} had no sync cursor", repo)
    };
    Ok(Report::new("reset", &serde_json::json!({ "repo": repo, "removed": removed }))?.line(line))
}

/// Run a read-only view on a blocking worker, honouring the context's token
async fn run_query<T, F>(ctx: &CommandContext, view: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&QueryEngine<'_>) -> crate::error::Result<T> + Send + 'static,
{
    let db = ctx.db.clone();
    let settings = ctx.config.query.clone();
    let policy = ctx.config.memory.clone();
    let cancel = ctx.cancel.clone();

    let result = tokio::task::spawn_blocking(move || -> crate::error::Result<T> {
        let handle = db.connect()?;
        let engine = QueryEngine::new(&handle, &settings, &policy).with_cancellation(cancel);
        view(&engine)
    })
    .await
    .context("query worker failed")??;
    Ok(result)
}

async fn filter(ctx: &CommandContext, args: &QueryArgs, min_issues: Option<u32>) -> Result<Report> {
    let params = args.params()?;
    let repo = params.repo.clone();
    let filter = CommitFilter {
        author: params.author.clone(),
        files: params.file.iter().cloned().collect(),
        date_range: params.date_range,
        min_issues,
        limit: params.limit,
        order: params.order,
    };

    let response = run_query(ctx, move |engine| engine.filter_commits(&repo, &filter)).await?;
    Ok(Report::new("filter", &response)?.lines(filter_summary(&response)))
}

async fn trend(ctx: &CommandContext, args: &QueryArgs) -> Result<Report> {
    let params = args.params()?;
    let result = run_query(ctx, move |engine| engine.trend(&params)).await?;
    Ok(Report::new("trend", &result)?.lines(trend_summary(&result)))
}

async fn root_cause(ctx: &CommandContext, args: &QueryArgs) -> Result<Report> {
    let params = args.params()?;
    let result = run_query(ctx, move |engine| engine.root_cause(&params)).await?;
    Ok(Report::new("root-cause", &result)?.lines(root_cause_summary(&result)))
}

async fn authors(ctx: &CommandContext, args: &QueryArgs) -> Result<Report> {
    let params = args.params()?;
    let result = run_query(ctx, move |engine| engine.authors(&params)).await?;
    Ok(Report::new("authors", &result)?.lines(authors_summary(&result)))
}

async fn patterns(ctx: &CommandContext, args: &QueryArgs) -> Result<Report> {
    let params = args.params()?;
    let result = run_query(ctx, move |engine| engine.patterns(&params)).await?;
    Ok(Report::new("patterns", &result)?.lines(patterns_summary(&result)))
}

async fn composite(
    ctx: &CommandContext,
    args: &QueryArgs,
    views: Vec<ViewKind>,
    handler: &dyn OutputHandler,
) -> Result<Report> {
    let request = CompositeRequest {
        views,
        params: args.params()?,
    };
    handler.emit(OutputEvent::CommandStart {
        command: "composite".into(),
        repo: Some(request.params.repo.clone()),
    });

    let orchestrator = Orchestrator::new(
        ctx.db.clone(),
        ctx.config.query.clone(),
        ctx.config.memory.clone(),
    );
    let response = orchestrator.composite(&request, &ctx.cancel).await?;

    for failure in &response.failures {
        handler.emit(OutputEvent::Warning {
            message: format!("{} view failed: {}", failure.view, failure.failure),
        });
    }

    Ok(Report::new("composite", &response)?.lines(composite_summary(&response)))
}

fn show(ctx: &CommandContext, repo: &str, sha: &str) -> Result<Report> {
    let record = ctx.db.connect()?.audit().get_commit(repo, sha)?;

    let mut lines = vec![
        format!("commit {}", record.commit_sha),
        format!("Author: {} <{}>", record.author, record.author_email),
        format!("Date:   {}", record.timestamp.to_rfc3339()),
        format!("Score:  {:.2}", record.quality_score),
        String::new(),
        format!("    {}", record.message.lines().next().unwrap_or_default()),
        String::new(),
    ];
    lines.extend(record.files_changed.iter().map(|f| format!("  {}", f)));
    lines.extend(record.issues.iter().map(|issue| {
        format!(
            "  [{}/{}] {}:{} {} {}",
            issue.kind, issue.severity, issue.file, issue.line, issue.rule, issue.message
        )
    }));

    Ok(Report::new("show", &record)?.lines(lines))
}

fn deps(
    ctx: &CommandContext,
    repo: &str,
    file: &str,
    as_of: Option<chrono::DateTime<chrono::Utc>>,
    history: bool,
) -> Result<Report> {
    let handle = ctx.db.connect()?;
    let audit = handle.audit();

    let snapshots = if history {
        audit.dependency_history(repo, file)?
    } else {
        let snapshot = match as_of {
            Some(at) => audit.get_dependency_snapshot_as_of(repo, file, at)?,
            None => audit.get_dependency_snapshot(repo, file)?,
        };
        vec![snapshot]
    };

    let lines: Vec<String> = snapshots
        .iter()
        .map(|s| {
            format!(
            "{} @ {} ({}): {} imports, {} exports, external: {}",
            s.file_path,
            short_sha(&s.as_of_sha),
            s.as_of.format("%Y-%m-%d"),
            s.imports.len(),
            s.exports.len(),
            s.external_deps.iter().cloned().collect::<Vec<_>>().join(", ")
            )
        })
        .collect();

    Ok(Report::new("deps", &snapshots)?.lines(lines))
}

fn memory(
    ctx: &CommandContext,
    scope: &str,
    memory_type: Option<MemoryType>,
    stats: bool,
) -> Result<Report> {
    let handle = ctx.db.connect()?;
    let layer = handle.memory(&ctx.config.memory);

    if stats {
        let stats = layer.stats(scope)?;
        return Ok(Report::new("memory", &stats)?.lines(memory_stats_summary(scope, &stats)));
    }

    let types = match memory_type {
        Some(t) => vec![t],
        None => MemoryType::ALL.to_vec(),
    };
    let mut entries = Vec::new();
    for memory_type in types {
        entries.extend(layer.lookup_prefix(memory_type, scope)?);
    }

    let lines: Vec<String> = if entries.is_empty() {
        vec![format!("No memory records under {}", scope)]
    } else {
        entries.iter().map(memory_entry_line).collect()
    };
    Ok(Report::new("memory", &entries)?.lines(lines))
}

fn repos(ctx: &CommandContext, repo: Option<&str>) -> Result<Report> {
    let handle = ctx.db.connect()?;
    let audit = handle.audit();

    if let Some(repo) = repo {
        let stats = audit.repository_stats(repo)?;
        let cursor = handle.cursors().get(repo)?;
        let syncing = is_claimed(&handle, repo)?;
        let mut lines = repo_stats_summary(&stats);
        lines.push(match &cursor {
            Some(c) => format!(
                "  cursor: {} ({}, {})",
                short_sha(&c.last_synced_sha),
                c.phase,
                c.last_synced_timestamp.to_rfc3339()
            ),
            None => "  cursor: none".to_string(),
        });
        if syncing {
            lines.push("  ingestion in progress".to_string());
        }
        let data = serde_json::json!({ "stats": stats, "cursor": cursor, "syncing": syncing });
        return Ok(Report::new("repos", &data)?.lines(lines));
    }

    let repos = audit.list_repositories()?;
    let lines: Vec<String> = if repos.is_empty() {
        vec!["(no repositories tracked)".to_string()]
    } else {
        repos.clone()
    };
    Ok(Report::new("repos", &repos)?.lines(lines))
}

fn bootstrap_summary(report: &BootstrapReport) -> Vec<String> {
    vec![format!(
        "Bootstrapped {}: {} commits ({} new), last {} in {:.1}s",
        report.repo,
        report.stored,
        report.inserted,
        report.last_sha.as_deref().map(short_sha).unwrap_or("-"),
        report.duration.as_secs_f64()
    )]
}

fn sync_summary(report: &SyncReport) -> Vec<String> {
    match report.status {
        SyncStatus::UpToDate => vec![format!("{} is up to date", report.repo)],
        SyncStatus::Synced => vec![format!(
            "Synced {}: {} new commits, last {}",
            report.repo,
            report.added,
            report.last_sha.as_deref().map(short_sha).unwrap_or("-")
        )],
    }
}

fn filter_summary(response: &FilterResponse) -> Vec<String> {
    let mut lines: Vec<String> = response
        .commits
        .iter()
        .map(|c| {
            format!(
                "{} {} {:<20} {:>6.2} {:>3} issues  {}",
                c.short_sha(),
                c.timestamp.format("%Y-%m-%d"),
                c.author,
                c.quality_score,
                c.issue_count(),
                c.message.lines().next().unwrap_or_default()
            )
        })
        .collect();
    lines.push(format!(
        "{} of {} matching commits",
        response.commits.len(),
        response.total_found
    ));
    lines
}

fn trend_summary(result: &TrendResult) -> Vec<String> {
    let mut lines: Vec<String> = result
        .buckets
        .iter()
        .map(|b| {
            format!(
                "{} .. {}  {:>3} commits  avg {:>6.2}  min {:>6.2}  {} issues",
                b.start.format("%Y-%m-%d"),
                b.end.format("%Y-%m-%d"),
                b.commit_count,
                b.avg_quality_score,
                b.min_quality_score,
                b.issue_count
            )
        })
        .collect();

    if result.insufficient_data {
        lines.push(format!(
            "Direction: {} (not enough windows)",
            result.direction.as_str()
        ));
    } else {
        lines.push(format!(
            "Direction: {} ({:+.2} points)",
            result.direction.as_str(),
            result.delta
        ));
    }
    lines
}

fn root_cause_summary(result: &RootCauseResult) -> Vec<String> {
    let Some(signal) = &result.signal else {
        return vec![format!("No quality degradation found in {}", result.repo)];
    };

    let mut lines = vec![format!(
        "Quality dropped {:.2} points ({:.2} -> {:.2}) between {} and {}",
        signal.drop,
        signal.baseline_score,
        signal.degraded_score,
        signal.start.format("%Y-%m-%d"),
        signal.end.format("%Y-%m-%d")
    )];
    lines.extend(result.contributors.iter().enumerate().map(|(i, c)| {
        format!(
            "{:>2}. {} {:<20} score {:>6.2}  severity {:>5.1}  rank {:.2}",
            i + 1,
            short_sha(&c.commit_sha),
            c.author,
            c.quality_score,
            c.severity_score,
            c.rank_score
        )
    }));
    lines
}

fn authors_summary(result: &AuthorsResult) -> Vec<String> {
    if result.authors.is_empty() {
        return vec![format!("No commits by any author in {}", result.repo)];
    }
    result
        .authors
        .iter()
        .map(|a| {
            format!(
                "{:<24} {:>4} commits  avg {:>6.2}  min {:>6.2}  {:.2} issues/commit",
                a.author, a.commit_count, a.avg_quality_score, a.min_quality_score, a.issues_per_commit
            )
        })
        .collect()
}

fn patterns_summary(result: &PatternsResult) -> Vec<String> {
    if result.patterns.is_empty() {
        return vec![format!("No recurring patterns under {}", result.scope)];
    }
    result
        .patterns
        .iter()
        .map(|entry| {
            let p = &entry.pattern;
            format!(
                "{}/{} {:<12} x{:<4} confidence {:.2}  last seen {}",
                p.kind,
                p.severity,
                p.rule,
                p.occurrence_count,
                entry.effective_confidence,
                p.last_seen.format("%Y-%m-%d")
            )
        })
        .collect()
}

fn composite_summary(response: &CompositeResponse) -> Vec<String> {
    let mut lines = Vec::new();
    for section in &response.views {
        lines.push(format!("== {} ({}ms)", section.view, section.elapsed_ms));
        match &section.outcome {
            SectionOutcome::Success { result } => {
                let section_lines = match result {
                    ViewResult::Trend(r) => trend_summary(r),
                    ViewResult::RootCause(r) => root_cause_summary(r),
                    ViewResult::Authors(r) => authors_summary(r),
                    ViewResult::Patterns(r) => patterns_summary(r),
                };
                lines.extend(section_lines);
            }
            SectionOutcome::Failed { error } => {
                lines.push(format!("failed: {}", error.failure));
            }
        }
    }

    lines.push(format!("== evidence ({} commits)", response.evidence.len()));
    lines.extend(response.evidence.iter().map(|e| {
        let views: Vec<&str> = e.supported_by.iter().map(|v| v.as_str()).collect();
        format!("{} {}", short_sha(&e.commit_sha), views.join(", "))
    }));
    lines
}

fn memory_entry_line(entry: &MemoryEntry) -> String {
    match &entry.record {
        MemoryRecord::ReviewPattern(p) => format!(
            "[pattern] {} {}/{} x{} confidence {:.2}",
            entry.key.scope, p.kind, p.rule, p.occurrence_count, p.confidence
        ),
        MemoryRecord::TeamStandard(s) => format!(
            "[standard] {} {} strength {:.2} ({}/{})",
            entry.key.scope, s.rule, s.strength, s.conforming, s.observations
        ),
        MemoryRecord::AuthorPreference(a) => format!(
            "[author] {} {} <{}> {} commits, recent avg {:.2}, issue rate {:.2}",
            entry.key.scope,
            a.author,
            a.author_email,
            a.commit_count,
            a.average_recent_score,
            a.issue_rate
        ),
    }
}

fn memory_stats_summary(scope: &str, stats: &MemoryStats) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: {} records from {} observed commits",
        if scope.is_empty() { "(all)" } else { scope },
        stats.total_records,
        stats.observed_commits
    )];
    lines.extend(
        stats
            .records_by_type
            .iter()
            .map(|(memory_type, count)| format!("  {:<18} {}", memory_type, count)),
    );
    lines.push(format!("  pattern occurrences {}", stats.pattern_occurrences));
    lines
}

fn repo_stats_summary(stats: &RepositoryStats) -> Vec<String> {
    vec![
        format!("{}: {} commits", stats.repo, stats.commit_count),
        format!(
            "  from {} to {}",
            stats.first_commit_at.format("%Y-%m-%d"),
            stats.last_commit_at.format("%Y-%m-%d")
        ),
        format!(
            "  average score {:.2}, {} issues",
            stats.avg_quality_score, stats.total_issues
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::cli::output::capture::CaptureHandler;
    use clap::Parser;
    use tempfile::TempDir;

    const HISTORY: &str = r#"{
        "repo": "acme/api",
        "commits": [
            {
                "sha": "a1a1a1a1", "author": "Alice", "author_email": "alice@example.com",
                "timestamp": "2024-11-01T09:00:00Z", "message": "feat: add users endpoint",
                "files_changed": ["app/main.py"], "quality_score": 96.0
            },
            {
                "sha": "b2b2b2b2", "author": "Bob", "author_email": "bob@example.com",
                "timestamp": "2024-11-02T09:00:00Z", "message": "fix: pagination",
                "files_changed": ["app/domain.py"], "quality_score": 94.0
            },
            {
                "sha": "c3c3c3c3", "author": "Alice", "author_email": "alice@example.com",
                "timestamp": "2024-11-09T09:00:00Z", "message": "raw sql for reports",
                "files_changed": ["app/db.py"],
                "issues": [{"kind": "security", "severity": "high", "file": "app/db.py", "line": 12, "rule": "B608"}],
                "dependencies": [{"file_path": "app/db.py", "imports": ["app.models"], "external_deps": ["sqlalchemy"]}],
                "quality_score": 80.0
            },
            {
                "sha": "d4d4d4d4", "author": "Bob", "author_email": "bob@example.com",
                "timestamp": "2024-11-15T09:00:00Z", "message": "more raw sql",
                "files_changed": ["app/db.py"],
                "issues": [
                    {"kind": "security", "severity": "high", "file": "app/db.py", "line": 30, "rule": "B608"},
                    {"kind": "security", "severity": "high", "file": "app/db.py", "line": 44, "rule": "B608"}
                ],
                "quality_score": 62.0
            }
        ]
    }"#;

    struct Fixture {
        _dir: TempDir,
        history: PathBuf,
        ctx: CommandContext,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let history = dir.path().join("history.json");
        std::fs::write(&history, HISTORY).unwrap();
        let ctx = CommandContext::open(
            LedgerConfig::default(),
            dir.path().join("ledger.db"),
            CancellationToken::new(),
        )
        .unwrap();
        Fixture {
            _dir: dir,
            history,
            ctx,
        }
    }

    async fn run(fixture: &Fixture, args: &[&str]) -> (i32, CaptureHandler) {
        let mut argv = vec!["qledger"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        let handler = CaptureHandler::default();
        let code = execute(cli.command, &fixture.ctx, &handler).await.unwrap();
        (code, handler)
    }

    #[tokio::test]
    async fn test_bootstrap_sync_and_query() {
        let fx = fixture();
        let history = fx.history.to_string_lossy().into_owned();

        let (code, out) = run(&fx, &["bootstrap", "--history", &history, "--count", "2"]).await;
        assert_eq!(code, 0);
        assert_eq!(out.last_report().data["stored"], 2);

        let (_, out) = run(&fx, &["sync", "--history", &history]).await;
        assert_eq!(out.last_report().data["added"], 2);

        let (_, out) = run(&fx, &["sync", "--history", &history]).await;
        assert_eq!(out.last_report().data["status"], "up_to_date");

        let (_, out) = run(&fx, &["filter", "acme/api", "--author", "alice"]).await;
        let report = out.last_report();
        assert_eq!(report.data["total_found"], 2);
        assert_eq!(report.summary.last().unwrap(), "2 of 2 matching commits");

        let (_, out) = run(&fx, &["trend", "acme/api"]).await;
        assert_eq!(out.last_report().data["direction"], "degrading");
    }

    #[tokio::test]
    async fn test_composite_merges_evidence() {
        let fx = fixture();
        let history = fx.history.to_string_lossy().into_owned();
        run(&fx, &["bootstrap", "--history", &history]).await;

        let (code, out) = run(
            &fx,
            &["composite", "acme/api", "--views", "root-cause,patterns"],
        )
        .await;
        assert_eq!(code, 0);

        let report = out.last_report();
        assert_eq!(report.data["status"], "success");
        let evidence = report.data["evidence"].as_array().unwrap();
        let first = &evidence[0];
        assert_eq!(first["commit_sha"], "d4d4d4d4");
        assert_eq!(
            first["supported_by"],
            serde_json::json!(["root_cause", "patterns"])
        );
    }

    #[tokio::test]
    async fn test_show_deps_memory_and_repos() {
        let fx = fixture();
        let history = fx.history.to_string_lossy().into_owned();
        run(&fx, &["bootstrap", "--history", &history]).await;

        let (_, out) = run(&fx, &["show", "acme/api", "c3c3"]).await;
        assert_eq!(out.last_report().data["commit_sha"], "c3c3c3c3");

        let (_, out) = run(&fx, &["deps", "acme/api", "app/db.py"]).await;
        assert_eq!(out.last_report().data[0]["as_of_sha"], "c3c3c3c3");

        let (_, out) = run(&fx, &["memory", "acme/api", "--stats"]).await;
        let report = out.last_report();
        assert_eq!(report.data["observed_commits"], 4);
        assert!(report.data["pattern_occurrences"].as_u64().unwrap() > 0);

        let (_, out) = run(&fx, &["repos"]).await;
        assert_eq!(out.last_report().data, serde_json::json!(["acme/api"]));

        let (_, out) = run(&fx, &["repos", "acme/api"]).await;
        assert_eq!(out.last_report().data["stats"]["commit_count"], 4);
        assert_eq!(out.last_report().data["syncing"], false);
    }

    #[tokio::test]
    async fn test_reset_allows_second_bootstrap() {
        let fx = fixture();
        let history = fx.history.to_string_lossy().into_owned();
        run(&fx, &["bootstrap", "--history", &history]).await;

        let (_, out) = run(&fx, &["reset", "acme/api"]).await;
        assert_eq!(out.last_report().data["removed"], true);

        let (_, out) = run(&fx, &["bootstrap", "--history", &history]).await;
        let report = out.last_report();
        assert_eq!(report.data["stored"], 4);
        assert_eq!(report.data["inserted"], 0);
    }

    #[tokio::test]
    async fn test_reset_and_sync_respect_another_process_claim() {
        let fx = fixture();
        let history = fx.history.to_string_lossy().into_owned();
        run(&fx, &["bootstrap", "--history", &history, "-n", "2"]).await;

        let now = chrono::Utc::now().timestamp_micros();
        let conn = rusqlite::Connection::open(fx.ctx.db.path()).unwrap();
        conn.execute(
            "INSERT INTO sync_locks (repo, holder, acquired_micros, refreshed_micros)
             VALUES ('acme/api', '4242:1', ?1, ?1)",
            [now],
        )
        .unwrap();

        for args in [vec!["reset", "acme/api"], vec!["sync", "--history", history.as_str()]] {
            let cli = Cli::try_parse_from(std::iter::once("qledger").chain(args)).unwrap();
            let err = execute(cli.command, &fx.ctx, &CaptureHandler::default())
                .await
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<LedgerError>(),
                Some(LedgerError::SyncInProgress { .. })
            ));
        }
        let (_, out) = run(&fx, &["repos", "acme/api"]).await;
        assert_eq!(out.last_report().data["syncing"], true);

        conn.execute("DELETE FROM sync_locks", []).unwrap();
        let (_, out) = run(&fx, &["reset", "acme/api"]).await;
        assert_eq!(out.last_report().data["removed"], true);
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let fx = fixture();
        let cli = Cli::try_parse_from(["qledger", "show", "acme/api", "ffff"]).unwrap();
        let err = execute(cli.command, &fx.ctx, &CaptureHandler::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_query_reports_cancelled() {
        let fx = fixture();
        fx.ctx.cancel.cancel();
        let cli = Cli::try_parse_from(["qledger", "trend", "acme/api"]).unwrap();
        let err = execute(cli.command, &fx.ctx, &CaptureHandler::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::Cancelled)
        ));
    }
}
