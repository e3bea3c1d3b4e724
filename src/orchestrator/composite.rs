//! Concurrent fan-out and fan-in of view invocations

use super::handler::{EngineView, ViewContext, ViewHandler};
use super::merge::{MergedEvidence, merge_evidence};
use super::{ViewKind, ViewResult};
use crate::cancel::CancellationToken;
use crate::config::{MemoryPolicy, QuerySettings};
use crate::error::{LedgerError, PartialResultError, Result, ViewFailure};
use crate::query::QueryParams;
use crate::store::Database;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Resolved views plus the parameters every view shares
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeRequest {
    pub views: Vec<ViewKind>,
    pub params: QueryParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeStatus {
    /// Every requested view produced a result
    Success,
    /// At least one view failed; see `failures`
    Partial,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome {
    Success { result: ViewResult },
    Failed { error: PartialResultError },
}

/// One requested view's slot in the response
#[derive(Debug, Clone, Serialize)]
pub struct ViewSection {
    pub view: ViewKind,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub outcome: SectionOutcome,
}

impl ViewSection {
    pub fn result(&self) -> Option<&ViewResult> {
        match &self.outcome {
            SectionOutcome::Success { result } => Some(result),
            SectionOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&PartialResultError> {
        match &self.outcome {
            SectionOutcome::Success { .. } => None,
            SectionOutcome::Failed { error } => Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositeResponse {
    pub status: CompositeStatus,
    pub repo: String,
    /// Sections in the order the views were requested
    pub views: Vec<ViewSection>,
    pub evidence: Vec<MergedEvidence>,
    pub failures: Vec<PartialResultError>,
}

/// Dispatches composite requests to registered view handlers
pub struct Orchestrator {
    ctx: Arc<ViewContext>,
    handlers: HashMap<ViewKind, Arc<dyn ViewHandler>>,
    view_timeout: Duration,
}

impl Orchestrator {
    /// Orchestrator with the query-engine handler registered for every view
    pub fn new(db: Database, settings: QuerySettings, policy: MemoryPolicy) -> Self {
        let view_timeout = settings.view_timeout();
        let mut handlers: HashMap<ViewKind, Arc<dyn ViewHandler>> = HashMap::new();
        for kind in ViewKind::ALL {
            handlers.insert(kind, Arc::new(EngineView::new(kind)));
        }

        Self {
            ctx: Arc::new(ViewContext {
                db,
                settings,
                policy,
            }),
            handlers,
            view_timeout,
        }
    }

    /// Replace the handler for the view it reports
    pub fn with_handler(mut self, handler: Arc<dyn ViewHandler>) -> Self {
        self.handlers.insert(handler.kind(), handler);
        self
    }

    pub fn with_view_timeout(mut self, timeout: Duration) -> Self {
        self.view_timeout = timeout;
        self
    }

    /// Run every requested view concurrently and merge the results
    ///
    /// Fails only when the request is invalid, when `cancel` fires, or when
    /// every view failed.
    pub async fn composite(
        &self,
        request: &CompositeRequest,
        cancel: &CancellationToken,
    ) -> Result<CompositeResponse> {
        let views = dedupe(&request.views);
        if views.is_empty() {
            return Err(LedgerError::invalid("composite request names no views"));
        }
        request.params.validate()?;
        cancel.check()?;

        tracing::info!(
            repo = %request.params.repo,
            views = ?views,
            "Dispatching composite query"
        );

        let mut view_tokens = Vec::with_capacity(views.len());
        let mut tasks = Vec::with_capacity(views.len());

        for &kind in &views {
            let token = CancellationToken::new();
            view_tokens.push(token.clone());

            let Some(handler) = self.handlers.get(&kind).cloned() else {
                tasks.push(None);
                continue;
            };
            let ctx = Arc::clone(&self.ctx);
            let params = request.params.clone();
            let limit = self.view_timeout;

            tasks.push(Some(tokio::spawn(async move {
                let started = Instant::now();
                let worker_token = token.clone();
                let work = tokio::task::spawn_blocking(move || {
                    handler.run(&ctx, &params, &worker_token)
                });

                let outcome = match tokio::time::timeout(limit, work).await {
                    Ok(Ok(Ok(result))) => Ok(result),
                    Ok(Ok(Err(e))) => Err(ViewFailure::from(e)),
                    Ok(Err(join_error)) => Err(ViewFailure::Panicked {
                        message: join_error.to_string(),
                    }),
                    Err(_) => {
                        token.cancel();
                        Err(ViewFailure::timed_out(started.elapsed()))
                    }
                };
                (outcome, started.elapsed())
            })));
        }

        let abort_handles: Vec<_> = tasks
            .iter()
            .flatten()
            .map(|task| task.abort_handle())
            .collect();

        let collect = async {
            let mut outcomes = Vec::with_capacity(tasks.len());
            for task in tasks {
                let outcome = match task {
                    Some(task) => match task.await {
                        Ok(outcome) => outcome,
                        Err(join_error) => (
                            Err(ViewFailure::Panicked {
                                message: join_error.to_string(),
                            }),
                            Duration::ZERO,
                        ),
                    },
                    None => (
                        Err(ViewFailure::Error {
                            message: "no handler registered".to_string(),
                        }),
                        Duration::ZERO,
                    ),
                };
                outcomes.push(outcome);
            }
            outcomes
        };

        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                for token in &view_tokens {
                    token.cancel();
                }
                for handle in &abort_handles {
                    handle.abort();
                }
                tracing::info!(repo = %request.params.repo, "Composite query cancelled");
                return Err(LedgerError::Cancelled);
            }
            outcomes = collect => outcomes,
        };

        let mut sections = Vec::with_capacity(views.len());
        let mut failures = Vec::new();

        for (kind, (outcome, elapsed)) in views.iter().copied().zip(outcomes) {
            let outcome = match outcome {
                Ok(result) => SectionOutcome::Success { result },
                Err(failure) => {
                    tracing::warn!(view = %kind, error = %failure, "View failed");
                    let error = PartialResultError::new(kind, failure);
                    failures.push(error.clone());
                    SectionOutcome::Failed { error }
                }
            };
            sections.push(ViewSection {
                view: kind,
                elapsed_ms: elapsed.as_millis() as u64,
                outcome,
            });
        }

        if failures.len() == sections.len() {
            return Err(LedgerError::AllViewsFailed { failures });
        }

        let evidence = merge_evidence(sections.iter().filter_map(|s| s.result()));

        tracing::info!(
            repo = %request.params.repo,
            succeeded = sections.len() - failures.len(),
            failed = failures.len(),
            evidence = evidence.len(),
            "Composite query complete"
        );

        Ok(CompositeResponse {
            status: if failures.is_empty() {
                CompositeStatus::Success
            } else {
                CompositeStatus::Partial
            },
            repo: request.params.repo.clone(),
            views: sections,
            evidence,
            failures,
        })
    }
}

/// Keep the first occurrence of each view, in request order
fn dedupe(views: &[ViewKind]) -> Vec<ViewKind> {
    let mut unique = Vec::with_capacity(views.len());
    for &view in views {
        if !unique.contains(&view) {
            unique.push(view);
        }
    }
    unique
}
