//! View handlers dispatched by the orchestrator

use super::{ViewKind, ViewResult};
use crate::cancel::CancellationToken;
use crate::config::{MemoryPolicy, QuerySettings};
use crate::error::Result;
use crate::query::{QueryEngine, QueryParams};
use crate::store::Database;

/// What every view needs to run: where the data lives and how to read it
#[derive(Debug, Clone)]
pub struct ViewContext {
    pub db: Database,
    pub settings: QuerySettings,
    pub policy: MemoryPolicy,
}

/// One analytical view, run on a blocking worker thread
///
/// Implementations must acquire their own store handle and should poll
/// `cancel` between expensive steps.
pub trait ViewHandler: Send + Sync {
    fn kind(&self) -> ViewKind;

    fn run(
        &self,
        ctx: &ViewContext,
        params: &QueryParams,
        cancel: &CancellationToken,
    ) -> Result<ViewResult>;
}

/// Default handler backed by the query engine
#[derive(Debug, Clone, Copy)]
pub struct EngineView {
    kind: ViewKind,
}

impl EngineView {
    pub fn new(kind: ViewKind) -> Self {
        Self { kind }
    }
}

impl ViewHandler for EngineView {
    fn kind(&self) -> ViewKind {
        self.kind
    }

    fn run(
        &self,
        ctx: &ViewContext,
        params: &QueryParams,
        cancel: &CancellationToken,
    ) -> Result<ViewResult> {
        cancel.check()?;
        let handle = ctx.db.connect()?;
        let engine = QueryEngine::new(&handle, &ctx.settings, &ctx.policy)
            .with_cancellation(cancel.clone());

        let result = match self.kind {
            ViewKind::Trend => ViewResult::Trend(engine.trend(params)?),
            ViewKind::RootCause => ViewResult::RootCause(engine.root_cause(params)?),
            ViewKind::Authors => ViewResult::Authors(engine.authors(params)?),
            ViewKind::Patterns => ViewResult::Patterns(engine.patterns(params)?),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::query::fixtures::{degrading_history, seeded};

    #[test]
    fn test_engine_view_dispatches_by_kind() {
        let (_dir, db, _handle) = seeded(&degrading_history());
        let ctx = ViewContext {
            db,
            settings: QuerySettings::default(),
            policy: MemoryPolicy::default(),
        };
        let token = CancellationToken::new();

        for kind in ViewKind::ALL {
            let result = EngineView::new(kind)
                .run(&ctx, &QueryParams::new("acme/api"), &token)
                .unwrap();
            assert_eq!(result.kind(), kind);
        }
    }

    #[test]
    fn test_engine_view_honours_cancellation() {
        let (_dir, db, _handle) = seeded(&degrading_history());
        let ctx = ViewContext {
            db,
            settings: QuerySettings::default(),
            policy: MemoryPolicy::default(),
        };
        let token = CancellationToken::new();
        token.cancel();

        let err = EngineView::new(ViewKind::Trend)
            .run(&ctx, &QueryParams::new("acme/api"), &token)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Cancelled));
    }
}
