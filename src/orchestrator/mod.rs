//! Composite queries: fan out to several views, merge their evidence
//!
//! A request names an already-resolved set of views plus one shared
//! [`QueryParams`]. Views run concurrently, each under its own timeout; a
//! view that fails or times out becomes a [`PartialResultError`] in the
//! response instead of failing the whole request.
//!
//! [`PartialResultError`]: crate::error::PartialResultError

mod composite;
mod handler;
mod merge;

pub use composite::{
    CompositeRequest, CompositeResponse, CompositeStatus, Orchestrator, SectionOutcome,
    ViewSection,
};
pub use handler::{EngineView, ViewContext, ViewHandler};
pub use merge::{MergedEvidence, merge_evidence};

use crate::error::LedgerError;
use crate::query::{AuthorsResult, PatternsResult, RootCauseResult, TrendResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Analytical views a composite request can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Trend,
    RootCause,
    Authors,
    Patterns,
}

impl ViewKind {
    pub const ALL: [ViewKind; 4] = [
        ViewKind::Trend,
        ViewKind::RootCause,
        ViewKind::Authors,
        ViewKind::Patterns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Trend => "trend",
            ViewKind::RootCause => "root_cause",
            ViewKind::Authors => "authors",
            ViewKind::Patterns => "patterns",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "trend" | "trends" => Ok(ViewKind::Trend),
            "root_cause" | "rootcause" => Ok(ViewKind::RootCause),
            "authors" | "author" => Ok(ViewKind::Authors),
            "patterns" | "pattern" => Ok(ViewKind::Patterns),
            other => Err(LedgerError::invalid(format!("unknown view '{}'", other))),
        }
    }
}

/// Typed output of one view
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewResult {
    Trend(TrendResult),
    RootCause(RootCauseResult),
    Authors(AuthorsResult),
    Patterns(PatternsResult),
}

impl ViewResult {
    pub fn kind(&self) -> ViewKind {
        match self {
            ViewResult::Trend(_) => ViewKind::Trend,
            ViewResult::RootCause(_) => ViewKind::RootCause,
            ViewResult::Authors(_) => ViewKind::Authors,
            ViewResult::Patterns(_) => ViewKind::Patterns,
        }
    }

    /// Commit SHAs this view drew from, in the view's own order
    pub fn evidence(&self) -> &[String] {
        match self {
            ViewResult::Trend(r) => &r.evidence,
            ViewResult::RootCause(r) => &r.evidence,
            ViewResult::Authors(r) => &r.evidence,
            ViewResult::Patterns(r) => &r.evidence,
        }
    }
}
