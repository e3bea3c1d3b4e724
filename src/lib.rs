//! Commit quality ledger
//!
//! Stores per-commit audit records pulled from a commit source, keeps a
//! resumable sync cursor per repository, learns review patterns, team
//! standards and author preferences from what it stores, and answers
//! trend, root-cause, author and pattern queries over that history.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod query;
pub mod scoring;
pub mod source;
pub mod store;
pub mod sync;

pub use cancel::CancellationToken;
pub use error::{LedgerError, PartialResultError, Result, SourceError, ViewFailure};
