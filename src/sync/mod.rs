//! Bootstrap and incremental sync of commit history into the ledger

mod controller;
mod guard;

pub use controller::{BootstrapReport, SyncController, SyncReport, SyncStatus, reset_cursor};
pub use guard::is_claimed;
