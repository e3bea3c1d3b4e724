//! Configuration types and loading for the ledger

mod loader;
mod memory;
mod query;

pub use loader::{LedgerConfig, StorageConfig};
pub use memory::MemoryPolicy;
pub use query::QuerySettings;
