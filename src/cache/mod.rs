//! Result caching
//!
//! Two tiers: a process-local map for hot entries and an optional shared
//! SQLite store that survives restarts and serves sibling processes.

mod result_cache;
mod sqlite;
mod store;

pub use result_cache::*;
pub use sqlite::*;
pub use store::*;
