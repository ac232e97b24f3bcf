//! PEcoin Persistence - TTL cache primitive and the SQLite entity store

pub mod cache;
pub mod sqlite;

pub use cache::{CacheStats, ManagedCache, TtlCache};
pub use sqlite::Database;
