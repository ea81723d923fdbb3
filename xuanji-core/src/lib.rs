//! Xuanji Core Library
//!
//! Local-first data layer: an SQLite store, an LRU/TTL cache, typed
//! cache-aside repositories, and a sync engine for the remote service.

pub mod cache;
pub mod changelog;
pub mod config;
pub mod models;
pub mod repository;
pub mod store;
pub mod sync;

pub use cache::{CacheConfig, CacheKey, CacheLayer, CacheStats};
pub use changelog::{ChangeStatus, ChangeType, PendingChange};
pub use config::{ConflictPolicy, SyncSettings};
pub use models::{DivinationCase, DivinationMethod, Hexagram, Setting, Trigram};
pub use repository::{Entity, EntityId, Filter, PageRequest, PagedResult, Repository};
pub use store::{MappingError, Row, Select, Store, StoreError, StoreTx, Value};
pub use sync::{
    AutoSync, RemoteClient, SemVer, SyncEngine, SyncError, SyncKind, SyncPhase, SyncResult,
    SyncStats, SyncStatus, SyncTables,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
