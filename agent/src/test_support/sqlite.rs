//! Throwaway SQLite databases.

use tempfile::TempDir;

use crate::outbound::persistence::{
    SqliteQueueStore, SqliteResponseCache, SqliteStore, SqliteVersionLedger, StoreConfig,
};

/// Opened store whose file is deleted when this value drops.
pub struct TempSqliteStore {
    dir: TempDir,
    store: SqliteStore,
}

impl TempSqliteStore {
    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    /// Config pointing at the same file, for reopening.
    pub fn config(&self) -> StoreConfig {
        StoreConfig::new(self.dir.path().join("agent.db"))
    }

    pub fn queue_store(&self) -> SqliteQueueStore {
        SqliteQueueStore::new(self.store.clone())
    }

    pub fn response_cache(&self) -> SqliteResponseCache {
        SqliteResponseCache::new(self.store.clone())
    }

    pub fn version_ledger(&self) -> SqliteVersionLedger {
        SqliteVersionLedger::new(self.store.clone())
    }
}

/// Open a fresh database in a temporary directory.
///
/// # Panics
///
/// Panics when the directory or database cannot be created.
pub async fn temp_sqlite_store() -> TempSqliteStore {
    let dir = match TempDir::new() {
        Ok(dir) => dir,
        Err(error) => panic!("create temp dir: {error}"),
    };
    let store = match SqliteStore::open(StoreConfig::new(dir.path().join("agent.db"))).await {
        Ok(store) => store,
        Err(error) => panic!("open temp database: {error}"),
    };
    TempSqliteStore { dir, store }
}
