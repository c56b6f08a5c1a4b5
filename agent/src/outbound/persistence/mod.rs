//! SQLite persistence adapters using Diesel.
//!
//! One database file holds both durable queues, the response cache and the
//! active-version record. The adapters share a single [`SqliteStore`]
//! connection and only translate between Diesel rows (`models.rs`,
//! `schema.rs`) and domain types.
//!
//! # Example
//!
//! ```ignore
//! use offline_agent::outbound::persistence::{SqliteQueueStore, SqliteStore, StoreConfig};
//!
//! let store = SqliteStore::open(StoreConfig::new("offline-agent.db")).await?;
//! let queue = SqliteQueueStore::new(store.clone());
//! ```

mod connection;
mod error_mapping;
mod models;
mod schema;
mod sqlite_queue_store;
mod sqlite_response_cache;
mod sqlite_version_ledger;

pub use connection::{
    DEFAULT_BUSY_TIMEOUT, DEFAULT_SCHEMA_VERSION, SqliteStore, StoreConfig, StoreOpenError,
};
pub use sqlite_queue_store::SqliteQueueStore;
pub use sqlite_response_cache::SqliteResponseCache;
pub use sqlite_version_ledger::SqliteVersionLedger;
