//! Port for the durable, append-only work queues.
//!
//! Implementations must commit `append` before returning and must return
//! snapshots in ascending [`SequenceKey`] order. Abandoned rows are excluded
//! from snapshots and counts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::define_port_error;
use crate::domain::records::{QueueKind, QueuedRecord, SequenceKey, StoredEntry};

define_port_error! {
    /// Errors raised by queue storage adapters.
    pub enum QueueStoreError {
        /// Database could not be opened or reached.
        Connection => "queue store connection failed",
        /// A write transaction aborted (quota, constraint, disk).
        Write => "queue store write failed",
        /// A read or bookkeeping statement failed.
        Query => "queue store query failed",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist `record` in its queue and return the assigned key.
    async fn append(&self, record: &QueuedRecord) -> Result<SequenceKey, QueueStoreError>;

    /// Read every live entry of `kind`, oldest first.
    async fn snapshot(&self, kind: QueueKind) -> Result<Vec<StoredEntry>, QueueStoreError>;

    /// Remove one entry. Deleting a missing key succeeds.
    async fn delete(&self, kind: QueueKind, key: SequenceKey) -> Result<(), QueueStoreError>;

    /// Number of live entries in `kind`.
    async fn pending_count(&self, kind: QueueKind) -> Result<u64, QueueStoreError>;

    /// Bump the rejection counter and return its new value; `0` when the row
    /// no longer exists.
    async fn record_rejection(
        &self,
        kind: QueueKind,
        key: SequenceKey,
    ) -> Result<u32, QueueStoreError>;

    /// Mark an entry abandoned so later snapshots skip it.
    async fn abandon(
        &self,
        kind: QueueKind,
        key: SequenceKey,
        at: DateTime<Utc>,
    ) -> Result<(), QueueStoreError>;
}
