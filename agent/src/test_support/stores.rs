//! In-memory port implementations with failure injection.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::lock;
use crate::domain::ports::{
    CacheNamespace, CachedResponse, DeferredSyncScheduler, QueueStore, QueueStoreError,
    ResponseCache, ResponseCacheError, SyncRegistrationError, VersionLedger, VersionLedgerError,
};
use crate::domain::records::{QueueKind, QueuedRecord, SequenceKey, StoredEntry, SyncTag};

enum Row {
    Record(QueuedRecord),
    Corrupt(String),
}

struct QueueRow {
    row: Row,
    failed_attempts: u32,
    abandoned_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct QueueState {
    last_key: i64,
    rows: BTreeMap<(QueueKind, i64), QueueRow>,
}

impl QueueState {
    fn insert(&mut self, kind: QueueKind, row: Row) -> SequenceKey {
        self.last_key += 1;
        self.rows.insert(
            (kind, self.last_key),
            QueueRow {
                row,
                failed_attempts: 0,
                abandoned_at: None,
            },
        );
        SequenceKey::new(self.last_key)
    }

    fn live(&self, kind: QueueKind) -> impl Iterator<Item = (&i64, &QueueRow)> {
        self.rows
            .range((kind, i64::MIN)..=(kind, i64::MAX))
            .filter(|(_, row)| row.abandoned_at.is_none())
            .map(|((_, key), row)| (key, row))
    }
}

/// Queue store keeping rows in a `BTreeMap`, keyed like the SQLite adapter.
#[derive(Default)]
pub struct InMemoryQueueStore {
    state: Mutex<QueueState>,
    fail_appends: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryQueueStore {
    /// Insert a row that will surface as [`StoredEntry::Corrupt`].
    pub fn insert_corrupt(&self, kind: QueueKind, reason: &str) -> SequenceKey {
        lock(&self.state).insert(kind, Row::Corrupt(reason.to_owned()))
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Keys of live rows, oldest first.
    pub fn live_keys(&self, kind: QueueKind) -> Vec<SequenceKey> {
        lock(&self.state)
            .live(kind)
            .map(|(key, _)| SequenceKey::new(*key))
            .collect()
    }

    pub fn abandoned_count(&self, kind: QueueKind) -> usize {
        lock(&self.state)
            .rows
            .iter()
            .filter(|((row_kind, _), row)| *row_kind == kind && row.abandoned_at.is_some())
            .count()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn append(&self, record: &QueuedRecord) -> Result<SequenceKey, QueueStoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(QueueStoreError::write("quota exceeded"));
        }
        Ok(lock(&self.state).insert(record.kind(), Row::Record(record.clone())))
    }

    async fn snapshot(&self, kind: QueueKind) -> Result<Vec<StoredEntry>, QueueStoreError> {
        Ok(lock(&self.state)
            .live(kind)
            .map(|(key, row)| {
                let key = SequenceKey::new(*key);
                match &row.row {
                    Row::Record(record) => StoredEntry::Valid {
                        key,
                        record: record.clone(),
                    },
                    Row::Corrupt(reason) => StoredEntry::Corrupt {
                        key,
                        reason: reason.clone(),
                    },
                }
            })
            .collect())
    }

    async fn delete(&self, kind: QueueKind, key: SequenceKey) -> Result<(), QueueStoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(QueueStoreError::write("database is locked"));
        }
        lock(&self.state).rows.remove(&(kind, key.get()));
        Ok(())
    }

    async fn pending_count(&self, kind: QueueKind) -> Result<u64, QueueStoreError> {
        let count = lock(&self.state).live(kind).count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn record_rejection(
        &self,
        kind: QueueKind,
        key: SequenceKey,
    ) -> Result<u32, QueueStoreError> {
        let mut state = lock(&self.state);
        Ok(state.rows.get_mut(&(kind, key.get())).map_or(0, |row| {
            row.failed_attempts += 1;
            row.failed_attempts
        }))
    }

    async fn abandon(
        &self,
        kind: QueueKind,
        key: SequenceKey,
        at: DateTime<Utc>,
    ) -> Result<(), QueueStoreError> {
        if let Some(row) = lock(&self.state).rows.get_mut(&(kind, key.get())) {
            row.abandoned_at = Some(at);
        }
        Ok(())
    }
}

/// Response cache over a `BTreeMap`.
#[derive(Default)]
pub struct InMemoryResponseCache {
    entries: Mutex<BTreeMap<(CacheNamespace, String), CachedResponse>>,
}

impl InMemoryResponseCache {
    /// Seed an entry directly.
    pub fn insert(&self, namespace: &CacheNamespace, url: &str, response: CachedResponse) {
        lock(&self.entries).insert((namespace.clone(), url.to_owned()), response);
    }

    /// URLs stored under `namespace`.
    pub fn urls(&self, namespace: &CacheNamespace) -> Vec<String> {
        lock(&self.entries)
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, url)| url.clone())
            .collect()
    }
}

#[async_trait]
impl ResponseCache for InMemoryResponseCache {
    async fn get(
        &self,
        namespace: &CacheNamespace,
        url: &str,
    ) -> Result<Option<CachedResponse>, ResponseCacheError> {
        Ok(lock(&self.entries)
            .get(&(namespace.clone(), url.to_owned()))
            .cloned())
    }

    async fn put(
        &self,
        namespace: &CacheNamespace,
        url: &str,
        response: &CachedResponse,
    ) -> Result<(), ResponseCacheError> {
        self.insert(namespace, url, response.clone());
        Ok(())
    }

    async fn namespaces(&self) -> Result<Vec<CacheNamespace>, ResponseCacheError> {
        let mut names: Vec<CacheNamespace> =
            lock(&self.entries).keys().map(|(ns, _)| ns.clone()).collect();
        names.dedup();
        Ok(names)
    }

    async fn purge(&self, namespace: &CacheNamespace) -> Result<u64, ResponseCacheError> {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(ns, _), _| ns != namespace);
        Ok(u64::try_from(before - entries.len()).unwrap_or(u64::MAX))
    }
}

/// Version ledger holding one optional value.
#[derive(Default)]
pub struct InMemoryVersionLedger(Mutex<Option<String>>);

impl InMemoryVersionLedger {
    pub fn with_version(version: &str) -> Self {
        Self(Mutex::new(Some(version.to_owned())))
    }
}

#[async_trait]
impl VersionLedger for InMemoryVersionLedger {
    async fn active_version(&self) -> Result<Option<String>, VersionLedgerError> {
        Ok(lock(&self.0).clone())
    }

    async fn record_active_version(&self, version: &str) -> Result<(), VersionLedgerError> {
        *lock(&self.0) = Some(version.to_owned());
        Ok(())
    }
}

/// Scheduler that remembers every registration and hands out tags marked due.
#[derive(Default)]
pub struct RecordingScheduler {
    registered: Mutex<Vec<SyncTag>>,
    due: Mutex<Vec<SyncTag>>,
}

impl RecordingScheduler {
    /// Every `register` call so far, in order.
    pub fn registered(&self) -> Vec<SyncTag> {
        lock(&self.registered).clone()
    }

    /// Make `tag` due on the next `take_due`.
    pub fn fire(&self, tag: SyncTag) {
        lock(&self.due).push(tag);
    }
}

#[async_trait]
impl DeferredSyncScheduler for RecordingScheduler {
    async fn register(&self, tag: SyncTag) -> Result<(), SyncRegistrationError> {
        lock(&self.registered).push(tag);
        Ok(())
    }

    async fn take_due(&self) -> Vec<SyncTag> {
        std::mem::take(&mut *lock(&self.due))
    }
}
