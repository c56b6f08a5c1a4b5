//! Records persisted in the durable queues.
//!
//! A record is immutable once appended. The store owns it until the replay
//! engine deletes it by [`SequenceKey`] after a successful re-issue.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use url::Url;

/// Header snapshot stored with a record, keyed by lower-cased header name.
pub type HeaderSnapshot = BTreeMap<String, String>;

/// HTTP verbs eligible for durable queuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl MutationMethod {
    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Parse a verb case-insensitively; `None` for non-mutating verbs.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        [Self::Post, Self::Put, Self::Patch, Self::Delete]
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for MutationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque store-assigned key. Strictly increasing within one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceKey(i64);

impl SequenceKey {
    /// Wrap a raw key read back from the store.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deferred-sync tags registered after every enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyncTag {
    Api,
    Photos,
}

impl SyncTag {
    /// Every tag, in registration order.
    pub const ALL: [Self; 2] = [Self::Api, Self::Photos];

    /// Wire name of the tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Api => "sync-api",
            Self::Photos => "sync-photos",
        }
    }

    /// Queue drained when this tag fires.
    #[must_use]
    pub const fn queue_kind(self) -> QueueKind {
        match self {
            Self::Api => QueueKind::Mutation,
            Self::Photos => QueueKind::Photo,
        }
    }
}

impl fmt::Display for SyncTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two durable queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueKind {
    Mutation,
    Photo,
}

impl QueueKind {
    /// Both queues; drains visit them in this order.
    pub const ALL: [Self; 2] = [Self::Mutation, Self::Photo];

    /// Namespace name used in logs, metrics and status payloads.
    #[must_use]
    pub const fn namespace(self) -> &'static str {
        match self {
            Self::Mutation => "api-queue",
            Self::Photo => "photo-queue",
        }
    }

    /// Tag that schedules a deferred drain of this queue.
    #[must_use]
    pub const fn sync_tag(self) -> SyncTag {
        match self {
            Self::Mutation => SyncTag::Api,
            Self::Photo => SyncTag::Photos,
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Payload of a queued mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationBody {
    /// Replayed verbatim with the stored `content-type` header.
    Text(String),
    /// `multipart/form-data` text. The boundary-bearing `content-type` is not
    /// stored; replay derives it from the body's first delimiter line.
    Multipart(String),
}

impl MutationBody {
    /// Stored text regardless of variant.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(text) | Self::Multipart(text) => text,
        }
    }
}

/// Mutation captured at the moment connectivity failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub url: Url,
    pub method: MutationMethod,
    pub headers: HeaderSnapshot,
    pub body: Option<MutationBody>,
}

/// Binary photo upload waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRecord {
    pub file: Vec<u8>,
    pub name: String,
    pub content_type: String,
    pub url: Url,
    pub headers: HeaderSnapshot,
    pub created_at: DateTime<Utc>,
    pub caption: Option<String>,
}

/// A record of either queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedRecord {
    Mutation(QueueRecord),
    Photo(PhotoRecord),
}

impl QueuedRecord {
    /// Queue the record belongs to.
    #[must_use]
    pub const fn kind(&self) -> QueueKind {
        match self {
            Self::Mutation(_) => QueueKind::Mutation,
            Self::Photo(_) => QueueKind::Photo,
        }
    }

    /// Target URL of the eventual replay.
    #[must_use]
    pub const fn url(&self) -> &Url {
        match self {
            Self::Mutation(record) => &record.url,
            Self::Photo(record) => &record.url,
        }
    }
}

/// Entry read back from a queue snapshot.
///
/// Rows that no longer decode into a record (legacy schema, hand-edited
/// database, missing URL) are surfaced as `Corrupt` so replay can discard them
/// instead of halting on them forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredEntry {
    Valid { key: SequenceKey, record: QueuedRecord },
    Corrupt { key: SequenceKey, reason: String },
}

impl StoredEntry {
    /// Key of the underlying row.
    #[must_use]
    pub const fn key(&self) -> SequenceKey {
        match self {
            Self::Valid { key, .. } | Self::Corrupt { key, .. } => *key,
        }
    }
}
