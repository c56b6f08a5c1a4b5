//! SQLite-backed `QueueStore`.
//!
//! Each queue kind has its own table. Rows that no longer decode into a
//! record are returned as [`StoredEntry::Corrupt`] instead of failing the
//! snapshot, so replay can discard them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use mockable::DefaultClock;
use url::Url;

use super::connection::SqliteStore;
use super::error_mapping::map_diesel_error;
use super::models::{ApiQueueRow, NewApiQueueRow, NewPhotoQueueRow, PhotoQueueRow};
use super::schema::{api_queue, photo_queue};
use crate::domain::SharedClock;
use crate::domain::ports::{QueueStore, QueueStoreError};
use crate::domain::records::{
    HeaderSnapshot, MutationBody, MutationMethod, PhotoRecord, QueueKind, QueueRecord,
    QueuedRecord, SequenceKey, StoredEntry,
};

const TEXT_BODY: &str = "text";
const MULTIPART_BODY: &str = "multipart";

/// Queue store over the shared SQLite connection.
#[derive(Clone)]
pub struct SqliteQueueStore {
    store: SqliteStore,
    clock: SharedClock,
}

impl SqliteQueueStore {
    /// Queue store stamping rows with the system clock.
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store,
            clock: Arc::new(DefaultClock),
        }
    }

    /// Stamp `enqueued_at` from `clock` instead.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

fn map_write_error(error: diesel::result::Error) -> QueueStoreError {
    map_diesel_error(error, QueueStoreError::write, QueueStoreError::connection)
}

fn map_query_error(error: diesel::result::Error) -> QueueStoreError {
    map_diesel_error(error, QueueStoreError::query, QueueStoreError::connection)
}

fn encode_headers(headers: &HeaderSnapshot) -> Result<String, QueueStoreError> {
    serde_json::to_string(headers)
        .map_err(|err| QueueStoreError::write(format!("serialise headers: {err}")))
}

fn decode_headers(raw: &str) -> Result<HeaderSnapshot, String> {
    serde_json::from_str(raw).map_err(|err| format!("corrupt header json: {err}"))
}

fn decode_url(raw: &str) -> Result<Url, String> {
    Url::parse(raw).map_err(|err| format!("invalid url `{raw}`: {err}"))
}

fn mutation_record(row: ApiQueueRow) -> Result<QueueRecord, String> {
    let url = decode_url(&row.url)?;
    let method = MutationMethod::parse(&row.method)
        .ok_or_else(|| format!("unknown method `{}`", row.method))?;
    let headers = decode_headers(&row.headers)?;
    let body = match (row.body, row.body_kind.as_str()) {
        (None, _) => None,
        (Some(text), TEXT_BODY) => Some(MutationBody::Text(text)),
        (Some(text), MULTIPART_BODY) => Some(MutationBody::Multipart(text)),
        (Some(_), other) => return Err(format!("unknown body kind `{other}`")),
    };
    Ok(QueueRecord {
        url,
        method,
        headers,
        body,
    })
}

fn photo_record(row: PhotoQueueRow) -> Result<PhotoRecord, String> {
    let url = decode_url(&row.url)?;
    let headers = decode_headers(&row.headers)?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map_err(|err| format!("invalid created_at `{}`: {err}", row.created_at))?
        .with_timezone(&Utc);
    if row.name.is_empty() {
        return Err("photo has no file name".to_owned());
    }
    Ok(PhotoRecord {
        file: row.file,
        name: row.name,
        content_type: row.content_type,
        url,
        headers,
        created_at,
        caption: row.caption,
    })
}

fn decode_mutation(row: ApiQueueRow) -> StoredEntry {
    let key = SequenceKey::new(row.seq);
    match mutation_record(row) {
        Ok(record) => StoredEntry::Valid {
            key,
            record: QueuedRecord::Mutation(record),
        },
        Err(reason) => StoredEntry::Corrupt { key, reason },
    }
}

fn decode_photo(row: PhotoQueueRow) -> StoredEntry {
    let key = SequenceKey::new(row.seq);
    match photo_record(row) {
        Ok(record) => StoredEntry::Valid {
            key,
            record: QueuedRecord::Photo(record),
        },
        Err(reason) => StoredEntry::Corrupt { key, reason },
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn append(&self, record: &QueuedRecord) -> Result<SequenceKey, QueueStoreError> {
        let mut conn = self.store.connection().await;
        let seq = match record {
            QueuedRecord::Mutation(record) => {
                let (body, body_kind) = match &record.body {
                    None => (None, TEXT_BODY),
                    Some(MutationBody::Text(text)) => (Some(text.as_str()), TEXT_BODY),
                    Some(MutationBody::Multipart(text)) => (Some(text.as_str()), MULTIPART_BODY),
                };
                let row = NewApiQueueRow {
                    url: record.url.as_str(),
                    method: record.method.as_str(),
                    headers: encode_headers(&record.headers)?,
                    body,
                    body_kind,
                    enqueued_at: self.clock.utc().to_rfc3339(),
                };
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    async move {
                        diesel::insert_into(api_queue::table)
                            .values(&row)
                            .returning(api_queue::seq)
                            .get_result::<i64>(conn)
                            .await
                    }
                    .scope_boxed()
                })
                .await
                .map_err(map_write_error)?
            }
            QueuedRecord::Photo(record) => {
                let row = NewPhotoQueueRow {
                    url: record.url.as_str(),
                    file: &record.file,
                    name: &record.name,
                    content_type: &record.content_type,
                    headers: encode_headers(&record.headers)?,
                    caption: record.caption.as_deref(),
                    created_at: record.created_at.to_rfc3339(),
                };
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    async move {
                        diesel::insert_into(photo_queue::table)
                            .values(&row)
                            .returning(photo_queue::seq)
                            .get_result::<i64>(conn)
                            .await
                    }
                    .scope_boxed()
                })
                .await
                .map_err(map_write_error)?
            }
        };
        Ok(SequenceKey::new(seq))
    }

    async fn snapshot(&self, kind: QueueKind) -> Result<Vec<StoredEntry>, QueueStoreError> {
        let mut conn = self.store.connection().await;
        match kind {
            QueueKind::Mutation => {
                let rows: Vec<ApiQueueRow> = api_queue::table
                    .filter(api_queue::abandoned_at.is_null())
                    .order(api_queue::seq.asc())
                    .select(ApiQueueRow::as_select())
                    .load(&mut *conn)
                    .await
                    .map_err(map_query_error)?;
                Ok(rows.into_iter().map(decode_mutation).collect())
            }
            QueueKind::Photo => {
                let rows: Vec<PhotoQueueRow> = photo_queue::table
                    .filter(photo_queue::abandoned_at.is_null())
                    .order(photo_queue::seq.asc())
                    .select(PhotoQueueRow::as_select())
                    .load(&mut *conn)
                    .await
                    .map_err(map_query_error)?;
                Ok(rows.into_iter().map(decode_photo).collect())
            }
        }
    }

    async fn delete(&self, kind: QueueKind, key: SequenceKey) -> Result<(), QueueStoreError> {
        let mut conn = self.store.connection().await;
        let seq = key.get();
        let deleted = match kind {
            QueueKind::Mutation => {
                diesel::delete(api_queue::table.filter(api_queue::seq.eq(seq)))
                    .execute(&mut *conn)
                    .await
            }
            QueueKind::Photo => {
                diesel::delete(photo_queue::table.filter(photo_queue::seq.eq(seq)))
                    .execute(&mut *conn)
                    .await
            }
        };
        deleted.map(drop).map_err(map_write_error)
    }

    async fn pending_count(&self, kind: QueueKind) -> Result<u64, QueueStoreError> {
        let mut conn = self.store.connection().await;
        let count: i64 = match kind {
            QueueKind::Mutation => {
                api_queue::table
                    .filter(api_queue::abandoned_at.is_null())
                    .count()
                    .get_result(&mut *conn)
                    .await
            }
            QueueKind::Photo => {
                photo_queue::table
                    .filter(photo_queue::abandoned_at.is_null())
                    .count()
                    .get_result(&mut *conn)
                    .await
            }
        }
        .map_err(map_query_error)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn record_rejection(
        &self,
        kind: QueueKind,
        key: SequenceKey,
    ) -> Result<u32, QueueStoreError> {
        let mut conn = self.store.connection().await;
        let seq = key.get();
        let attempts: Option<i32> = match kind {
            QueueKind::Mutation => {
                diesel::update(api_queue::table.filter(api_queue::seq.eq(seq)))
                    .set(api_queue::failed_attempts.eq(api_queue::failed_attempts + 1))
                    .returning(api_queue::failed_attempts)
                    .get_result(&mut *conn)
                    .await
            }
            QueueKind::Photo => {
                diesel::update(photo_queue::table.filter(photo_queue::seq.eq(seq)))
                    .set(photo_queue::failed_attempts.eq(photo_queue::failed_attempts + 1))
                    .returning(photo_queue::failed_attempts)
                    .get_result(&mut *conn)
                    .await
            }
        }
        .optional()
        .map_err(map_write_error)?;
        Ok(attempts.and_then(|value| u32::try_from(value).ok()).unwrap_or_default())
    }

    async fn abandon(
        &self,
        kind: QueueKind,
        key: SequenceKey,
        at: DateTime<Utc>,
    ) -> Result<(), QueueStoreError> {
        let mut conn = self.store.connection().await;
        let seq = key.get();
        let stamp = Some(at.to_rfc3339());
        let updated = match kind {
            QueueKind::Mutation => {
                diesel::update(api_queue::table.filter(api_queue::seq.eq(seq)))
                    .set(api_queue::abandoned_at.eq(stamp))
                    .execute(&mut *conn)
                    .await
            }
            QueueKind::Photo => {
                diesel::update(photo_queue::table.filter(photo_queue::seq.eq(seq)))
                    .set(photo_queue::abandoned_at.eq(stamp))
                    .execute(&mut *conn)
                    .await
            }
        };
        updated.map(drop).map_err(map_write_error)
    }
}
