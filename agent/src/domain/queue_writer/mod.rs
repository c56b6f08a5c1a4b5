//! Serializes failed mutations and photo uploads into durable records.
//!
//! Enqueueing happens in two phases. The record is first fully materialized
//! in memory; only then is it appended in a single write transaction. Nothing
//! is acknowledged to the caller until that transaction has committed.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::domain::SharedClock;
use crate::domain::http::{AgentResponse, InterceptedRequest, is_transport_managed};
use crate::domain::ports::{
    DeferredSyncScheduler, QueueStore, QueueStoreError, ReplayMetrics, ReplayOutcome,
};
use crate::domain::records::{
    HeaderSnapshot, MutationBody, MutationMethod, PhotoRecord, QueueKind, QueueRecord,
    QueuedRecord, SequenceKey, SyncTag,
};

/// Header stamped on queued mutations so the backend can deduplicate replays.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
/// Header marking a queued acknowledgement.
pub const QUEUED_HEADER: &str = "x-offline-queued";

const MULTIPART_FORM: &str = "multipart/form-data";

/// Failures that mean the action was NOT saved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// The request cannot be represented as a durable record.
    #[error("request cannot be queued: {0}")]
    Unserializable(String),
    /// The store rejected the write.
    #[error("queue storage failed: {0}")]
    Storage(#[from] QueueStoreError),
}

impl EnqueueError {
    /// Response telling the application its action was not saved.
    #[must_use]
    pub fn into_response(self) -> AgentResponse {
        let (status, code) = match &self {
            Self::Unserializable(_) => (422, "not_queueable"),
            Self::Storage(_) => (507, "storage_failed"),
        };
        AgentResponse::json(
            status,
            &json!({
                "code": code,
                "message": self.to_string(),
                "queued": false,
            }),
        )
    }
}

/// Confirmation that a record committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedAck {
    pub kind: QueueKind,
    pub key: SequenceKey,
}

impl QueuedAck {
    /// `200` JSON acknowledgement, distinguishable from an upstream success
    /// by its body and the [`QUEUED_HEADER`] header.
    #[must_use]
    pub fn into_response(self) -> AgentResponse {
        AgentResponse::json(
            200,
            &json!({ "queued": true, "offline": true, "key": self.key.get() }),
        )
        .with_header(QUEUED_HEADER, "1")
    }
}

/// Photo captured by the application, before it becomes a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file: Vec<u8>,
    pub name: String,
    pub content_type: String,
    pub url: Url,
    pub headers: HeaderSnapshot,
    pub caption: Option<String>,
}

impl PhotoUpload {
    /// Upload bound for `{api_base}audit-items/{id}/photos`.
    ///
    /// # Errors
    ///
    /// Returns a parse error when the endpoint cannot be joined onto
    /// `api_base`.
    pub fn for_audit_item(
        api_base: &Url,
        audit_item_id: u64,
        file: Vec<u8>,
        name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        let url = api_base.join(&format!("audit-items/{audit_item_id}/photos"))?;
        Ok(Self {
            file,
            name: name.into(),
            content_type: content_type.into(),
            url,
            headers: HeaderSnapshot::new(),
            caption: None,
        })
    }

    /// Attach a caption.
    #[must_use]
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Attach a header, stored lower-cased.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}

/// Ports the writer needs.
#[derive(Clone)]
pub struct QueueWriterPorts {
    pub store: Arc<dyn QueueStore>,
    pub scheduler: Arc<dyn DeferredSyncScheduler>,
    pub metrics: Arc<dyn ReplayMetrics>,
}

/// Serializes and commits records, then registers replay intent.
pub struct QueueWriter {
    ports: QueueWriterPorts,
    clock: SharedClock,
    stamp_idempotency_keys: bool,
}

impl QueueWriter {
    /// Create a writer.
    pub fn new(ports: QueueWriterPorts, clock: SharedClock, stamp_idempotency_keys: bool) -> Self {
        Self {
            ports,
            clock,
            stamp_idempotency_keys,
        }
    }

    /// Queue an intercepted mutation.
    ///
    /// # Errors
    ///
    /// [`EnqueueError::Unserializable`] when the request has no durable form;
    /// [`EnqueueError::Storage`] when the append did not commit.
    pub async fn enqueue_mutation(
        &self,
        request: &InterceptedRequest,
    ) -> Result<QueuedAck, EnqueueError> {
        let record = serialize_mutation(request, self.stamp_idempotency_keys)?;
        self.commit(QueuedRecord::Mutation(record)).await
    }

    /// Queue a photo upload, stamping `created_at` from the clock.
    ///
    /// # Errors
    ///
    /// As for [`Self::enqueue_mutation`].
    pub async fn enqueue_photo(&self, upload: PhotoUpload) -> Result<QueuedAck, EnqueueError> {
        let record = serialize_photo(upload, self.clock.utc())?;
        self.commit(QueuedRecord::Photo(record)).await
    }

    async fn commit(&self, record: QueuedRecord) -> Result<QueuedAck, EnqueueError> {
        let kind = record.kind();
        let key = self.ports.store.append(&record).await?;
        info!(queue = %kind, %key, url = %record.url(), "request queued for replay");

        for tag in SyncTag::ALL {
            if let Err(error) = self.ports.scheduler.register(tag).await {
                warn!(%tag, %error, "deferred sync registration failed");
            }
        }
        if let Err(error) = self.ports.metrics.record(kind, ReplayOutcome::Queued).await {
            warn!(%error, "failed to record queue metric");
        }
        Ok(QueuedAck { kind, key })
    }
}

/// Turn an intercepted request into a [`QueueRecord`].
///
/// Header names are lower-cased and transport-managed headers dropped. A
/// multipart body loses its `content-type`, which replay recomputes from the
/// body's boundary line.
///
/// # Errors
///
/// Returns [`EnqueueError::Unserializable`] for a non-mutating verb, a
/// relative or malformed URL, a body that is not UTF-8 text, or a multipart
/// body with no leading boundary line.
pub fn serialize_mutation(
    request: &InterceptedRequest,
    stamp_idempotency_key: bool,
) -> Result<QueueRecord, EnqueueError> {
    let method = MutationMethod::parse(&request.method).ok_or_else(|| {
        EnqueueError::Unserializable(format!("`{}` is not a mutating method", request.method))
    })?;
    let url = Url::parse(&request.url)
        .map_err(|error| EnqueueError::Unserializable(format!("invalid url: {error}")))?;

    let multipart = request
        .header("content-type")
        .is_some_and(|value| value.trim_start().to_ascii_lowercase().starts_with(MULTIPART_FORM));
    let mut headers = snapshot_headers(&request.headers);
    if multipart {
        headers.remove("content-type");
    }
    if stamp_idempotency_key && !headers.contains_key(IDEMPOTENCY_KEY_HEADER) {
        headers.insert(IDEMPOTENCY_KEY_HEADER.to_owned(), Uuid::new_v4().to_string());
    }

    let body = if request.body.is_empty() {
        None
    } else {
        let text = String::from_utf8(request.body.clone()).map_err(|_| {
            EnqueueError::Unserializable("request body is not valid UTF-8 text".to_owned())
        })?;
        if multipart {
            if multipart_boundary(&text).is_none() {
                return Err(EnqueueError::Unserializable(
                    "multipart body has no leading boundary line".to_owned(),
                ));
            }
            Some(MutationBody::Multipart(text))
        } else {
            Some(MutationBody::Text(text))
        }
    };

    Ok(QueueRecord {
        url,
        method,
        headers,
        body,
    })
}

/// Turn a photo upload into a [`PhotoRecord`] created at `created_at`.
///
/// # Errors
///
/// Returns [`EnqueueError::Unserializable`] for an empty file or file name,
/// or a content type that is not a valid media type.
pub fn serialize_photo(
    upload: PhotoUpload,
    created_at: chrono::DateTime<chrono::Utc>,
) -> Result<PhotoRecord, EnqueueError> {
    if upload.file.is_empty() {
        return Err(EnqueueError::Unserializable("photo file is empty".to_owned()));
    }
    if upload.name.trim().is_empty() {
        return Err(EnqueueError::Unserializable("photo file name is empty".to_owned()));
    }
    let content_type = match upload.content_type.trim() {
        "" => mime::APPLICATION_OCTET_STREAM.to_string(),
        raw => {
            raw.parse::<mime::Mime>().map_err(|error| {
                EnqueueError::Unserializable(format!(
                    "photo content type `{raw}` is not a media type: {error}"
                ))
            })?;
            raw.to_owned()
        }
    };
    let mut headers = upload.headers;
    headers.retain(|name, _| !is_transport_managed(name) && name != "content-type");
    Ok(PhotoRecord {
        file: upload.file,
        name: upload.name,
        content_type,
        url: upload.url,
        headers,
        created_at,
        caption: upload.caption.filter(|caption| !caption.is_empty()),
    })
}

/// Boundary token of a multipart body, read from its first delimiter line.
#[must_use]
pub fn multipart_boundary(body: &str) -> Option<&str> {
    let first_line = body.lines().next()?.trim_end();
    let boundary = first_line.strip_prefix("--")?;
    (!boundary.is_empty()).then_some(boundary)
}

fn snapshot_headers(headers: &[(String, String)]) -> HeaderSnapshot {
    headers
        .iter()
        .filter(|(name, _)| !is_transport_managed(name))
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests;
