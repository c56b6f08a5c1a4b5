//! Rebuilds upstream requests from stored records.

use crate::domain::http::{PhotoForm, UpstreamBody, UpstreamRequest};
use crate::domain::queue_writer::multipart_boundary;
use crate::domain::records::{MutationBody, PhotoRecord, QueueRecord, QueuedRecord};

/// Request re-issuing `record`.
///
/// Multipart mutations get a fresh `content-type` carrying the boundary read
/// from the stored body. Photos become a multipart form whose `content-type`
/// the transport writes.
#[must_use]
pub fn rebuild_request(record: &QueuedRecord) -> UpstreamRequest {
    match record {
        QueuedRecord::Mutation(record) => rebuild_mutation(record),
        QueuedRecord::Photo(record) => rebuild_photo(record),
    }
}

fn rebuild_mutation(record: &QueueRecord) -> UpstreamRequest {
    let mut headers: Vec<(String, String)> = record
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let body = match &record.body {
        None => UpstreamBody::Empty,
        Some(MutationBody::Text(text)) => UpstreamBody::Text(text.clone()),
        Some(MutationBody::Multipart(text)) => {
            headers.retain(|(name, _)| name != "content-type");
            if let Some(boundary) = multipart_boundary(text) {
                headers.push((
                    "content-type".to_owned(),
                    format!("multipart/form-data; boundary={boundary}"),
                ));
            }
            UpstreamBody::Text(text.clone())
        }
    };
    UpstreamRequest {
        method: record.method.as_str().to_owned(),
        url: record.url.clone(),
        headers,
        body,
    }
}

fn rebuild_photo(record: &PhotoRecord) -> UpstreamRequest {
    let headers = record
        .headers
        .iter()
        .filter(|(name, _)| name.as_str() != "content-type")
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    UpstreamRequest {
        method: "POST".to_owned(),
        url: record.url.clone(),
        headers,
        body: UpstreamBody::PhotoForm(PhotoForm {
            file: record.file.clone(),
            file_name: record.name.clone(),
            content_type: record.content_type.clone(),
            caption: record.caption.clone(),
            taken_at: record.created_at.to_rfc3339(),
        }),
    }
}
