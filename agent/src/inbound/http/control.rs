//! Control endpoints the application uses to steer the agent.
//!
//! ```text
//! POST /__offline/activate
//! POST /__offline/sync
//! GET  /__offline/status
//! PUT  /__offline/connectivity   {"online": bool}
//! POST /__offline/photos?audit_item_id=7&name=site.jpg&caption=north
//! ```

use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, get, post, put, web};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::response::into_http_response;
use super::state::HttpState;
use crate::domain::{
    ActivationReport, DrainReport, DrainStatus, HaltReason, Lifecycle, PhotoUpload, SyncStatus,
};

const DEFAULT_PHOTO_TYPE: &str = "application/octet-stream";

/// Outcome of one queue drain, as reported to the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReportBody {
    pub queue: &'static str,
    pub status: &'static str,
    pub delivered: usize,
    pub discarded: usize,
    pub abandoned: usize,
    pub remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&DrainReport> for DrainReportBody {
    fn from(report: &DrainReport) -> Self {
        let (status_label, halted_at, reason) = match &report.status {
            DrainStatus::Completed => ("completed", None, None),
            DrainStatus::AlreadyDraining => ("already_draining", None, None),
            DrainStatus::Halted(HaltReason::Transport { key, message }) => {
                ("halted", Some(key.get()), Some(message.clone()))
            }
            DrainStatus::Halted(HaltReason::Rejected { key, status: code }) => (
                "halted",
                Some(key.get()),
                Some(format!("upstream answered {code}")),
            ),
            DrainStatus::Halted(HaltReason::Storage { message }) => {
                ("halted", None, Some(message.clone()))
            }
        };
        Self {
            queue: report.kind.namespace(),
            status: status_label,
            delivered: report.delivered,
            discarded: report.discarded,
            abandoned: report.abandoned,
            remaining: report.remaining,
            halted_at,
            reason,
        }
    }
}

/// Response for `POST /__offline/sync`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponseBody {
    pub reports: Vec<DrainReportBody>,
    pub status: SyncStatus,
}

/// Response for `GET /__offline/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponseBody {
    pub version: String,
    pub lifecycle: Lifecycle,
    #[serde(flatten)]
    pub sync: SyncStatus,
}

/// Request body for `PUT /__offline/connectivity`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ConnectivityBody {
    pub online: bool,
}

/// Query parameters for `POST /__offline/photos`.
#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    pub audit_item_id: u64,
    pub name: String,
    pub caption: Option<String>,
}

/// Activate the installed version now, purging stale caches.
#[post("/__offline/activate")]
pub async fn activate(state: web::Data<HttpState>) -> ApiResult<web::Json<ActivationReport>> {
    let report = state.agent.activate().await?;
    Ok(web::Json(report))
}

/// Drain both queues and report what happened.
#[post("/__offline/sync")]
pub async fn sync_now(state: web::Data<HttpState>) -> ApiResult<web::Json<SyncResponseBody>> {
    let reports = state.agent.sync_now().await;
    let sync_status = state.agent.sync_status().await?;
    Ok(web::Json(SyncResponseBody {
        reports: reports.iter().map(DrainReportBody::from).collect(),
        status: sync_status,
    }))
}

/// Connectivity, pending counts and lifecycle.
#[get("/__offline/status")]
pub async fn status(state: web::Data<HttpState>) -> ApiResult<web::Json<StatusResponseBody>> {
    let sync = state.agent.sync_status().await?;
    Ok(web::Json(StatusResponseBody {
        version: state.agent.config().app_version.clone(),
        lifecycle: state.agent.lifecycle(),
        sync,
    }))
}

/// Record connectivity observed by the platform.
#[put("/__offline/connectivity")]
pub async fn set_connectivity(
    state: web::Data<HttpState>,
    body: web::Json<ConnectivityBody>,
) -> ApiResult<web::Json<SyncStatus>> {
    info!(online = body.online, "connectivity reported");
    state.agent.set_online(body.online);
    Ok(web::Json(state.agent.sync_status().await?))
}

/// Queue a photo for the audit-item upload endpoint.
///
/// The raw request body is the file; `content-type` is its MIME type and an
/// `authorization` header is kept for replay.
#[post("/__offline/photos")]
pub async fn queue_photo(
    request: HttpRequest,
    state: web::Data<HttpState>,
    query: web::Query<PhotoQuery>,
    body: web::Bytes,
) -> ApiResult<HttpResponse> {
    let PhotoQuery {
        audit_item_id,
        name,
        caption,
    } = query.into_inner();
    let content_type = header_value(&request, header::CONTENT_TYPE).unwrap_or(DEFAULT_PHOTO_TYPE);
    let mut upload = PhotoUpload::for_audit_item(
        &state.agent.config().api_base,
        audit_item_id,
        body.to_vec(),
        name,
        content_type,
    )
    .map_err(|error| ApiError::invalid_request(format!("photo endpoint: {error}")))?;
    if let Some(caption) = caption {
        upload = upload.with_caption(caption);
    }
    if let Some(token) = header_value(&request, header::AUTHORIZATION) {
        upload = upload.with_header(header::AUTHORIZATION.as_str(), token);
    }

    let response = match state.agent.enqueue_photo(upload).await {
        Ok(ack) => ack.into_response(),
        Err(error) => error.into_response(),
    };
    Ok(into_http_response(response))
}

fn header_value(request: &HttpRequest, name: header::HeaderName) -> Option<&str> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
