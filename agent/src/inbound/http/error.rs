//! HTTP adapter errors.
//!
//! Purpose: turn agent failures into consistent JSON responses and status
//! codes without teaching the domain about HTTP.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use tracing::error;

use crate::domain::ports::TransportError;
use crate::domain::{AgentError, TRACE_ID_HEADER, TraceId};

/// Convenient result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    BadUpstreamRequest,
    UpstreamUnavailable,
    AgentUnavailable,
    StorageUnavailable,
    InternalError,
}

impl ErrorCode {
    fn status(self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::BadUpstreamRequest | Self::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            Self::AgentUnavailable | Self::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body: `{"code": .., "message": .., "trace_id": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
}

impl ApiError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            trace_id: TraceId::current().map(|id| id.to_string()),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TransportError> for ApiError {
    fn from(error: TransportError) -> Self {
        if error.is_connectivity() {
            Self::new(ErrorCode::UpstreamUnavailable, error.to_string())
        } else {
            Self::new(ErrorCode::BadUpstreamRequest, error.to_string())
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::NotRunning => Self::new(ErrorCode::AgentUnavailable, error.to_string()),
            AgentError::Cache(_) | AgentError::Ledger(_) | AgentError::Store(_) => {
                Self::new(ErrorCode::StorageUnavailable, error.to_string())
            }
            AgentError::Config(_) | AgentError::OfflinePage(_) => {
                error!(%error, "agent error surfaced as internal error");
                Self::internal("Internal server error")
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.code.status()
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let Some(id) = &self.trace_id {
            builder.insert_header((TRACE_ID_HEADER, id.clone()));
        }
        builder.json(self)
    }
}
