//! Conversion from agent responses to actix responses.

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use actix_web::http::header::{HeaderName, HeaderValue};
use tracing::debug;

use crate::domain::http::{AgentResponse, is_transport_managed};

/// Render `response`, leaving framing headers to actix.
pub(crate) fn into_http_response(response: AgentResponse) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);
    for (name, value) in &response.headers {
        if is_transport_managed(name) {
            continue;
        }
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                builder.append_header((name, value));
            }
            _ => debug!(header = %name, "dropping unrepresentable response header"),
        }
    }
    builder.body(response.body)
}
