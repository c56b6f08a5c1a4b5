//! Catch-all intercepting proxy.
//!
//! Absolute-form targets (`GET http://host/path HTTP/1.1`, as sent to a
//! forward proxy) are used verbatim. Origin-form targets are resolved against
//! the configured origins, so the agent can also sit in front of the app as a
//! reverse proxy.

use actix_web::{HttpRequest, HttpResponse, web};
use tracing::{debug, warn};

use super::error::{ApiError, ApiResult};
use super::response::into_http_response;
use super::state::HttpState;
use crate::domain::{AgentConfig, InterceptedRequest, Interception};

/// Route one request through the agent.
pub async fn proxy(
    request: HttpRequest,
    body: web::Bytes,
    state: web::Data<HttpState>,
) -> ApiResult<HttpResponse> {
    let intercepted = intercept(&request, body, state.agent.config())?;
    match state.agent.handle(intercepted).await {
        Interception::Respond(response) => Ok(into_http_response(response)),
        Interception::PassThrough(intercepted) => {
            debug!(method = %intercepted.method, url = %intercepted.url, "passing through");
            let response = state.agent.pass_through(intercepted).await.map_err(|error| {
                warn!(%error, "pass-through request failed");
                ApiError::from(error)
            })?;
            Ok(into_http_response(response))
        }
    }
}

fn intercept(
    request: &HttpRequest,
    body: web::Bytes,
    config: &AgentConfig,
) -> ApiResult<InterceptedRequest> {
    let uri = request.uri();
    let url = if uri.scheme().is_some() {
        uri.to_string()
    } else {
        let target = uri.path_and_query().map_or("/", |target| target.as_str());
        config
            .resolve_target(target)
            .map_err(|error| ApiError::invalid_request(format!("bad request target: {error}")))?
            .to_string()
    };

    let headers = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect();
    Ok(InterceptedRequest {
        method: request.method().as_str().to_owned(),
        url,
        headers,
        body: body.to_vec(),
    })
}
