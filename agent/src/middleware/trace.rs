//! Request correlation for the proxy.
//!
//! Each request runs with a [`TraceId`] in task-local scope: the inbound
//! `trace-id` header when it parses, a fresh one otherwise. The id is echoed
//! on the response and recorded on the request span, so a queued write can
//! be matched to the agent's log lines.

use std::time::Instant;

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{Instrument, debug, info_span, warn};

use crate::domain::{TRACE_ID_HEADER, TraceId};

/// Wrap an `App` with this to scope a [`TraceId`] and a `proxy_request` span
/// around every request.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use offline_agent::Trace;
///
/// let _app = App::new().wrap(Trace);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl<S, B> Transform<S, ServiceRequest> for Trace
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TraceService<S>;
    type Future = Ready<Result<TraceService<S>, ()>>;

    fn new_transform(&self, inner: S) -> Self::Future {
        ready(Ok(TraceService { inner }))
    }
}

/// Service produced by [`Trace`].
pub struct TraceService<S> {
    inner: S,
}

impl<S, B> Service<ServiceRequest> for TraceService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<ServiceResponse<B>, Error>>;

    actix_web::dev::forward_ready!(inner);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let trace_id = supplied_trace_id(&req).unwrap_or_else(TraceId::generate);
        let span = info_span!(
            "proxy_request",
            %trace_id,
            method = %req.method(),
            path = %req.path(),
        );
        let started = Instant::now();
        let response = self.inner.call(req);

        Box::pin(
            TraceId::scope(trace_id, async move {
                let mut res = response.await?;
                echo_trace_id(&mut res, trace_id);
                debug!(status = res.status().as_u16(), elapsed = ?started.elapsed(), "request finished");
                Ok(res)
            })
            .instrument(span),
        )
    }
}

/// Honour the application's own id so a queued write and its replay share it.
fn supplied_trace_id(req: &ServiceRequest) -> Option<TraceId> {
    let raw = req.headers().get(TRACE_ID_HEADER)?.to_str().ok()?;
    raw.parse::<TraceId>()
        .inspect_err(|error| debug!(%error, raw, "ignoring malformed inbound trace id"))
        .ok()
}

fn echo_trace_id<B>(res: &mut ServiceResponse<B>, trace_id: TraceId) {
    match HeaderValue::from_str(&trace_id.to_string()) {
        Ok(value) => {
            res.headers_mut()
                .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
        }
        Err(error) => warn!(%error, %trace_id, "trace id is not a valid header value"),
    }
}
