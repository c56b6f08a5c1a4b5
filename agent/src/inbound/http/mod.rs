//! HTTP inbound adapter: the intercepting proxy and the control endpoints.
//!
//! ```text
//! POST /__offline/activate
//! POST /__offline/sync
//! GET  /__offline/status
//! PUT  /__offline/connectivity
//! POST /__offline/photos?audit_item_id=..&name=..&caption=..
//! *    everything else -> proxy
//! ```

pub mod control;
pub mod error;
pub mod proxy;
mod response;
pub mod state;
#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{ApiError, ApiResult, ErrorCode};
pub use state::HttpState;

use actix_web::web;

/// Largest request body the proxy and photo endpoints accept by default.
pub const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Body-size limit for buffered request payloads; larger bodies get `413`.
#[must_use]
pub fn payload_config(max_body_bytes: usize) -> web::PayloadConfig {
    web::PayloadConfig::new(max_body_bytes)
}

/// Register the control endpoints and the catch-all proxy on an app or scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(control::activate)
        .service(control::sync_now)
        .service(control::status)
        .service(control::set_connectivity)
        .service(control::queue_photo)
        .default_service(web::to(proxy::proxy));
}
