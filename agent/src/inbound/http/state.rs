//! Shared HTTP adapter state.
//!
//! Handlers accept this via `actix_web::web::Data` and talk only to the
//! agent service.

use std::sync::Arc;

use crate::domain::OfflineAgent;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub agent: Arc<OfflineAgent>,
}

impl HttpState {
    pub fn new(agent: Arc<OfflineAgent>) -> Self {
        Self { agent }
    }
}
