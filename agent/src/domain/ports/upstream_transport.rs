//! Port for issuing HTTP requests to the application's origins.
use async_trait::async_trait;

use super::define_port_error;
use crate::domain::http::{AgentResponse, UpstreamRequest};

define_port_error! {
    /// Transport-level failures. Any received response, whatever its status,
    /// is a success at this layer.
    pub enum TransportError {
        /// No connection could be made or it dropped mid-exchange.
        Unreachable => "upstream unreachable",
        /// The request timed out.
        Timeout => "upstream request timed out",
        /// The request could not be built (bad verb, header or form part).
        InvalidRequest => "upstream request invalid",
    }
}

impl TransportError {
    /// Whether the failure means the device is effectively offline.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Send `request` and return the full response.
    async fn send(&self, request: UpstreamRequest) -> Result<AgentResponse, TransportError>;
}
