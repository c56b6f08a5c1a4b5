//! Network-first read strategies with cache fallback.
//!
//! Neither strategy fails: when the network and the cache both come up empty
//! the application still receives a synthesized response.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::SharedClock;
use crate::domain::http::{AgentResponse, UpstreamRequest};
use crate::domain::ports::{
    CacheNamespace, CachedResponse, ResponseCache, TransportError, UpstreamTransport,
};

/// Header marking a response served from the API cache.
pub const CACHE_HIT_HEADER: &str = "x-offline-cache";

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Synthesized,
}

/// Response plus its provenance, used by the agent to track connectivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedResponse {
    pub response: AgentResponse,
    pub source: ResponseSource,
    /// Transport failure that forced the fallback, if any.
    pub failure: Option<TransportError>,
}

impl ServedResponse {
    const fn network(response: AgentResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
            failure: None,
        }
    }

    fn fallback(response: AgentResponse, source: ResponseSource, failure: TransportError) -> Self {
        Self {
            response,
            source,
            failure: Some(failure),
        }
    }

    /// Whether upstream answered.
    #[must_use]
    pub const fn reached_network(&self) -> bool {
        matches!(self.source, ResponseSource::Network)
    }

    /// What this response says about connectivity: `None` when the request
    /// itself could not be sent, which says nothing about the network.
    #[must_use]
    pub fn observed_online(&self) -> Option<bool> {
        match &self.failure {
            None => Some(true),
            Some(failure) if failure.is_connectivity() => Some(false),
            Some(_) => None,
        }
    }
}

/// Cache namespaces and fallback page the strategies read from.
#[derive(Debug, Clone)]
pub struct StrategyNamespaces {
    pub static_ns: CacheNamespace,
    pub api_ns: CacheNamespace,
    pub offline_page_url: String,
}

/// Page and API read strategies.
pub struct CacheStrategies {
    transport: Arc<dyn UpstreamTransport>,
    cache: Arc<dyn ResponseCache>,
    clock: SharedClock,
    namespaces: StrategyNamespaces,
}

impl CacheStrategies {
    /// Build strategies over the given ports.
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        cache: Arc<dyn ResponseCache>,
        clock: SharedClock,
        namespaces: StrategyNamespaces,
    ) -> Self {
        Self {
            transport,
            cache,
            clock,
            namespaces,
        }
    }

    /// Network first; on transport failure the exact cached match, then the
    /// cached offline page, then a synthesized `503`.
    pub async fn page_fallback(&self, request: UpstreamRequest) -> ServedResponse {
        let key = request.url.to_string();
        let error = match self.transport.send(request).await {
            Ok(response) => return ServedResponse::network(response),
            Err(error) => error,
        };
        debug!(url = %key, %error, "page fetch failed, trying cache");

        for namespace in [&self.namespaces.static_ns, &self.namespaces.api_ns] {
            if let Some(cached) = self.lookup(namespace, &key).await {
                return ServedResponse::fallback(
                    cached.into_response(),
                    ResponseSource::Cache,
                    error,
                );
            }
        }
        let offline_page = self.namespaces.offline_page_url.as_str();
        if let Some(page) = self.lookup(&self.namespaces.static_ns, offline_page).await {
            return ServedResponse::fallback(page.into_response(), ResponseSource::Cache, error);
        }
        ServedResponse::fallback(
            AgentResponse::offline_unavailable(),
            ResponseSource::Synthesized,
            error,
        )
    }

    /// Network first, caching successful `GET` responses; on transport
    /// failure the cached response marked with [`CACHE_HIT_HEADER`], else the
    /// empty offline envelope.
    pub async fn api_fallback(&self, request: UpstreamRequest) -> ServedResponse {
        let key = request.url.to_string();
        let is_head = request.method().eq_ignore_ascii_case("HEAD");
        match self.transport.send(request).await {
            Ok(response) => {
                if !is_head && response.is_success() {
                    self.store(&key, &response).await;
                }
                ServedResponse::network(response)
            }
            Err(error) => {
                debug!(url = %key, %error, "api fetch failed, trying cache");
                match self.lookup(&self.namespaces.api_ns, &key).await {
                    Some(cached) => {
                        let mut response = cached
                            .into_response()
                            .with_header(CACHE_HIT_HEADER, "hit");
                        if is_head {
                            response.body.clear();
                        }
                        ServedResponse::fallback(response, ResponseSource::Cache, error)
                    }
                    None => {
                        let mut response = AgentResponse::offline_envelope();
                        if is_head {
                            response.body.clear();
                        }
                        ServedResponse::fallback(response, ResponseSource::Synthesized, error)
                    }
                }
            }
        }
    }

    async fn lookup(&self, namespace: &CacheNamespace, url: &str) -> Option<CachedResponse> {
        match self.cache.get(namespace, url).await {
            Ok(found) => found,
            Err(error) => {
                warn!(%namespace, %url, %error, "cache read failed");
                None
            }
        }
    }

    async fn store(&self, url: &str, response: &AgentResponse) {
        let entry = CachedResponse::capture(response, self.clock.utc());
        if let Err(error) = self.cache.put(&self.namespaces.api_ns, url, &entry).await {
            warn!(namespace = %self.namespaces.api_ns, %url, %error, "cache write failed");
        }
    }
}
