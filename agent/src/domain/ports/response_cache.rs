//! Port for the namespaced response cache.
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::define_port_error;
use crate::domain::http::{AgentResponse, HeaderList};

define_port_error! {
    /// Errors surfaced by the caching adapter.
    pub enum ResponseCacheError {
        /// Cache backend is unavailable or failing.
        Backend => "response cache backend failure",
        /// Stored headers could not be encoded or decoded.
        Serialization => "response cache serialisation failed",
    }
}

const STATIC_PREFIX: &str = "static-";
const API_PREFIX: &str = "api-";

/// Name of one cache namespace, e.g. `static-v2.2.5`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheNamespace(String);

impl CacheNamespace {
    /// Wrap a raw namespace name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Versioned namespace holding pre-cached static files.
    #[must_use]
    pub fn static_for(version: &str) -> Self {
        Self(format!("{STATIC_PREFIX}{version}"))
    }

    /// Versioned namespace holding the latest successful API reads.
    #[must_use]
    pub fn api_for(version: &str) -> Self {
        Self(format!("{API_PREFIX}{version}"))
    }

    /// Whether activation is allowed to purge this namespace.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.0.starts_with(STATIC_PREFIX) || self.0.starts_with(API_PREFIX)
    }

    /// Raw name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Capture `response` as of `stored_at`.
    #[must_use]
    pub fn capture(response: &AgentResponse, stored_at: DateTime<Utc>) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at,
        }
    }

    /// Convert back into a response for the application.
    #[must_use]
    pub fn into_response(self) -> AgentResponse {
        AgentResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Exact-URL lookup within one namespace.
    async fn get(
        &self,
        namespace: &CacheNamespace,
        url: &str,
    ) -> Result<Option<CachedResponse>, ResponseCacheError>;

    /// Insert or overwrite the entry for `url`.
    async fn put(
        &self,
        namespace: &CacheNamespace,
        url: &str,
        response: &CachedResponse,
    ) -> Result<(), ResponseCacheError>;

    /// Every namespace holding at least one entry.
    async fn namespaces(&self) -> Result<Vec<CacheNamespace>, ResponseCacheError>;

    /// Drop a namespace and return how many entries it held.
    async fn purge(&self, namespace: &CacheNamespace) -> Result<u64, ResponseCacheError>;
}
