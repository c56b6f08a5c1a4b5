//! Validated agent configuration.
//!
//! Built once at startup (see `crate::config::AgentSettings`) and shared
//! read-only by every component of the agent.

use std::time::Duration;

use url::Url;

use crate::domain::ports::CacheNamespace;
use crate::domain::replay::ReplayPolicy;

/// Default deployed version label.
pub const DEFAULT_APP_VERSION: &str = "v2.2.5";
/// Default offline fallback page.
pub const DEFAULT_OFFLINE_PAGE: &str = "/offline.html";
/// Default authentication namespace.
pub const DEFAULT_AUTH_PREFIX: &str = "/api/v1/auth";
/// Default prefix routing reads to the API strategy.
pub const DEFAULT_API_PREFIX: &str = "/api/";
/// Default periodic sync interval.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Rejections raised by [`AgentConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentConfigError {
    #[error("{field} must be an http(s) URL with a host, got `{value}`")]
    NotHttpOrigin { field: &'static str, value: String },
    #[error("{field} must start with `/`, got `{value}`")]
    NotAbsolutePath { field: &'static str, value: String },
    #[error("app version must be non-empty and contain no whitespace")]
    InvalidVersion,
    #[error("api base `{0}` must end with `/` so relative joins stay below it")]
    ApiBaseNotDirectory(String),
    #[error("at least one api origin is required")]
    NoApiOrigins,
    #[error("sync interval must be greater than zero")]
    ZeroSyncInterval,
}

/// Everything the agent needs to know about the application it fronts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Origin the application pages are served from.
    pub app_origin: Url,
    /// Origins whose traffic is intercepted besides the page origin.
    pub api_origins: Vec<Url>,
    /// Base URL of the versioned API; photo endpoints are joined onto it.
    pub api_base: Url,
    pub auth_prefix: String,
    pub api_prefix: String,
    pub app_version: String,
    pub offline_page: String,
    pub static_files: Vec<String>,
    pub sync_interval: Duration,
    pub skip_waiting: bool,
    pub replay_policy: ReplayPolicy,
    pub stamp_idempotency_keys: bool,
}

impl AgentConfig {
    /// Configuration with defaults for everything but the origins.
    #[must_use]
    pub fn new(app_origin: Url, api_base: Url) -> Self {
        let api_origins = vec![api_base.clone()];
        Self {
            app_origin,
            api_origins,
            api_base,
            auth_prefix: DEFAULT_AUTH_PREFIX.to_owned(),
            api_prefix: DEFAULT_API_PREFIX.to_owned(),
            app_version: DEFAULT_APP_VERSION.to_owned(),
            offline_page: DEFAULT_OFFLINE_PAGE.to_owned(),
            static_files: vec!["/".to_owned(), DEFAULT_OFFLINE_PAGE.to_owned()],
            sync_interval: DEFAULT_SYNC_INTERVAL,
            skip_waiting: false,
            replay_policy: ReplayPolicy::default(),
            stamp_idempotency_keys: true,
        }
    }

    /// Check cross-field rules.
    ///
    /// # Errors
    ///
    /// Returns the first rule that does not hold.
    pub fn validate(&self) -> Result<(), AgentConfigError> {
        require_http_origin("app_origin", &self.app_origin)?;
        require_http_origin("api_base", &self.api_base)?;
        if !self.api_base.path().ends_with('/') {
            return Err(AgentConfigError::ApiBaseNotDirectory(
                self.api_base.to_string(),
            ));
        }
        if self.api_origins.is_empty() {
            return Err(AgentConfigError::NoApiOrigins);
        }
        for origin in &self.api_origins {
            require_http_origin("api_origins", origin)?;
        }
        require_absolute_path("auth_prefix", &self.auth_prefix)?;
        require_absolute_path("api_prefix", &self.api_prefix)?;
        require_absolute_path("offline_page", &self.offline_page)?;
        for file in &self.static_files {
            require_absolute_path("static_files", file)?;
        }
        if self.app_version.is_empty() || self.app_version.chars().any(char::is_whitespace) {
            return Err(AgentConfigError::InvalidVersion);
        }
        if self.sync_interval.is_zero() {
            return Err(AgentConfigError::ZeroSyncInterval);
        }
        Ok(())
    }

    /// Namespace pre-populated at install.
    #[must_use]
    pub fn static_namespace(&self) -> CacheNamespace {
        CacheNamespace::static_for(&self.app_version)
    }

    /// Namespace holding cached API reads.
    #[must_use]
    pub fn api_namespace(&self) -> CacheNamespace {
        CacheNamespace::api_for(&self.app_version)
    }

    /// Static paths to pre-cache: configured files plus `/` and the offline
    /// page, without duplicates, in first-seen order.
    #[must_use]
    pub fn precache_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::with_capacity(self.static_files.len() + 2);
        let required = ["/", self.offline_page.as_str()];
        for path in required
            .into_iter()
            .chain(self.static_files.iter().map(String::as_str))
        {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

    /// Absolute URL of the offline fallback page.
    ///
    /// # Errors
    ///
    /// Returns a parse error when the path cannot be joined to the origin.
    pub fn offline_page_url(&self) -> Result<Url, url::ParseError> {
        self.app_origin.join(&self.offline_page)
    }

    /// Whether a read on `path` takes the API strategy.
    #[must_use]
    pub fn is_api_path(&self, path: &str) -> bool {
        path.starts_with(self.api_prefix.as_str())
    }

    /// Resolve an origin-form request target.
    ///
    /// Paths under the API prefix go to the primary API origin; everything
    /// else goes to the app origin.
    ///
    /// # Errors
    ///
    /// Returns a parse error when the target cannot be joined.
    pub fn resolve_target(&self, path_and_query: &str) -> Result<Url, url::ParseError> {
        let base = match self.api_origins.first() {
            Some(api) if self.is_api_path(path_and_query) => api,
            _ => &self.app_origin,
        };
        base.join(path_and_query)
    }
}

fn require_http_origin(field: &'static str, url: &Url) -> Result<(), AgentConfigError> {
    let http = matches!(url.scheme(), "http" | "https");
    if http && url.host_str().is_some_and(|host| !host.is_empty()) {
        Ok(())
    } else {
        Err(AgentConfigError::NotHttpOrigin {
            field,
            value: url.to_string(),
        })
    }
}

fn require_absolute_path(field: &'static str, value: &str) -> Result<(), AgentConfigError> {
    if value.starts_with('/') {
        Ok(())
    } else {
        Err(AgentConfigError::NotAbsolutePath {
            field,
            value: value.to_owned(),
        })
    }
}
