//! Agent settings loaded via OrthoConfig.
//!
//! Every field can come from the command line, an `OFFLINE_AGENT_*`
//! environment variable or a configuration file. List-valued settings are
//! comma-separated strings so they read the same in all three sources.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::replay::ReplayPolicy;
use crate::domain::{AgentConfig, AgentConfigError};
use crate::inbound::http::DEFAULT_MAX_BODY_BYTES;
use crate::outbound::http::DEFAULT_REQUEST_TIMEOUT;
use crate::outbound::persistence::{DEFAULT_SCHEMA_VERSION, StoreConfig};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_APP_ORIGIN: &str = "http://127.0.0.1:5173";
const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api/v1/";
const DEFAULT_DATABASE_PATH: &str = "offline-agent.db";

/// Reasons the loaded settings cannot become an [`AgentConfig`].
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{field} is not a valid url: {source}")]
    Url {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("bind_addr `{value}` is not a socket address")]
    BindAddr { value: String },
    #[error("app_origin {origin} points back at the agent's own listener")]
    SelfProxy { origin: String },
    #[error("sync_interval_secs must be greater than zero")]
    ZeroSyncInterval,
    #[error(transparent)]
    Agent(#[from] AgentConfigError),
}

/// Configuration values controlling the agent process.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "OFFLINE_AGENT")]
pub struct AgentSettings {
    /// Address the intercepting listener binds to.
    pub bind_addr: Option<String>,
    /// Origin serving the application pages.
    pub app_origin: Option<String>,
    /// Base URL of the versioned API.
    pub api_base: Option<String>,
    /// Extra intercepted API origins, comma-separated.
    pub api_origins: Option<String>,
    pub auth_prefix: Option<String>,
    pub api_prefix: Option<String>,
    /// Deployed version label; drives cache namespace names.
    pub app_version: Option<String>,
    pub offline_page: Option<String>,
    /// Static paths pre-cached at install, comma-separated.
    pub static_files: Option<String>,
    /// SQLite database file.
    pub database_path: Option<PathBuf>,
    /// Store schema version; a newer version on disk refuses to open.
    pub schema_version: Option<i32>,
    pub request_timeout_secs: Option<u64>,
    /// Largest accepted request body, proxied or queued, in bytes.
    pub max_body_bytes: Option<usize>,
    pub sync_interval_secs: Option<u64>,
    /// Activate a new version without waiting for an explicit signal.
    #[ortho_config(default = false)]
    pub skip_waiting: bool,
    /// Rejections after which a queued entry is set aside. Unset keeps
    /// rejected entries at the head of the queue indefinitely.
    pub abandon_after: Option<u32>,
    /// Stamp an idempotency key on queued mutations. Defaults to on.
    pub stamp_idempotency_keys: Option<bool>,
}

impl AgentSettings {
    /// Listener address, falling back to the loopback default.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::BindAddr`] when the value does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        let raw = self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        raw.parse().map_err(|_| SettingsError::BindAddr {
            value: raw.to_owned(),
        })
    }

    /// Database location, falling back to a file in the working directory.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
    }

    pub fn schema_version(&self) -> i32 {
        self.schema_version.unwrap_or(DEFAULT_SCHEMA_VERSION)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout_secs
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES)
    }

    /// Store settings derived from the database path and schema version.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.database_path()).with_schema_version(self.schema_version())
    }

    /// Build and validate the agent configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] naming the first offending setting.
    pub fn to_agent_config(&self) -> Result<AgentConfig, SettingsError> {
        let app_origin = parse_url(
            "app_origin",
            self.app_origin.as_deref().unwrap_or(DEFAULT_APP_ORIGIN),
        )?;
        let api_base = parse_url(
            "api_base",
            self.api_base.as_deref().unwrap_or(DEFAULT_API_BASE),
        )?;
        self.reject_self_proxy(&app_origin)?;

        let mut config = AgentConfig::new(app_origin, api_base);
        for origin in split_list(self.api_origins.as_deref()) {
            let origin = parse_url("api_origins", origin)?;
            if !config.api_origins.contains(&origin) {
                config.api_origins.push(origin);
            }
        }
        if let Some(prefix) = &self.auth_prefix {
            config.auth_prefix.clone_from(prefix);
        }
        if let Some(prefix) = &self.api_prefix {
            config.api_prefix.clone_from(prefix);
        }
        if let Some(version) = &self.app_version {
            config.app_version.clone_from(version);
        }
        if let Some(page) = &self.offline_page {
            config.offline_page.clone_from(page);
            config.static_files = vec!["/".to_owned(), page.clone()];
        }
        let static_files: Vec<String> = split_list(self.static_files.as_deref())
            .map(str::to_owned)
            .collect();
        if !static_files.is_empty() {
            config.static_files = static_files;
        }
        if let Some(secs) = self.sync_interval_secs {
            if secs == 0 {
                return Err(SettingsError::ZeroSyncInterval);
            }
            config.sync_interval = Duration::from_secs(secs);
        }
        config.skip_waiting = self.skip_waiting;
        config.replay_policy = self
            .abandon_after
            .map_or_else(ReplayPolicy::retry_forever, ReplayPolicy::abandon_after);
        config.stamp_idempotency_keys = self.stamp_idempotency_keys.unwrap_or(true);
        config.validate()?;
        Ok(config)
    }

    fn reject_self_proxy(&self, app_origin: &Url) -> Result<(), SettingsError> {
        let bind = self.bind_addr()?;
        let same_port = app_origin.port_or_known_default() == Some(bind.port());
        let same_host = app_origin
            .host_str()
            .is_some_and(|host| host.trim_matches(['[', ']']) == bind.ip().to_string());
        if same_port && same_host {
            return Err(SettingsError::SelfProxy {
                origin: app_origin.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, SettingsError> {
    Url::parse(raw.trim()).map_err(|source| SettingsError::Url { field, source })
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}
