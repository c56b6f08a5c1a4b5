//! The offline agent service.
//!
//! [`OfflineAgent`] is the long-lived object the inbound adapter talks to.
//! It routes every intercepted request according to its classification,
//! owns the versioned cache namespaces, tracks connectivity from upstream
//! outcomes, and runs a background loop that turns signals and periodic ticks
//! into queue drains.

mod config;
mod runtime;

use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use config::{
    AgentConfig, AgentConfigError, DEFAULT_API_PREFIX, DEFAULT_APP_VERSION, DEFAULT_AUTH_PREFIX,
    DEFAULT_OFFLINE_PAGE, DEFAULT_SYNC_INTERVAL,
};
pub use runtime::{AgentPorts, AgentRuntime, AgentSignal};

use crate::domain::SharedClock;
use crate::domain::cache_strategies::{CacheStrategies, StrategyNamespaces};
use crate::domain::classifier::{Classification, RequestClassifier};
use crate::domain::http::{AgentResponse, InterceptedRequest, UpstreamRequest};
use crate::domain::ports::{
    CacheNamespace, CachedResponse, QueueStoreError, ResponseCacheError, TransportError,
    VersionLedgerError,
};
use crate::domain::queue_writer::{
    EnqueueError, PhotoUpload, QueueWriter, QueueWriterPorts, QueuedAck,
};
use crate::domain::records::{QueueKind, SyncTag};
use crate::domain::replay::{DrainReport, ReplayEngine, ReplayPorts};
use crate::domain::sync_status::SyncStatus;

/// Failures surfaced by agent lifecycle and status calls.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid agent configuration: {0}")]
    Config(#[from] AgentConfigError),
    #[error("offline page url cannot be built: {0}")]
    OfflinePage(#[from] url::ParseError),
    #[error(transparent)]
    Cache(#[from] ResponseCacheError),
    #[error(transparent)]
    Ledger(#[from] VersionLedgerError),
    #[error(transparent)]
    Store(#[from] QueueStoreError),
    #[error("agent background loop is not running")]
    NotRunning,
}

/// Where the agent is in its install/activate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Stopped,
    /// Installed, waiting for an activate signal because another version is
    /// recorded as active.
    Waiting,
    Active,
}

/// Decision returned for one intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    /// The agent does not handle this request; forward it untouched.
    PassThrough(InterceptedRequest),
    /// Answer with this response.
    Respond(AgentResponse),
}

/// Result of pre-caching the static files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

/// Result of an activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub version: String,
    pub purged: Vec<String>,
}

/// Offline-resilience agent.
pub struct OfflineAgent {
    core: Arc<AgentCore>,
    background: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

pub(crate) struct AgentCore {
    config: AgentConfig,
    classifier: RequestClassifier,
    strategies: CacheStrategies,
    writer: QueueWriter,
    replay: ReplayEngine,
    ports: AgentPorts,
    clock: SharedClock,
    online: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    signals: Mutex<Option<UnboundedSender<AgentSignal>>>,
}

impl OfflineAgent {
    /// Build an agent. Nothing runs until [`Self::start`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] when `config` fails validation.
    pub fn new(
        config: AgentConfig,
        ports: AgentPorts,
        runtime: AgentRuntime,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let offline_page_url = config.offline_page_url()?;
        let clock = runtime.clock;

        let classifier = RequestClassifier::new(&config.api_origins, &config.auth_prefix);
        let strategies = CacheStrategies::new(
            Arc::clone(&ports.transport),
            Arc::clone(&ports.cache),
            Arc::clone(&clock),
            StrategyNamespaces {
                static_ns: config.static_namespace(),
                api_ns: config.api_namespace(),
                offline_page_url: offline_page_url.to_string(),
            },
        );
        let writer = QueueWriter::new(
            QueueWriterPorts {
                store: Arc::clone(&ports.queue_store),
                scheduler: Arc::clone(&ports.scheduler),
                metrics: Arc::clone(&ports.metrics),
            },
            Arc::clone(&clock),
            config.stamp_idempotency_keys,
        );
        let replay = ReplayEngine::new(
            ReplayPorts {
                store: Arc::clone(&ports.queue_store),
                transport: Arc::clone(&ports.transport),
                metrics: Arc::clone(&ports.metrics),
            },
            Arc::clone(&clock),
            config.replay_policy,
        );

        Ok(Self {
            core: Arc::new(AgentCore {
                config,
                classifier,
                strategies,
                writer,
                replay,
                ports,
                clock,
                online: AtomicBool::new(true),
                lifecycle: Mutex::new(Lifecycle::Stopped),
                signals: Mutex::new(None),
            }),
            background: tokio::sync::Mutex::new(None),
        })
    }

    /// Validated configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.core.config
    }

    /// Install, activate unless another version must be superseded first,
    /// and spawn the background loop. Calling it again while running is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Fails when the active version cannot be read or activation fails.
    pub async fn start(&self) -> Result<(), AgentError> {
        let mut background = self.background.lock().await;
        if background.is_some() {
            return Ok(());
        }

        self.core.install().await;
        let previous = self.core.ports.ledger.active_version().await?;
        let superseding = previous
            .as_deref()
            .is_some_and(|version| version != self.core.config.app_version);
        if superseding && !self.core.config.skip_waiting {
            info!(
                previous = previous.as_deref().unwrap_or_default(),
                version = %self.core.config.app_version,
                "new version installed, waiting for activation"
            );
            self.core.set_lifecycle(Lifecycle::Waiting);
        } else {
            self.core.activate().await?;
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        *self
            .core
            .signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sender);
        *background = Some(tokio::spawn(runtime::run(Arc::clone(&self.core), receiver)));
        Ok(())
    }

    /// Stop the background loop and wait for it to finish.
    pub async fn stop(&self) {
        let handle = self.background.lock().await.take();
        self.core
            .signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                warn!(%error, "agent loop ended abnormally");
            }
        }
        self.core.set_lifecycle(Lifecycle::Stopped);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self
            .core
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Pre-cache the static files into the current static namespace.
    pub async fn install(&self) -> InstallReport {
        self.core.install().await
    }

    /// Purge stale namespaces and record this version as active.
    ///
    /// # Errors
    ///
    /// Fails when the cache or the version ledger fails.
    pub async fn activate(&self) -> Result<ActivationReport, AgentError> {
        self.core.activate().await
    }

    /// Route one intercepted request.
    pub async fn handle(&self, request: InterceptedRequest) -> Interception {
        self.core.handle(request).await
    }

    /// Forward a request the agent chose not to handle.
    ///
    /// # Errors
    ///
    /// Returns the transport failure; nothing is queued.
    pub async fn pass_through(
        &self,
        request: InterceptedRequest,
    ) -> Result<AgentResponse, TransportError> {
        let upstream = request.to_upstream().ok_or_else(|| {
            TransportError::invalid_request(format!("`{}` is not an absolute url", request.url))
        })?;
        self.core.ports.transport.send(upstream).await
    }

    /// Queue a photo for upload once connectivity allows.
    ///
    /// # Errors
    ///
    /// Returns the queue writer's failure; the photo was not saved.
    pub async fn enqueue_photo(&self, upload: PhotoUpload) -> Result<QueuedAck, EnqueueError> {
        self.core.writer.enqueue_photo(upload).await
    }

    /// Deliver a signal to the background loop.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::NotRunning`] before [`Self::start`] or after
    /// [`Self::stop`].
    pub fn signal(&self, signal: AgentSignal) -> Result<(), AgentError> {
        if self.core.emit(signal) {
            Ok(())
        } else {
            Err(AgentError::NotRunning)
        }
    }

    /// Drain both queues now and return the reports.
    pub async fn sync_now(&self) -> Vec<DrainReport> {
        self.core.drain_all().await
    }

    /// Report of the most recent finished drain of `kind`.
    #[must_use]
    pub fn last_report(&self, kind: QueueKind) -> Option<DrainReport> {
        self.core.replay.last_report(kind)
    }

    /// Total entries waiting across both queues.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn pending_count(&self) -> Result<u64, AgentError> {
        Ok(self.sync_status().await?.pending())
    }

    /// Connectivity, pending counts and the derived user-facing state.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub async fn sync_status(&self) -> Result<SyncStatus, AgentError> {
        let store = &self.core.ports.queue_store;
        let mutations = store.pending_count(QueueKind::Mutation).await?;
        let photos = store.pending_count(QueueKind::Photo).await?;
        Ok(SyncStatus::new(self.is_online(), mutations, photos))
    }

    /// Last observed connectivity.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.core.online.load(Ordering::SeqCst)
    }

    /// Record connectivity reported from outside, e.g. by the platform.
    /// Going from offline to online fires [`AgentSignal::Reconnected`].
    pub fn set_online(&self, online: bool) {
        self.core.observe_connectivity(online);
    }
}

impl AgentCore {
    fn set_lifecycle(&self, state: Lifecycle) {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn emit(&self, signal: AgentSignal) -> bool {
        let guard = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(signal).is_ok(),
            None => {
                debug!(?signal, "agent not running, signal dropped");
                false
            }
        }
    }

    fn observe_connectivity(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        match (was_online, online) {
            (false, true) => {
                info!("connectivity restored");
                self.emit(AgentSignal::Reconnected);
            }
            (true, false) => info!("connectivity lost"),
            _ => {}
        }
    }

    async fn install(&self) -> InstallReport {
        let namespace = self.config.static_namespace();
        let mut report = InstallReport::default();
        for path in self.config.precache_paths() {
            match self.precache(&namespace, path).await {
                Ok(()) => report.cached.push(path.to_owned()),
                Err(reason) => {
                    warn!(%namespace, %path, %reason, "failed to pre-cache static file");
                    report.failed.push(path.to_owned());
                }
            }
        }
        info!(
            %namespace,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "install complete"
        );
        report
    }

    async fn precache(&self, namespace: &CacheNamespace, path: &str) -> Result<(), String> {
        let url = self
            .config
            .app_origin
            .join(path)
            .map_err(|error| error.to_string())?;
        let response = self
            .ports
            .transport
            .send(UpstreamRequest::get(url.clone()))
            .await
            .map_err(|error| error.to_string())?;
        if !response.is_success() {
            return Err(format!("upstream answered {}", response.status));
        }
        let entry = CachedResponse::capture(&response, self.clock.utc());
        self.ports
            .cache
            .put(namespace, url.as_str(), &entry)
            .await
            .map_err(|error| error.to_string())
    }

    async fn activate(&self) -> Result<ActivationReport, AgentError> {
        let current = [self.config.static_namespace(), self.config.api_namespace()];
        let mut purged = Vec::new();
        for namespace in self.ports.cache.namespaces().await? {
            if namespace.is_managed() && !current.contains(&namespace) {
                let removed = self.ports.cache.purge(&namespace).await?;
                info!(%namespace, removed, "deleted stale cache namespace");
                purged.push(namespace.to_string());
            }
        }
        self.ports
            .ledger
            .record_active_version(&self.config.app_version)
            .await?;
        self.set_lifecycle(Lifecycle::Active);
        info!(version = %self.config.app_version, "agent activated");
        Ok(ActivationReport {
            version: self.config.app_version.clone(),
            purged,
        })
    }

    async fn handle(&self, request: InterceptedRequest) -> Interception {
        let classification = self.classifier.classify(
            &request.method,
            &request.url,
            self.config.app_origin.as_str(),
        );
        match classification {
            Classification::Ignore => Interception::PassThrough(request),
            Classification::CacheableGet => {
                let Some(upstream) = request.to_upstream() else {
                    return Interception::PassThrough(request);
                };
                let served = if self.config.is_api_path(upstream.url.path()) {
                    self.strategies.api_fallback(upstream).await
                } else {
                    self.strategies.page_fallback(upstream).await
                };
                if let Some(online) = served.observed_online() {
                    self.observe_connectivity(online);
                }
                Interception::Respond(served.response)
            }
            Classification::DurableMutation => self.forward_or_queue(request).await,
        }
    }

    async fn forward_or_queue(&self, request: InterceptedRequest) -> Interception {
        let Some(upstream) = request.to_upstream() else {
            return Interception::PassThrough(request);
        };
        match self.ports.transport.send(upstream).await {
            Ok(response) => {
                self.observe_connectivity(true);
                Interception::Respond(response)
            }
            Err(failure) if failure.is_connectivity() => {
                self.observe_connectivity(false);
                warn!(
                    method = %request.method,
                    url = %request.url,
                    error = %failure,
                    "network failed, queuing request"
                );
                let response = match self.writer.enqueue_mutation(&request).await {
                    Ok(ack) => ack.into_response(),
                    Err(enqueue_error) => {
                        error!(url = %request.url, error = %enqueue_error, "request NOT queued");
                        enqueue_error.into_response()
                    }
                };
                Interception::Respond(response)
            }
            Err(failure) => {
                warn!(url = %request.url, error = %failure, "upstream rejected the request");
                Interception::Respond(AgentResponse::json(
                    502,
                    &json!({ "code": "bad_upstream_request", "message": failure.to_string() }),
                ))
            }
        }
    }

    async fn dispatch(&self, signal: AgentSignal) {
        match signal {
            AgentSignal::ActivateNow => {
                if let Err(error) = self.activate().await {
                    warn!(%error, "activation failed");
                }
            }
            AgentSignal::SyncNow | AgentSignal::Reconnected => {
                self.drain_all().await;
            }
            AgentSignal::Deferred(tag) => self.drain_kind(tag.queue_kind()).await,
        }
    }

    async fn on_tick(&self) {
        let due = self.ports.scheduler.take_due().await;
        for kind in QueueKind::ALL {
            let tagged = due.contains(&kind.sync_tag());
            let pending = match self.ports.queue_store.pending_count(kind).await {
                Ok(count) => count > 0,
                Err(error) => {
                    warn!(queue = %kind, %error, "failed to count pending entries");
                    false
                }
            };
            if tagged || pending {
                self.drain_kind(kind).await;
            }
        }
    }

    async fn drain_all(&self) -> Vec<DrainReport> {
        let reports = self.replay.drain_all().await;
        self.after_drain(&reports).await;
        reports
    }

    async fn drain_kind(&self, kind: QueueKind) {
        let report = self.replay.drain(kind).await;
        self.after_drain(slice::from_ref(&report)).await;
    }

    async fn after_drain(&self, reports: &[DrainReport]) {
        for report in reports {
            if report.halted_offline() {
                self.reregister(report.kind.sync_tag()).await;
                self.observe_connectivity(false);
            } else if report.delivered > 0 {
                self.observe_connectivity(true);
            }
        }
    }

    async fn reregister(&self, tag: SyncTag) {
        if let Err(error) = self.ports.scheduler.register(tag).await {
            warn!(%tag, %error, "failed to re-register deferred sync");
        }
    }
}
