//! Port and runtime dependency bundles for the agent, and its background loop.

use std::sync::Arc;

use mockable::DefaultClock;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use super::AgentCore;
use crate::domain::SharedClock;
use crate::domain::TraceId;
use crate::domain::ports::{
    DeferredSyncScheduler, QueueStore, ReplayMetrics, ResponseCache, UpstreamTransport,
    VersionLedger,
};
use crate::domain::records::SyncTag;

/// Port bundle required by the agent.
#[derive(Clone)]
pub struct AgentPorts {
    /// Upstream HTTP adapter.
    pub transport: Arc<dyn UpstreamTransport>,
    /// Durable queue adapter.
    pub queue_store: Arc<dyn QueueStore>,
    /// Namespaced response cache adapter.
    pub cache: Arc<dyn ResponseCache>,
    /// Active-version record.
    pub ledger: Arc<dyn VersionLedger>,
    /// Deferred-sync registration.
    pub scheduler: Arc<dyn DeferredSyncScheduler>,
    /// Queue and replay counters.
    pub metrics: Arc<dyn ReplayMetrics>,
}

/// Runtime helpers injected alongside the ports.
#[derive(Clone)]
pub struct AgentRuntime {
    /// Source of `created_at` and `abandoned_at` timestamps.
    pub clock: SharedClock,
}

impl Default for AgentRuntime {
    fn default() -> Self {
        Self {
            clock: Arc::new(DefaultClock),
        }
    }
}

/// Events the agent reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentSignal {
    /// Activate the installed version without waiting.
    ActivateNow,
    /// Drain both queues now.
    SyncNow,
    /// Connectivity came back.
    Reconnected,
    /// A deferred-sync tag fired.
    Deferred(SyncTag),
}

/// Background loop: one task per agent, handling signals and periodic ticks
/// until the signal sender is dropped.
pub(super) async fn run(core: Arc<AgentCore>, mut signals: UnboundedReceiver<AgentSignal>) {
    let period = core.config.sync_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = signals.recv() => {
                let Some(signal) = received else { break };
                debug!(?signal, "agent signal");
                TraceId::scope(TraceId::generate(), core.dispatch(signal)).await;
            }
            _ = ticker.tick() => {
                TraceId::scope(TraceId::generate(), core.on_tick()).await;
            }
        }
    }
    debug!("agent loop stopped");
}
