//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod deferred_sync;
mod queue_store;
mod replay_metrics;
mod response_cache;
mod upstream_transport;
mod version_ledger;

#[cfg(test)]
pub use deferred_sync::MockDeferredSyncScheduler;
pub use deferred_sync::{DeferredSyncScheduler, SyncRegistrationError};
#[cfg(test)]
pub use queue_store::MockQueueStore;
pub use queue_store::{QueueStore, QueueStoreError};
#[cfg(test)]
pub use replay_metrics::MockReplayMetrics;
pub use replay_metrics::{NoOpReplayMetrics, ReplayMetrics, ReplayMetricsError, ReplayOutcome};
#[cfg(test)]
pub use response_cache::MockResponseCache;
pub use response_cache::{CacheNamespace, CachedResponse, ResponseCache, ResponseCacheError};
#[cfg(test)]
pub use upstream_transport::MockUpstreamTransport;
pub use upstream_transport::{TransportError, UpstreamTransport};
#[cfg(test)]
pub use version_ledger::MockVersionLedger;
pub use version_ledger::{VersionLedger, VersionLedgerError};
