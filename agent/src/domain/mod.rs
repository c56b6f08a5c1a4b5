//! Domain layer: records, classification, cache strategies, the queue
//! writer, the replay engine and the agent service, plus the ports they
//! depend on. Nothing in here knows about HTTP frameworks, SQL or Prometheus.

pub mod agent;
pub mod cache_strategies;
pub mod classifier;
pub mod http;
pub mod ports;
pub mod queue_writer;
pub mod records;
pub mod replay;
pub mod sync_status;
pub mod trace_id;

use std::sync::Arc;

use mockable::Clock;

pub use self::agent::{
    ActivationReport, AgentConfig, AgentConfigError, AgentError, AgentPorts, AgentRuntime,
    AgentSignal, InstallReport, Interception, Lifecycle, OfflineAgent,
};
pub use self::cache_strategies::{CACHE_HIT_HEADER, CacheStrategies, ResponseSource};
pub use self::classifier::{Classification, RequestClassifier};
pub use self::http::{AgentResponse, InterceptedRequest, UpstreamBody, UpstreamRequest};
pub use self::queue_writer::{
    EnqueueError, IDEMPOTENCY_KEY_HEADER, PhotoUpload, QUEUED_HEADER, QueueWriter, QueuedAck,
};
pub use self::records::{
    MutationBody, MutationMethod, PhotoRecord, QueueKind, QueueRecord, QueuedRecord, SequenceKey,
    StoredEntry, SyncTag,
};
pub use self::replay::{DrainReport, DrainStatus, HaltReason, ReplayEngine, ReplayPolicy};
pub use self::sync_status::{SyncState, SyncStatus};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};

/// Clock shared across the agent's components.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;
