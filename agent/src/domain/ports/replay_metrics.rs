//! Domain port surface for queue and replay counters.
//!
//! The queue writer and replay engine report outcomes here so an exporter
//! can be attached without either knowing about Prometheus.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::records::QueueKind;

define_port_error! {
    /// Errors exposed when recording replay metrics.
    pub enum ReplayMetricsError {
        /// Metric exporter rejected the write.
        Export => "replay metrics exporter failed",
    }
}

/// What happened to one queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Appended to the queue.
    Queued,
    /// Re-issued successfully and removed.
    Delivered,
    /// Corrupt entry removed without a network call.
    Discarded,
    /// Given up on by the dead-letter policy.
    Abandoned,
    /// Drain stopped on this entry.
    Halted,
}

impl ReplayOutcome {
    /// Label value used by exporters.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Delivered => "delivered",
            Self::Discarded => "discarded",
            Self::Abandoned => "abandoned",
            Self::Halted => "halted",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReplayMetrics: Send + Sync {
    /// Count one outcome for `kind`.
    async fn record(&self, kind: QueueKind, outcome: ReplayOutcome)
    -> Result<(), ReplayMetricsError>;
}

/// No-op implementation used when metrics are disabled or in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReplayMetrics;

#[async_trait]
impl ReplayMetrics for NoOpReplayMetrics {
    async fn record(
        &self,
        _kind: QueueKind,
        _outcome: ReplayOutcome,
    ) -> Result<(), ReplayMetricsError> {
        Ok(())
    }
}
