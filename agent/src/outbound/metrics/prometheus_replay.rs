//! Prometheus adapter for queue and replay counters.
//!
//! One counter family, `offline_queue_entries_total`, labelled by queue
//! namespace and outcome.

use async_trait::async_trait;
use prometheus::{CounterVec, Opts, Registry};

use crate::domain::ports::{ReplayMetrics, ReplayMetricsError, ReplayOutcome};
use crate::domain::records::QueueKind;

/// Prometheus-backed recorder for queue entry outcomes.
pub struct PrometheusReplayMetrics {
    entries_total: CounterVec,
}

impl PrometheusReplayMetrics {
    /// Create and register the counter with the provided registry.
    ///
    /// # Errors
    ///
    /// Returns an error when Prometheus rejects metric registration.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let entries_total = CounterVec::new(
            Opts::new(
                "offline_queue_entries_total",
                "Queue entries by queue and outcome",
            ),
            &["queue", "outcome"],
        )?;
        registry.register(Box::new(entries_total.clone()))?;
        Ok(Self { entries_total })
    }
}

#[async_trait]
impl ReplayMetrics for PrometheusReplayMetrics {
    async fn record(
        &self,
        kind: QueueKind,
        outcome: ReplayOutcome,
    ) -> Result<(), ReplayMetricsError> {
        self.entries_total
            .with_label_values(&[kind.namespace(), outcome.label()])
            .inc();
        Ok(())
    }
}
