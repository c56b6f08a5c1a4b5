//! Outbound adapters for metrics exporting.
//!
//! Feature-gated behind the `metrics` feature.

mod prometheus_replay;

pub use prometheus_replay::PrometheusReplayMetrics;
