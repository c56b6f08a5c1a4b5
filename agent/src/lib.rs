//! Offline-resilience agent: intercepts application traffic, serves cached
//! reads while disconnected, and durably queues mutations for ordered replay.

pub mod config;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use domain::TraceId;
pub use middleware::Trace;
