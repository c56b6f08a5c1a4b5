//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: SQLite queues, response cache and version ledger via
//!   Diesel
//! - **http**: reqwest-backed upstream transport
//! - **sync**: in-process deferred-sync registry
//! - **metrics**: Prometheus exporters (feature-gated)
//!
//! Adapters are thin translators between domain types and infrastructure
//! representations. They contain no business logic.

pub mod http;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod persistence;
pub mod sync;
