//! Middleware shared by the proxy and control routes.

pub mod trace;

pub use trace::Trace;
