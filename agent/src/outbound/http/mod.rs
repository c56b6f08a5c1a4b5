//! Upstream HTTP adapters.

mod reqwest_transport;

pub use reqwest_transport::{DEFAULT_REQUEST_TIMEOUT, ReqwestTransport};
