//! Inbound adapters that translate intercepted traffic and control calls
//! into agent calls while keeping framework details at the edge.

pub mod http;
