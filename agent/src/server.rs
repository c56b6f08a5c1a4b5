//! HTTP server assembly: the proxy app behind the trace middleware and, with
//! the `metrics` feature, Prometheus on `/__offline/metrics`.

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
#[cfg(feature = "metrics")]
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use color_eyre::eyre::Result;
#[cfg(feature = "metrics")]
use color_eyre::eyre::{Context, eyre};

use offline_agent::Trace;
#[cfg(not(feature = "metrics"))]
use offline_agent::domain::ports::NoOpReplayMetrics;
use offline_agent::domain::ports::ReplayMetrics;
use offline_agent::inbound::http::{self, HttpState};
#[cfg(feature = "metrics")]
use offline_agent::outbound::metrics::PrometheusReplayMetrics;

/// Control-prefixed so the proxied application's own `/metrics` still
/// reaches upstream.
#[cfg(feature = "metrics")]
const METRICS_ENDPOINT: &str = "/__offline/metrics";

/// Everything the listener needs besides the agent itself.
pub struct ServerConfig {
    bind_addr: SocketAddr,
    max_body_bytes: usize,
    #[cfg(feature = "metrics")]
    prometheus: PrometheusMetrics,
}

/// Build the server configuration together with the replay metrics sink.
///
/// With the `metrics` feature the replay counters live on the registry the
/// Prometheus middleware serves; without it they are discarded.
///
/// # Errors
/// Fails when the Prometheus middleware or a replay counter cannot be set up.
#[cfg(feature = "metrics")]
pub fn build_replay_metrics(
    bind_addr: SocketAddr,
) -> Result<(ServerConfig, Arc<dyn ReplayMetrics>)> {
    let prometheus = PrometheusMetricsBuilder::new("offline_agent")
        .endpoint(METRICS_ENDPOINT)
        .build()
        .map_err(|err| eyre!("failed to configure Prometheus metrics: {err}"))?;
    let replay = PrometheusReplayMetrics::new(&prometheus.registry)
        .wrap_err("replay metrics registration failed")?;
    Ok((
        ServerConfig {
            bind_addr,
            max_body_bytes: http::DEFAULT_MAX_BODY_BYTES,
            prometheus,
        },
        Arc::new(replay),
    ))
}

#[cfg(not(feature = "metrics"))]
pub fn build_replay_metrics(
    bind_addr: SocketAddr,
) -> Result<(ServerConfig, Arc<dyn ReplayMetrics>)> {
    Ok((
        ServerConfig {
            bind_addr,
            max_body_bytes: http::DEFAULT_MAX_BODY_BYTES,
        },
        Arc::new(NoOpReplayMetrics),
    ))
}

impl ServerConfig {
    /// Replace the request body limit.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Bind the proxy and control routes around the shared agent.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server(state: web::Data<HttpState>, config: ServerConfig) -> std::io::Result<Server> {
    let bind_addr = config.bind_addr;
    let max_body_bytes = config.max_body_bytes;
    let server = HttpServer::new(move || {
        let app = App::new()
            .app_data(state.clone())
            .app_data(http::payload_config(max_body_bytes))
            .wrap(Trace)
            .configure(http::configure);
        #[cfg(feature = "metrics")]
        let app = app.wrap(config.prometheus.clone());
        app
    })
    .bind(bind_addr)?
    .run();
    Ok(server)
}
