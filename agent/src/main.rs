//! Agent entry-point: loads settings, opens the store, starts the agent and
//! serves the intercepting proxy until shutdown.

mod server;

use std::env;
use std::sync::Arc;

use actix_web::web;
use color_eyre::eyre::{Context, Result, eyre};
use ortho_config::OrthoConfig;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use offline_agent::config::AgentSettings;
use offline_agent::domain::{AgentPorts, AgentRuntime, OfflineAgent};
use offline_agent::inbound::http::HttpState;
use offline_agent::outbound::http::ReqwestTransport;
use offline_agent::outbound::persistence::{
    SqliteQueueStore, SqliteResponseCache, SqliteStore, SqliteVersionLedger,
};
use offline_agent::outbound::sync::InProcessSyncRegistry;

use server::{build_replay_metrics, create_server};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = AgentSettings::load_from_iter(env::args_os())
        .map_err(|err| eyre!("failed to load agent settings: {err}"))?;
    let bind_addr = settings.bind_addr()?;
    let config = settings.to_agent_config()?;

    let store = SqliteStore::open(settings.store_config())
        .await
        .wrap_err("failed to open the offline store")?;
    let transport = ReqwestTransport::new(settings.request_timeout())
        .wrap_err("failed to build the upstream client")?;
    let registry = Arc::new(InProcessSyncRegistry::new());

    let runtime = AgentRuntime::default();
    let (server_config, metrics) = build_replay_metrics(bind_addr)?;
    let server_config = server_config.with_max_body_bytes(settings.max_body_bytes());

    let agent = Arc::new(OfflineAgent::new(
        config,
        AgentPorts {
            transport: Arc::new(transport),
            queue_store: Arc::new(
                SqliteQueueStore::new(store.clone()).with_clock(Arc::clone(&runtime.clock)),
            ),
            cache: Arc::new(SqliteResponseCache::new(store.clone())),
            ledger: Arc::new(SqliteVersionLedger::new(store)),
            scheduler: Arc::clone(&registry) as _,
            metrics,
        },
        runtime,
    )?);
    agent.start().await?;

    let state = web::Data::new(HttpState::new(Arc::clone(&agent)));
    let server = create_server(state, server_config)?;
    info!(%bind_addr, version = %agent.config().app_version, "offline agent listening");
    let served = server.await;

    registry.close();
    agent.stop().await;
    served.wrap_err("http server failed")
}
