//! Test helpers for HTTP handlers: an agent over in-memory ports.

use std::sync::Arc;

use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, web};
use url::Url;

use super::state::HttpState;
use crate::Trace;
use crate::domain::ports::NoOpReplayMetrics;
use crate::domain::{AgentConfig, AgentPorts, AgentRuntime, OfflineAgent};
use crate::test_support::{
    InMemoryQueueStore, InMemoryResponseCache, InMemoryVersionLedger, RecordingScheduler,
    ScriptedTransport,
};

pub(crate) struct TestAgent {
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<InMemoryQueueStore>,
    pub agent: Arc<OfflineAgent>,
}

impl TestAgent {
    /// Agent fronting `http://localhost:5173` and the API at
    /// `http://localhost:8000/api/v1/`, with an offline transport.
    pub fn new() -> Self {
        let transport = Arc::new(ScriptedTransport::offline());
        let store = Arc::new(InMemoryQueueStore::default());
        let config = AgentConfig::new(
            Url::parse("http://localhost:5173/").expect("app origin"),
            Url::parse("http://localhost:8000/api/v1/").expect("api base"),
        );
        let agent = OfflineAgent::new(
            config,
            AgentPorts {
                transport: Arc::clone(&transport) as _,
                queue_store: Arc::clone(&store) as _,
                cache: Arc::new(InMemoryResponseCache::default()),
                ledger: Arc::new(InMemoryVersionLedger::default()),
                scheduler: Arc::new(RecordingScheduler::default()),
                metrics: Arc::new(NoOpReplayMetrics),
            },
            AgentRuntime::default(),
        )
        .expect("valid agent");
        Self {
            transport,
            store,
            agent: Arc::new(agent),
        }
    }

    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        > + use<>,
    > {
        App::new()
            .app_data(web::Data::new(HttpState::new(Arc::clone(&self.agent))))
            .app_data(super::payload_config(super::DEFAULT_MAX_BODY_BYTES))
            .wrap(Trace)
            .configure(super::configure)
    }
}

pub(crate) fn test_agent() -> TestAgent {
    TestAgent::new()
}
