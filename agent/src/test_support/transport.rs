//! Scripted upstream transport.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use super::lock;
use crate::domain::http::{AgentResponse, UpstreamRequest};
use crate::domain::ports::{TransportError, UpstreamTransport};

type Outcome = Result<AgentResponse, TransportError>;

/// Transport that answers from a script, then from a default, and records
/// every request it sees.
///
/// [`ScriptedTransport::hold`] parks calls after they are recorded until
/// [`ScriptedTransport::release`], which lets tests observe in-flight state.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    default: Mutex<Outcome>,
    requests: Mutex<Vec<UpstreamRequest>>,
    calls: watch::Sender<usize>,
    held: watch::Sender<bool>,
}

impl ScriptedTransport {
    /// Every unscripted call fails as unreachable.
    pub fn offline() -> Self {
        Self::with_default(Err(TransportError::unreachable("network down")))
    }

    /// Every unscripted call answers `200 {}`.
    pub fn online() -> Self {
        Self::with_default(Ok(AgentResponse::new(200, "{}")))
    }

    fn with_default(default: Outcome) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(default),
            requests: Mutex::new(Vec::new()),
            calls: watch::Sender::new(0),
            held: watch::Sender::new(false),
        }
    }

    /// Queue one outcome ahead of the default.
    pub fn push(&self, outcome: Outcome) {
        lock(&self.script).push_back(outcome);
    }

    /// Replace the default outcome.
    pub fn set_default(&self, outcome: Outcome) {
        *lock(&self.default) = outcome;
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<UpstreamRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.borrow()
    }

    /// Park subsequent calls until [`Self::release`].
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// Wait until at least `count` calls have been recorded.
    pub async fn wait_for_calls(&self, count: usize) {
        let mut calls = self.calls.subscribe();
        let reached = calls.wait_for(|seen| *seen >= count).await.is_ok();
        assert!(reached, "transport dropped while waiting for calls");
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    async fn send(&self, request: UpstreamRequest) -> Result<AgentResponse, TransportError> {
        lock(&self.requests).push(request);
        self.calls.send_modify(|calls| *calls += 1);

        let mut held = self.held.subscribe();
        let released = held.wait_for(|held| !*held).await.is_ok();
        assert!(released, "transport dropped while held");

        let scripted = lock(&self.script).pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => lock(&self.default).clone(),
        }
    }
}
