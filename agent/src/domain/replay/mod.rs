//! Ordered replay of the durable queues.
//!
//! A drain runs in two phases. [`ReplayEngine::snapshot`] reads every live
//! entry of one queue into memory and releases the store before any network
//! call. [`ReplayEngine::process`] then walks that snapshot oldest-first,
//! deleting each entry only after upstream accepted it, and stops at the first
//! entry that fails so later entries never overtake an earlier one. Entries
//! that could never be sent (corrupt rows, requests the transport refuses to
//! build) are deleted and skipped instead.
//!
//! Only one drain per queue runs at a time inside a process; a concurrent
//! trigger gets [`DrainStatus::AlreadyDraining`] straight away.

mod policy;
mod request;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

pub use policy::{ReplayPolicy, is_permanent_rejection};
pub use request::rebuild_request;

use crate::domain::SharedClock;
use crate::domain::TraceId;
use crate::domain::ports::{
    QueueStore, QueueStoreError, ReplayMetrics, ReplayOutcome, UpstreamTransport,
};
use crate::domain::records::{QueueKind, SequenceKey, StoredEntry};

/// Why a drain stopped before the end of its snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// Upstream could not be reached or timed out.
    Transport { key: SequenceKey, message: String },
    /// Upstream answered with a non-2xx status.
    Rejected { key: SequenceKey, status: u16 },
    /// The snapshot could not be read.
    Storage { message: String },
}

/// Terminal state of one drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStatus {
    /// Every entry of the snapshot was handled.
    Completed,
    /// Stopped early; the remaining entries stay queued.
    Halted(HaltReason),
    /// Another drain of the same queue was already running.
    AlreadyDraining,
}

/// Outcome of one drain, logged and returned to manual callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub kind: QueueKind,
    pub status: DrainStatus,
    pub delivered: usize,
    pub discarded: usize,
    pub abandoned: usize,
    /// Snapshot entries left untouched because the drain halted.
    pub remaining: usize,
}

impl DrainReport {
    const fn empty(kind: QueueKind, status: DrainStatus) -> Self {
        Self {
            kind,
            status,
            delivered: 0,
            discarded: 0,
            abandoned: 0,
            remaining: 0,
        }
    }

    /// The halt reason, if the drain stopped early.
    #[must_use]
    pub const fn halted(&self) -> Option<&HaltReason> {
        match &self.status {
            DrainStatus::Halted(reason) => Some(reason),
            DrainStatus::Completed | DrainStatus::AlreadyDraining => None,
        }
    }

    /// Whether the drain stopped because upstream was unreachable.
    #[must_use]
    pub const fn halted_offline(&self) -> bool {
        matches!(self.halted(), Some(HaltReason::Transport { .. }))
    }
}

/// Entries of one queue captured at a point in time, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    kind: QueueKind,
    entries: Vec<StoredEntry>,
}

impl QueueSnapshot {
    /// Queue the snapshot was taken from.
    #[must_use]
    pub const fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Captured entries.
    #[must_use]
    pub fn entries(&self) -> &[StoredEntry] {
        &self.entries
    }
}

/// Ports the replay engine drives.
#[derive(Clone)]
pub struct ReplayPorts {
    pub store: Arc<dyn QueueStore>,
    pub transport: Arc<dyn UpstreamTransport>,
    pub metrics: Arc<dyn ReplayMetrics>,
}

/// Replays queued records against upstream.
pub struct ReplayEngine {
    ports: ReplayPorts,
    clock: SharedClock,
    policy: ReplayPolicy,
    draining: Mutex<BTreeSet<QueueKind>>,
    last_reports: Mutex<BTreeMap<QueueKind, DrainReport>>,
}

struct DrainGuard<'a> {
    draining: &'a Mutex<BTreeSet<QueueKind>>,
    kind: QueueKind,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.draining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.kind);
    }
}

/// What the dead-letter policy made of a server rejection.
enum Rejection {
    Retry,
    Abandoned,
    /// `record_rejection` found no row: another process settled it.
    Gone,
}

enum EntryOutcome {
    Delivered,
    Discarded,
    Abandoned,
    Halt(HaltReason),
}

impl ReplayEngine {
    /// Create an engine.
    pub fn new(ports: ReplayPorts, clock: SharedClock, policy: ReplayPolicy) -> Self {
        Self {
            ports,
            clock,
            policy,
            draining: Mutex::new(BTreeSet::new()),
            last_reports: Mutex::new(BTreeMap::new()),
        }
    }

    /// Phase one: read every live entry of `kind`, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates the store's read failure.
    pub async fn snapshot(&self, kind: QueueKind) -> Result<QueueSnapshot, QueueStoreError> {
        let entries = self.ports.store.snapshot(kind).await?;
        Ok(QueueSnapshot { kind, entries })
    }

    /// Phase two: replay `snapshot` in order, halting at the first failure.
    pub async fn process(&self, snapshot: QueueSnapshot) -> DrainReport {
        let QueueSnapshot { kind, entries } = snapshot;
        let total = entries.len();
        let mut report = DrainReport::empty(kind, DrainStatus::Completed);

        for (index, entry) in entries.into_iter().enumerate() {
            match self.replay_entry(kind, entry).await {
                EntryOutcome::Delivered => report.delivered += 1,
                EntryOutcome::Discarded => report.discarded += 1,
                EntryOutcome::Abandoned => report.abandoned += 1,
                EntryOutcome::Halt(reason) => {
                    self.count(kind, ReplayOutcome::Halted).await;
                    report.remaining = total - index;
                    report.status = DrainStatus::Halted(reason);
                    break;
                }
            }
        }
        report
    }

    /// Snapshot and process `kind` unless a drain of it is already running.
    pub async fn drain(&self, kind: QueueKind) -> DrainReport {
        let Some(_guard) = self.try_begin(kind) else {
            debug!(queue = %kind, "drain already in progress");
            return DrainReport::empty(kind, DrainStatus::AlreadyDraining);
        };

        let report = TraceId::scope(TraceId::current_or_generate(), async {
            match self.snapshot(kind).await {
                Ok(snapshot) if snapshot.entries.is_empty() => {
                    DrainReport::empty(kind, DrainStatus::Completed)
                }
                Ok(snapshot) => self.process(snapshot).await,
                Err(error) => {
                    warn!(queue = %kind, %error, "queue snapshot failed");
                    DrainReport::empty(
                        kind,
                        DrainStatus::Halted(HaltReason::Storage {
                            message: error.to_string(),
                        }),
                    )
                }
            }
        })
        .await;

        log_report(&report);
        self.last_reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, report.clone());
        report
    }

    /// Drain both queues concurrently; neither waits for the other.
    pub async fn drain_all(&self) -> Vec<DrainReport> {
        let (mutations, photos) =
            tokio::join!(self.drain(QueueKind::Mutation), self.drain(QueueKind::Photo));
        vec![mutations, photos]
    }

    /// Whether a drain of `kind` is running right now.
    #[must_use]
    pub fn is_draining(&self, kind: QueueKind) -> bool {
        self.draining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind)
    }

    /// Report of the most recent finished drain of `kind`.
    #[must_use]
    pub fn last_report(&self, kind: QueueKind) -> Option<DrainReport> {
        self.last_reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }

    fn try_begin(&self, kind: QueueKind) -> Option<DrainGuard<'_>> {
        let inserted = self
            .draining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
        inserted.then_some(DrainGuard {
            draining: &self.draining,
            kind,
        })
    }

    async fn replay_entry(&self, kind: QueueKind, entry: StoredEntry) -> EntryOutcome {
        let (key, record) = match entry {
            StoredEntry::Corrupt { key, reason } => {
                warn!(queue = %kind, %key, %reason, "discarding corrupt queue entry");
                self.delete(kind, key).await;
                self.count(kind, ReplayOutcome::Discarded).await;
                return EntryOutcome::Discarded;
            }
            StoredEntry::Valid { key, record } => (key, record),
        };

        let url = record.url().clone();
        match self.ports.transport.send(rebuild_request(&record)).await {
            Ok(response) if response.is_success() => {
                debug!(queue = %kind, %key, %url, status = response.status, "replayed");
                self.delete(kind, key).await;
                self.count(kind, ReplayOutcome::Delivered).await;
                EntryOutcome::Delivered
            }
            Ok(response) => {
                let status = response.status;
                match self.settle_rejection(kind, key, status).await {
                    Rejection::Retry => {
                        info!(queue = %kind, %key, %url, status, "replay rejected, halting drain");
                        EntryOutcome::Halt(HaltReason::Rejected { key, status })
                    }
                    Rejection::Abandoned => {
                        self.count(kind, ReplayOutcome::Abandoned).await;
                        EntryOutcome::Abandoned
                    }
                    Rejection::Gone => {
                        debug!(queue = %kind, %key, "rejected entry already removed elsewhere");
                        EntryOutcome::Discarded
                    }
                }
            }
            Err(error) if error.is_connectivity() => {
                info!(queue = %kind, %key, %url, %error, "replay failed, halting drain");
                EntryOutcome::Halt(HaltReason::Transport {
                    key,
                    message: error.to_string(),
                })
            }
            Err(error) => {
                warn!(queue = %kind, %key, %url, %error, "discarding entry that cannot be sent");
                self.delete(kind, key).await;
                self.count(kind, ReplayOutcome::Discarded).await;
                EntryOutcome::Discarded
            }
        }
    }

    async fn settle_rejection(&self, kind: QueueKind, key: SequenceKey, status: u16) -> Rejection {
        let Some(threshold) = self.policy.abandon_after else {
            return Rejection::Retry;
        };
        if !is_permanent_rejection(status) {
            return Rejection::Retry;
        }
        let attempts = match self.ports.store.record_rejection(kind, key).await {
            Ok(0) => return Rejection::Gone,
            Ok(attempts) => attempts,
            Err(error) => {
                warn!(queue = %kind, %key, %error, "failed to record rejection");
                return Rejection::Retry;
            }
        };
        if attempts < threshold {
            return Rejection::Retry;
        }
        match self.ports.store.abandon(kind, key, self.clock.utc()).await {
            Ok(()) => {
                warn!(queue = %kind, %key, status, attempts, "abandoned queue entry");
                Rejection::Abandoned
            }
            Err(error) => {
                warn!(queue = %kind, %key, %error, "failed to abandon queue entry");
                Rejection::Retry
            }
        }
    }

    async fn delete(&self, kind: QueueKind, key: SequenceKey) {
        if let Err(error) = self.ports.store.delete(kind, key).await {
            warn!(queue = %kind, %key, %error, "failed to delete replayed entry");
        }
    }

    async fn count(&self, kind: QueueKind, outcome: ReplayOutcome) {
        if let Err(error) = self.ports.metrics.record(kind, outcome).await {
            debug!(%error, "failed to record replay metric");
        }
    }
}

fn log_report(report: &DrainReport) {
    match &report.status {
        DrainStatus::Completed if report.delivered + report.discarded + report.abandoned == 0 => {
            debug!(queue = %report.kind, "queue empty");
        }
        DrainStatus::Completed => info!(
            queue = %report.kind,
            delivered = report.delivered,
            discarded = report.discarded,
            abandoned = report.abandoned,
            "queue drained"
        ),
        DrainStatus::Halted(reason) => info!(
            queue = %report.kind,
            delivered = report.delivered,
            remaining = report.remaining,
            ?reason,
            "queue drain halted"
        ),
        DrainStatus::AlreadyDraining => {}
    }
}
