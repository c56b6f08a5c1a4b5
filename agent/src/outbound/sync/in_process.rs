//! In-process deferred-sync registry.
//!
//! Tags are held in a set until the agent's tick takes them. Closing the
//! registry makes later registrations fail, which is how a stopped agent
//! reports that nothing will fire.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::ports::{DeferredSyncScheduler, SyncRegistrationError};
use crate::domain::records::SyncTag;

#[derive(Debug, Default)]
struct Registry {
    pending: BTreeSet<SyncTag>,
    closed: bool,
}

/// Deferred-sync scheduler living in the agent process.
#[derive(Debug, Default)]
pub struct InProcessSyncRegistry {
    inner: Mutex<Registry>,
}

impl InProcessSyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse further registrations and drop pending tags.
    pub fn close(&self) {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        registry.closed = true;
        registry.pending.clear();
    }

    /// Tags registered and not yet taken.
    pub fn pending(&self) -> Vec<SyncTag> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .iter()
            .copied()
            .collect()
    }
}

#[async_trait]
impl DeferredSyncScheduler for InProcessSyncRegistry {
    async fn register(&self, tag: SyncTag) -> Result<(), SyncRegistrationError> {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if registry.closed {
            return Err(SyncRegistrationError::unavailable("sync registry closed"));
        }
        if registry.pending.insert(tag) {
            debug!(%tag, "deferred sync registered");
        }
        Ok(())
    }

    async fn take_due(&self) -> Vec<SyncTag> {
        let mut registry = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut registry.pending).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registering_twice_fires_once() {
        let registry = InProcessSyncRegistry::new();

        registry.register(SyncTag::Api).await.expect("register");
        registry.register(SyncTag::Api).await.expect("register again");
        registry.register(SyncTag::Photos).await.expect("register");

        assert_eq!(registry.take_due().await, vec![SyncTag::Api, SyncTag::Photos]);
        assert!(registry.take_due().await.is_empty());
    }

    #[tokio::test]
    async fn closed_registry_refuses_registrations() {
        let registry = InProcessSyncRegistry::new();
        registry.register(SyncTag::Api).await.expect("register");

        registry.close();

        assert!(registry.pending().is_empty());
        let error = registry
            .register(SyncTag::Photos)
            .await
            .expect_err("closed");
        assert!(matches!(error, SyncRegistrationError::Unavailable { .. }));
    }
}
