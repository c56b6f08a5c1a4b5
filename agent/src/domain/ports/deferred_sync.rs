//! Port for deferred-sync registration.
//!
//! Registering a tag asks the platform to fire it once connectivity is
//! available. The agent's periodic tick collects due tags with
//! [`DeferredSyncScheduler::take_due`].
use async_trait::async_trait;

use super::define_port_error;
use crate::domain::records::SyncTag;

define_port_error! {
    /// Registration failures; callers log these and carry on.
    pub enum SyncRegistrationError {
        /// The facility is closed or unsupported.
        Unavailable => "deferred sync unavailable",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeferredSyncScheduler: Send + Sync {
    /// Ask for `tag` to fire later. Registering a pending tag again is a no-op.
    async fn register(&self, tag: SyncTag) -> Result<(), SyncRegistrationError>;

    /// Remove and return every pending tag.
    async fn take_due(&self) -> Vec<SyncTag>;
}
