//! Port recording which deployed version is currently active.
use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors raised while reading or writing the active version.
    pub enum VersionLedgerError {
        Backend => "version ledger failure",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionLedger: Send + Sync {
    /// Version recorded by the last activation, if any.
    async fn active_version(&self) -> Result<Option<String>, VersionLedgerError>;

    /// Record `version` as active.
    async fn record_active_version(&self, version: &str) -> Result<(), VersionLedgerError>;
}
