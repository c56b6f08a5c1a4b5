//! Deferred-sync scheduler adapters.

mod in_process;

pub use in_process::InProcessSyncRegistry;
