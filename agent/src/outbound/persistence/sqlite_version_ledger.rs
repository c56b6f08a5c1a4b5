//! SQLite-backed `VersionLedger`, a single row in `agent_state`.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::connection::SqliteStore;
use super::error_mapping::map_diesel_error;
use super::models::AgentStateRow;
use super::schema::agent_state;
use crate::domain::ports::{VersionLedger, VersionLedgerError};

const ACTIVE_VERSION_KEY: &str = "active_version";

#[derive(Clone)]
pub struct SqliteVersionLedger {
    store: SqliteStore,
}

impl SqliteVersionLedger {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

fn map_error(error: diesel::result::Error) -> VersionLedgerError {
    map_diesel_error(error, VersionLedgerError::backend, VersionLedgerError::backend)
}

#[async_trait]
impl VersionLedger for SqliteVersionLedger {
    async fn active_version(&self) -> Result<Option<String>, VersionLedgerError> {
        let mut conn = self.store.connection().await;
        agent_state::table
            .find(ACTIVE_VERSION_KEY)
            .select(agent_state::value)
            .first::<String>(&mut *conn)
            .await
            .optional()
            .map_err(map_error)
    }

    async fn record_active_version(&self, version: &str) -> Result<(), VersionLedgerError> {
        let mut conn = self.store.connection().await;
        diesel::replace_into(agent_state::table)
            .values(&AgentStateRow {
                key: ACTIVE_VERSION_KEY,
                value: version,
            })
            .execute(&mut *conn)
            .await
            .map(drop)
            .map_err(map_error)
    }
}
