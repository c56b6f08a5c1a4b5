//! The agent's single SQLite connection.
//!
//! SQLite serializes writers anyway, so the store keeps one connection behind
//! an async mutex instead of a pool. The synchronous Diesel connection is
//! driven through `diesel-async`'s wrapper, which moves each statement onto
//! the blocking thread pool.
//!
//! Opening applies pragmas, checks `PRAGMA user_version` against the
//! configured schema version and runs the embedded migrations when the file
//! is older.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Schema version written by this build.
pub const DEFAULT_SCHEMA_VERSION: i32 = 9;
/// Default wait for a lock held by another process.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) type AgentConnection = SyncConnectionWrapper<SqliteConnection>;

/// Failures raised while opening the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreOpenError {
    #[error("failed to open database `{path}`: {message}")]
    Open { path: String, message: String },
    #[error("failed to migrate database: {message}")]
    Migration { message: String },
    /// The file was written by a newer build.
    #[error("database schema version {stored} is newer than supported version {supported}")]
    VersionDowngrade { stored: i32, supported: i32 },
}

impl StoreOpenError {
    fn open(path: &Path, message: impl ToString) -> Self {
        Self::Open {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

/// Where and how to open the database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    database_path: PathBuf,
    schema_version: i32,
    busy_timeout: Duration,
    write_ahead_log: bool,
}

impl StoreConfig {
    /// Configuration for `database_path` with default schema version, a
    /// five second busy timeout and write-ahead logging.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            schema_version: DEFAULT_SCHEMA_VERSION,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            write_ahead_log: true,
        }
    }

    #[must_use]
    pub fn with_schema_version(mut self, version: i32) -> Self {
        self.schema_version = version;
        self
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_write_ahead_log(mut self, enabled: bool) -> Self {
        self.write_ahead_log = enabled;
        self
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn schema_version(&self) -> i32 {
        self.schema_version
    }
}

#[derive(QueryableByName)]
struct UserVersion {
    #[diesel(sql_type = Integer)]
    user_version: i32,
}

/// Shared handle to the opened database.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<Mutex<AgentConnection>>,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate the database.
    ///
    /// # Errors
    ///
    /// [`StoreOpenError::VersionDowngrade`] when the file records a newer
    /// schema than `config`; [`StoreOpenError::Open`] or
    /// [`StoreOpenError::Migration`] when SQLite refuses.
    pub async fn open(config: StoreConfig) -> Result<Self, StoreOpenError> {
        let path = config.database_path.clone();
        let connection = tokio::task::spawn_blocking(move || open_blocking(&config))
            .await
            .map_err(|error| StoreOpenError::open(&path, error))??;
        Ok(Self {
            inner: Arc::new(Mutex::new(SyncConnectionWrapper::new(connection))),
        })
    }

    /// Exclusive access to the connection for one operation or transaction.
    pub(crate) async fn connection(&self) -> MutexGuard<'_, AgentConnection> {
        self.inner.lock().await
    }
}

fn open_blocking(config: &StoreConfig) -> Result<SqliteConnection, StoreOpenError> {
    let path = config.database_path.as_path();
    let url = path.to_string_lossy();
    let mut conn =
        SqliteConnection::establish(&url).map_err(|error| StoreOpenError::open(path, error))?;

    let mut pragmas = format!(
        "PRAGMA busy_timeout = {};",
        config.busy_timeout.as_millis()
    );
    if config.write_ahead_log {
        pragmas.push_str(" PRAGMA journal_mode = WAL;");
    }
    conn.batch_execute(&pragmas)
        .map_err(|error| StoreOpenError::open(path, error))?;

    let stored = diesel::sql_query("PRAGMA user_version")
        .get_result::<UserVersion>(&mut conn)
        .map_err(|error| StoreOpenError::open(path, error))?
        .user_version;
    if stored > config.schema_version {
        return Err(StoreOpenError::VersionDowngrade {
            stored,
            supported: config.schema_version,
        });
    }
    if stored < config.schema_version {
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map(|versions| versions.len())
            .map_err(|error| StoreOpenError::Migration {
                message: error.to_string(),
            })?;
        conn.batch_execute(&format!("PRAGMA user_version = {};", config.schema_version))
            .map_err(|error| StoreOpenError::Migration {
                message: error.to_string(),
            })?;
        info!(
            path = %path.display(),
            from = stored,
            to = config.schema_version,
            applied,
            "database schema upgraded"
        );
    }
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn temp_config(dir: &TempDir) -> StoreConfig {
        StoreConfig::new(dir.path().join("agent.db"))
    }

    #[rstest]
    fn config_defaults() {
        let config = StoreConfig::new("offline-agent.db");

        assert_eq!(config.database_path(), Path::new("offline-agent.db"));
        assert_eq!(config.schema_version(), DEFAULT_SCHEMA_VERSION);
        assert_eq!(config.busy_timeout, DEFAULT_BUSY_TIMEOUT);
        assert!(config.write_ahead_log);
    }

    #[tokio::test]
    async fn reopening_at_the_same_version_succeeds() {
        let dir = TempDir::new().expect("tempdir");

        SqliteStore::open(temp_config(&dir)).await.expect("first open");
        SqliteStore::open(temp_config(&dir)).await.expect("second open");
    }

    #[tokio::test]
    async fn upgrading_the_schema_version_keeps_the_file_usable() {
        let dir = TempDir::new().expect("tempdir");
        SqliteStore::open(temp_config(&dir).with_schema_version(3))
            .await
            .expect("old build");

        SqliteStore::open(temp_config(&dir))
            .await
            .expect("new build");
    }

    #[tokio::test]
    async fn opening_with_an_older_version_is_refused() {
        let dir = TempDir::new().expect("tempdir");
        SqliteStore::open(temp_config(&dir)).await.expect("open");

        let error = SqliteStore::open(temp_config(&dir).with_schema_version(8))
            .await
            .err()
            .expect("downgrade refused");

        assert_eq!(
            error,
            StoreOpenError::VersionDowngrade {
                stored: 9,
                supported: 8,
            }
        );
    }

    #[tokio::test]
    async fn missing_directory_fails_to_open() {
        let dir = TempDir::new().expect("tempdir");
        let config = StoreConfig::new(dir.path().join("absent").join("agent.db"));

        let error = SqliteStore::open(config).await.err().expect("open fails");

        assert!(matches!(error, StoreOpenError::Open { .. }));
    }
}
