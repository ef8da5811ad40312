use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;

use crate::connection::Connection;
use crate::error::SqlDbError;
use crate::logger::Logger;
use crate::results::Row;
use crate::types::{IsolationLevel, Value};

/// Options handed to [`Driver::initialize`].
#[derive(Clone)]
pub struct DriverOptions {
    pub logger: Arc<dyn Logger>,
}

impl fmt::Debug for DriverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverOptions")
            .field("logger", &"<dyn Logger>")
            .finish()
    }
}

/// The capability set a backend implements to be driven by the middleware.
///
/// The driver owns physical connectivity (pooling, sockets, files). The middleware only borrows
/// a [`Client`](Driver::Client) for the duration of one unit of work and always hands it back
/// through [`release_client`](Driver::release_client).
///
/// `commit_transaction` and `rollback_transaction` are optional: the defaults issue a literal
/// `COMMIT` / `ROLLBACK` through [`query`](Driver::query) on the client.
#[async_trait]
pub trait Driver: Send + Sync + Sized + 'static {
    /// One physical connection, exclusively borrowed by a unit of work.
    type Client: Send + 'static;

    /// Process-wide setup, called once by [`Database::initialize`](crate::db::Database::initialize).
    ///
    /// # Errors
    /// Returns `SqlDbError` if the backend cannot be reached or configured.
    async fn initialize(&self, options: DriverOptions) -> Result<(), SqlDbError>;

    /// # Errors
    /// Returns `SqlDbError` if tearing down the backend fails.
    async fn shutdown(&self) -> Result<(), SqlDbError>;

    /// # Errors
    /// Returns `SqlDbError` if no connection can be acquired.
    async fn get_client(&self) -> Result<Self::Client, SqlDbError>;

    /// # Errors
    /// Returns `SqlDbError` if the connection cannot be returned.
    async fn release_client(&self, client: Self::Client) -> Result<(), SqlDbError>;

    /// Run a statement and return its rows; an empty vector when nothing matched.
    ///
    /// # Errors
    /// Returns `SqlDbError` on any backend failure.
    async fn query(
        &self,
        client: &mut Self::Client,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, SqlDbError>;

    /// Run a statement and return the number of affected rows.
    ///
    /// # Errors
    /// Returns `SqlDbError` on any backend failure.
    async fn exec(
        &self,
        client: &mut Self::Client,
        sql: &str,
        params: &[Value],
    ) -> Result<usize, SqlDbError>;

    /// Run a script that may hold several statements. Backends whose `exec` already accepts
    /// multi-statement text can keep the default.
    ///
    /// # Errors
    /// Returns `SqlDbError` on any backend failure.
    async fn exec_batch(&self, client: &mut Self::Client, sql: &str) -> Result<(), SqlDbError> {
        self.exec(client, sql, &[]).await.map(|_| ())
    }

    /// # Errors
    /// Returns `SqlDbError` if the transaction cannot be started.
    async fn start_transaction(
        &self,
        client: &mut Self::Client,
        isolation_level: &IsolationLevel,
    ) -> Result<(), SqlDbError>;

    /// # Errors
    /// Returns `SqlDbError` if the commit fails.
    async fn commit_transaction(&self, client: &mut Self::Client) -> Result<(), SqlDbError> {
        self.query(client, "COMMIT", &[]).await.map(|_| ())
    }

    /// `cause` is the error that triggered the rollback, if any, for diagnostics only.
    ///
    /// # Errors
    /// Returns `SqlDbError` if the rollback fails.
    async fn rollback_transaction(
        &self,
        client: &mut Self::Client,
        cause: Option<&SqlDbError>,
    ) -> Result<(), SqlDbError> {
        let _ = cause;
        self.query(client, "ROLLBACK", &[]).await.map(|_| ())
    }

    /// Create the bookkeeping table if it is missing; a no-op otherwise.
    ///
    /// # Errors
    /// Returns `SqlDbError` on any backend failure.
    async fn ensure_migrations_table(&self, table_name: &str) -> Result<(), SqlDbError>;

    /// Names of applied migrations, ascending. Empty when the table does not exist yet.
    ///
    /// # Errors
    /// Returns `SqlDbError` on any backend failure.
    async fn list_executed_migration_names(
        &self,
        table_name: &str,
    ) -> Result<Vec<String>, SqlDbError>;

    /// Record `migration_name` as applied, through `conn` so the record shares the
    /// migration's transaction.
    ///
    /// # Errors
    /// Returns `SqlDbError` on any backend failure.
    async fn log_migration_successful<'c>(
        &self,
        conn: &mut Connection<'c, Self>,
        table_name: &str,
        migration_name: &str,
    ) -> Result<(), SqlDbError>;

    /// Isolation level every migration runs at.
    fn migration_isolation_level(&self) -> IsolationLevel;

    /// Isolation tokens this driver understands, exposed through
    /// [`Database::isolation_levels`](crate::db::Database::isolation_levels).
    fn isolation_levels(&self) -> Vec<IsolationLevel> {
        Vec::new()
    }
}

/// Backends shipped with this crate, selectable by name (CLI, config files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DatabaseType {
    /// `SQLite` through rusqlite
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl DatabaseType {
    /// Names accepted by [`DatabaseType::from_str`].
    #[must_use]
    pub fn known_names() -> Vec<&'static str> {
        let mut names = Vec::new();
        #[cfg(feature = "sqlite")]
        names.push("sqlite");
        names
    }
}

impl FromStr for DatabaseType {
    type Err = SqlDbError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => Ok(DatabaseType::Sqlite),
            _ => Err(SqlDbError::ConfigError(format!(
                "Invalid DB driver '{name}', known drivers: [{}]",
                Self::known_names().join(", ")
            ))),
        }
    }
}
