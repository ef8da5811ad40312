use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bb8::{ManageConnection, Pool};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use crate::error::SqlDbError;

/// A rusqlite connection shared between the pool and blocking worker threads.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// Path that opens a private in-memory database per connection.
pub const IN_MEMORY: &str = ":memory:";

/// Options for the `SQLite` driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteOptions {
    pub db_path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_busy_timeout", with = "busy_timeout_ms")]
    pub busy_timeout: Duration,
    /// Switch the database to write-ahead logging on startup
    #[serde(default = "default_wal")]
    pub wal: bool,
}

fn default_pool_size() -> u32 {
    4
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_wal() -> bool {
    true
}

mod busy_timeout_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            pool_size: default_pool_size(),
            busy_timeout: default_busy_timeout(),
            wal: default_wal(),
        }
    }

    #[must_use]
    pub fn builder(db_path: impl Into<String>) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    /// # Errors
    /// Returns `SqlDbError::ConfigError` for an empty path, a zero pool size, or an in-memory
    /// database with more than one pooled connection (each would open its own database).
    pub fn validate(&self) -> Result<(), SqlDbError> {
        if self.db_path.is_empty() {
            return Err(SqlDbError::ConfigError(
                "SQLite db_path must not be empty".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(SqlDbError::ConfigError(
                "SQLite pool_size must be at least 1".to_string(),
            ));
        }
        if self.db_path == IN_MEMORY && self.pool_size > 1 {
            return Err(SqlDbError::ConfigError(format!(
                "SQLite {IN_MEMORY} database needs pool_size 1, got {}",
                self.pool_size
            )));
        }
        Ok(())
    }
}

/// Fluent builder for [`SqliteOptions`].
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.opts.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }
}

/// bb8 manager opening rusqlite connections on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    db_path: String,
    busy_timeout: Duration,
}

impl SqliteManager {
    #[must_use]
    pub fn new(options: &SqliteOptions) -> Self {
        Self {
            db_path: options.db_path.clone(),
            busy_timeout: options.busy_timeout,
        }
    }

    /// # Errors
    /// Returns `SqlDbError::ConnectionError` if the first connection cannot be opened.
    pub async fn build_pool(self, max_size: u32) -> Result<Pool<SqliteManager>, SqlDbError> {
        Pool::builder()
            .max_size(max_size)
            .build(self)
            .await
            .map_err(|e| SqlDbError::ConnectionError(format!("sqlite pool error: {e}")))
    }
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = SqlDbError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let db_path = self.db_path.clone();
        let busy_timeout = self.busy_timeout;
        async move {
            let conn = spawn_blocking(move || -> Result<rusqlite::Connection, SqlDbError> {
                let conn = rusqlite::Connection::open(&db_path)?;
                conn.busy_timeout(busy_timeout)?;
                Ok(conn)
            })
            .await
            .map_err(|e| SqlDbError::ConnectionError(format!("sqlite open join error: {e}")))??;
            Ok(Arc::new(Mutex::new(conn)))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let conn = Arc::clone(conn);
        async move {
            run_blocking(conn, |guard| {
                guard.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
        }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Run `func` against the locked connection on tokio's blocking pool.
pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, SqlDbError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlDbError> + Send + 'static,
    R: Send + 'static,
{
    spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| SqlDbError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}
