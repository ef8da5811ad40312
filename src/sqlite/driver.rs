use std::sync::Arc;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use tokio::sync::RwLock;

use super::config::{SqliteManager, SqliteOptions, run_blocking};
use super::params::Params;
use super::query::build_rows;
use crate::connection::Connection;
use crate::driver::{Driver, DriverOptions};
use crate::error::SqlDbError;
use crate::logger::Logger;
use crate::results::Row;
use crate::types::{IsolationLevel, Value};

/// `BEGIN DEFERRED`: locks are taken lazily by the first read or write.
pub const DEFERRED: IsolationLevel = IsolationLevel::from_static("deferred");
/// `BEGIN IMMEDIATE`: the write lock is taken up front.
pub const IMMEDIATE: IsolationLevel = IsolationLevel::from_static("immediate");
/// `BEGIN EXCLUSIVE`
pub const EXCLUSIVE: IsolationLevel = IsolationLevel::from_static("exclusive");

/// A pooled connection checked out for one unit of work.
pub type SqliteClient = PooledConnection<'static, SqliteManager>;

struct Ready {
    pool: Pool<SqliteManager>,
    logger: Arc<dyn Logger>,
}

/// [`Driver`] over rusqlite, pooled with bb8. Every call runs on tokio's blocking pool.
///
/// Isolation tokens are the `SQLite` transaction modes: [`DEFERRED`], [`IMMEDIATE`] and
/// [`EXCLUSIVE`], matched case-insensitively.
pub struct SqliteDriver {
    options: SqliteOptions,
    state: RwLock<Option<Ready>>,
}

impl SqliteDriver {
    #[must_use]
    pub fn new(options: SqliteOptions) -> Self {
        Self {
            options,
            state: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }

    async fn pool(&self) -> Result<Pool<SqliteManager>, SqlDbError> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|ready| ready.pool.clone())
            .ok_or_else(|| SqlDbError::ConfigError("SQLite driver not initialized".to_string()))
    }

    async fn batch(&self, client: &mut SqliteClient, sql: &str) -> Result<(), SqlDbError> {
        let sql = sql.to_string();
        run_blocking(Arc::clone(&**client), move |conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })
        .await
    }

    /// Run a statement on a client of its own, outside any unit of work.
    async fn standalone<T, F>(&self, func: F) -> Result<T, SqlDbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, SqlDbError> + Send + 'static,
        T: Send + 'static,
    {
        let client = self.get_client().await?;
        let result = run_blocking(Arc::clone(&*client), func).await;
        self.release_client(client).await?;
        result
    }
}

fn begin_statement(isolation_level: &IsolationLevel) -> Result<&'static str, SqlDbError> {
    match isolation_level.as_str().to_ascii_lowercase().as_str() {
        "deferred" => Ok("BEGIN DEFERRED"),
        "immediate" => Ok("BEGIN IMMEDIATE"),
        "exclusive" => Ok("BEGIN EXCLUSIVE"),
        other => Err(SqlDbError::ConfigError(format!(
            "Unsupported SQLite isolation level '{other}', expected one of: deferred, immediate, exclusive"
        ))),
    }
}

/// Quote a table name after checking it is a plain identifier.
fn quoted_identifier(name: &str) -> Result<String, SqlDbError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(SqlDbError::ConfigError(format!(
            "Invalid migrations table name '{name}'"
        )));
    }
    Ok(format!("\"{name}\""))
}

#[async_trait]
impl Driver for SqliteDriver {
    type Client = SqliteClient;

    async fn initialize(&self, options: DriverOptions) -> Result<(), SqlDbError> {
        self.options.validate()?;
        let mut state = self.state.write().await;
        if state.is_some() {
            return Err(SqlDbError::ConfigError(
                "SQLite driver already initialized".to_string(),
            ));
        }

        let pool = SqliteManager::new(&self.options)
            .build_pool(self.options.pool_size)
            .await?;
        if self.options.wal {
            let conn = pool
                .get()
                .await
                .map_err(|e| SqlDbError::ConnectionError(format!("sqlite checkout error: {e}")))?;
            let mode = run_blocking(Arc::clone(&*conn), |guard| {
                let mode: String =
                    guard.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
                Ok(mode)
            })
            .await?;
            options.logger.debug(&format!("SQLite journal mode: {mode}"));
        }

        options.logger.debug(&format!(
            "SQLite pool ready for {} ({} connections)",
            self.options.db_path, self.options.pool_size
        ));
        *state = Some(Ready {
            pool,
            logger: options.logger,
        });
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SqlDbError> {
        if let Some(ready) = self.state.write().await.take() {
            ready.logger.debug("SQLite pool closed");
        }
        Ok(())
    }

    async fn get_client(&self) -> Result<Self::Client, SqlDbError> {
        self.pool()
            .await?
            .get_owned()
            .await
            .map_err(|e| SqlDbError::ConnectionError(format!("sqlite checkout error: {e}")))
    }

    async fn release_client(&self, client: Self::Client) -> Result<(), SqlDbError> {
        drop(client);
        Ok(())
    }

    async fn query(
        &self,
        client: &mut Self::Client,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, SqlDbError> {
        let sql = sql.to_string();
        let params = Params::convert(params);
        run_blocking(Arc::clone(&**client), move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            build_rows(&mut stmt, params.as_values())
        })
        .await
    }

    async fn exec(
        &self,
        client: &mut Self::Client,
        sql: &str,
        params: &[Value],
    ) -> Result<usize, SqlDbError> {
        let sql = sql.to_string();
        let params = Params::convert(params);
        run_blocking(Arc::clone(&**client), move |conn| {
            let count = conn.execute(&sql, rusqlite::params_from_iter(params.as_values()))?;
            Ok(count)
        })
        .await
    }

    async fn exec_batch(&self, client: &mut Self::Client, sql: &str) -> Result<(), SqlDbError> {
        self.batch(client, sql).await
    }

    async fn start_transaction(
        &self,
        client: &mut Self::Client,
        isolation_level: &IsolationLevel,
    ) -> Result<(), SqlDbError> {
        let begin = begin_statement(isolation_level)?;
        self.batch(client, begin).await
    }

    async fn commit_transaction(&self, client: &mut Self::Client) -> Result<(), SqlDbError> {
        self.batch(client, "COMMIT").await
    }

    async fn rollback_transaction(
        &self,
        client: &mut Self::Client,
        _cause: Option<&SqlDbError>,
    ) -> Result<(), SqlDbError> {
        self.batch(client, "ROLLBACK").await
    }

    async fn ensure_migrations_table(&self, table_name: &str) -> Result<(), SqlDbError> {
        let table = quoted_identifier(table_name)?;
        self.standalone(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    name TEXT PRIMARY KEY NOT NULL,
                    executed_at TEXT NOT NULL
                );"
            ))?;
            Ok(())
        })
        .await
    }

    async fn list_executed_migration_names(
        &self,
        table_name: &str,
    ) -> Result<Vec<String>, SqlDbError> {
        let table = quoted_identifier(table_name)?;
        let name = table_name.to_string();
        self.standalone(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                rusqlite::params![name],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(Vec::new());
            }
            let mut stmt = conn.prepare(&format!("SELECT name FROM {table} ORDER BY name"))?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn log_migration_successful<'c>(
        &self,
        conn: &mut Connection<'c, Self>,
        table_name: &str,
        migration_name: &str,
    ) -> Result<(), SqlDbError> {
        let table = quoted_identifier(table_name)?;
        conn.exec(
            &format!("INSERT INTO {table} (name, executed_at) VALUES (?1, ?2)"),
            &[
                Value::from(migration_name),
                Value::Timestamp(chrono::Utc::now().naive_utc()),
            ],
        )
        .await
        .map(|_| ())
    }

    fn migration_isolation_level(&self) -> IsolationLevel {
        IMMEDIATE
    }

    fn isolation_levels(&self) -> Vec<IsolationLevel> {
        vec![DEFERRED, IMMEDIATE, EXCLUSIVE]
    }
}
