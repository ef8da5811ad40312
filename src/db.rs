use std::sync::Arc;

use crate::config::DbOptions;
use crate::connection::Connection;
use crate::driver::{Driver, DriverOptions};
use crate::error::SqlDbError;
use crate::manager::{ConnectionManager, UseWith};
use crate::migrations::{MigrationOptions, MigrationReport, MigrationSource, Migrator};
use crate::results::Row;
use crate::types::{IsolationLevel, Value};

struct Ready<D: Driver> {
    manager: ConnectionManager<D>,
    migrations: MigrationOptions,
    migration_source: Option<Arc<dyn MigrationSource<D>>>,
}

enum State<D: Driver> {
    Uninitialized,
    Ready(Box<Ready<D>>),
    ShutDown,
}

/// Lifecycle of a [`Database`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    Uninitialized,
    Ready,
    /// Shut down; may be initialized again.
    ShutDown,
}

/// Entry point owning one driver and its [`ConnectionManager`].
///
/// ```rust,ignore
/// let mut db = Database::new();
/// db.initialize(SqliteDriver::new(SqliteOptions::new("app.db")), DbOptions::new()).await?;
/// let rows = db.query(UseWith::NoTransaction, "SELECT * FROM users", &[]).await?;
/// db.shutdown().await?;
/// ```
///
/// Every operation other than [`initialize`](Database::initialize) returns a configuration
/// error until the handle is initialized, and again after [`shutdown`](Database::shutdown).
pub struct Database<D: Driver> {
    state: State<D>,
}

impl<D: Driver> Default for Database<D> {
    fn default() -> Self {
        Self {
            state: State::Uninitialized,
        }
    }
}

impl<D: Driver> Database<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a handle and initialize it in one step.
    ///
    /// # Errors
    /// See [`Database::initialize`].
    pub async fn open(driver: D, options: DbOptions<D>) -> Result<Self, SqlDbError> {
        let mut db = Self::new();
        db.initialize(driver, options).await?;
        Ok(db)
    }

    /// Initialize `driver` with the chosen logger, build the connection manager and, when
    /// requested, apply pending migrations.
    ///
    /// A failing migration does not fail initialization; it is logged and reported in the
    /// returned [`MigrationReport`].
    ///
    /// # Errors
    /// Returns `SqlDbError::ConfigError` when already initialized or when `options` are
    /// invalid, before touching the driver. Returns the driver's error if its initialization
    /// fails, in which case the handle stays uninitialized. Returns the migration discovery
    /// error if pending migrations cannot be listed; the handle is ready in that case.
    pub async fn initialize(
        &mut self,
        driver: D,
        options: DbOptions<D>,
    ) -> Result<Option<MigrationReport>, SqlDbError> {
        if matches!(self.state, State::Ready(_)) {
            return Err(SqlDbError::ConfigError("DB already initialized".to_string()));
        }
        options.retry.validate()?;
        options.migrations.validate()?;
        if options.run_migrations && options.migration_source.is_none() {
            return Err(SqlDbError::ConfigError(
                "run_migrations requested without a migration source".to_string(),
            ));
        }

        let logger = options.logger.resolve();
        driver
            .initialize(DriverOptions {
                logger: Arc::clone(&logger),
            })
            .await?;

        self.state = State::Ready(Box::new(Ready {
            manager: ConnectionManager::new(Arc::new(driver), logger, options.retry),
            migrations: options.migrations,
            migration_source: options.migration_source,
        }));

        if options.run_migrations {
            return self.run_migrations().await.map(Some);
        }
        Ok(None)
    }

    /// Shut the driver down and clear the manager. The handle can be initialized again.
    ///
    /// # Errors
    /// Returns `SqlDbError::ConfigError` when not initialized, or the driver's shutdown error;
    /// the manager is cleared either way.
    pub async fn shutdown(&mut self) -> Result<(), SqlDbError> {
        match std::mem::replace(&mut self.state, State::ShutDown) {
            State::Ready(ready) => ready.manager.shutdown().await,
            previous => {
                self.state = previous;
                Err(SqlDbError::not_initialized())
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> DatabaseState {
        match self.state {
            State::Uninitialized => DatabaseState::Uninitialized,
            State::Ready(_) => DatabaseState::Ready,
            State::ShutDown => DatabaseState::ShutDown,
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    fn ready(&self) -> Result<&Ready<D>, SqlDbError> {
        match &self.state {
            State::Ready(ready) => Ok(ready),
            State::Uninitialized | State::ShutDown => Err(SqlDbError::not_initialized()),
        }
    }

    /// # Errors
    /// Returns `SqlDbError::ConfigError` when not initialized.
    pub fn manager(&self) -> Result<&ConnectionManager<D>, SqlDbError> {
        self.ready().map(|ready| &ready.manager)
    }

    /// # Errors
    /// Returns `SqlDbError::ConfigError` when not initialized.
    pub fn driver(&self) -> Result<&Arc<D>, SqlDbError> {
        self.manager().map(ConnectionManager::driver)
    }

    /// Isolation tokens declared by the driver; empty until initialized.
    #[must_use]
    pub fn isolation_levels(&self) -> Vec<IsolationLevel> {
        self.manager()
            .map(|manager| manager.driver().isolation_levels())
            .unwrap_or_default()
    }

    /// # Errors
    /// See [`ConnectionManager::use_connection`].
    pub async fn use_connection<'r, 'c: 'r, T, F>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        work: F,
    ) -> Result<T, SqlDbError>
    where
        F: AsyncFnOnce(&mut Connection<'_, D>) -> Result<T, SqlDbError>,
    {
        self.manager()?.use_connection(target, work).await
    }

    /// # Errors
    /// See [`ConnectionManager::use_with_retry`].
    pub async fn use_with_retry<'r, 'c: 'r, T, F>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        work: F,
    ) -> Result<T, SqlDbError>
    where
        F: AsyncFn(&mut Connection<'_, D>) -> Result<T, SqlDbError>,
    {
        self.manager()?.use_with_retry(target, work).await
    }

    /// # Errors
    /// See [`ConnectionManager::query`].
    pub async fn query<'r, 'c: 'r>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, SqlDbError> {
        self.manager()?.query(target, sql, params).await
    }

    /// # Errors
    /// See [`ConnectionManager::query_single`].
    pub async fn query_single<'r, 'c: 'r>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, SqlDbError> {
        self.manager()?.query_single(target, sql, params).await
    }

    /// # Errors
    /// See [`ConnectionManager::exec`].
    pub async fn exec<'r, 'c: 'r>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sql: &str,
        params: &[Value],
    ) -> Result<usize, SqlDbError> {
        self.manager()?.exec(target, sql, params).await
    }

    /// # Errors
    /// See [`ConnectionManager::exec_all`].
    pub async fn exec_all<'r, 'c: 'r, S: AsRef<str>>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sqls: &[S],
    ) -> Result<Vec<usize>, SqlDbError> {
        self.manager()?.exec_all(target, sqls).await
    }

    /// # Errors
    /// See [`ConnectionManager::retryable_query`].
    pub async fn retryable_query<'r, 'c: 'r>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, SqlDbError> {
        self.manager()?.retryable_query(target, sql, params).await
    }

    /// # Errors
    /// See [`ConnectionManager::retryable_exec`].
    pub async fn retryable_exec<'r, 'c: 'r>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sql: &str,
        params: &[Value],
    ) -> Result<usize, SqlDbError> {
        self.manager()?.retryable_exec(target, sql, params).await
    }

    /// # Errors
    /// See [`ConnectionManager::retryable_exec_all`].
    pub async fn retryable_exec_all<'r, 'c: 'r, S: AsRef<str>>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sqls: &[S],
    ) -> Result<Vec<usize>, SqlDbError> {
        self.manager()?.retryable_exec_all(target, sqls).await
    }

    /// Apply pending migrations from the source given in [`DbOptions`].
    ///
    /// # Errors
    /// Returns `SqlDbError::ConfigError` when not initialized or when no migration source was
    /// configured, otherwise see [`Migrator::run`].
    pub async fn run_migrations(&self) -> Result<MigrationReport, SqlDbError> {
        let ready = self.ready()?;
        let source = ready.migration_source.as_deref().ok_or_else(|| {
            SqlDbError::ConfigError("no migration source configured".to_string())
        })?;
        self.run_migrations_from(source).await
    }

    /// Apply pending migrations from `source`, recording them in the configured table.
    ///
    /// # Errors
    /// Returns `SqlDbError::ConfigError` when not initialized, otherwise see
    /// [`Migrator::run`].
    pub async fn run_migrations_from(
        &self,
        source: &dyn MigrationSource<D>,
    ) -> Result<MigrationReport, SqlDbError> {
        self.migrator()?.run(source).await
    }

    /// Names of migrations from `source` not applied yet.
    ///
    /// # Errors
    /// Returns `SqlDbError::ConfigError` when not initialized, otherwise see
    /// [`Migrator::pending`].
    pub async fn pending_migrations(
        &self,
        source: &dyn MigrationSource<D>,
    ) -> Result<Vec<String>, SqlDbError> {
        let pending = self.migrator()?.pending(source).await?;
        Ok(pending.iter().map(|m| m.name().to_string()).collect())
    }

    fn migrator(&self) -> Result<Migrator<'_, D>, SqlDbError> {
        let ready = self.ready()?;
        Ok(Migrator::new(&ready.manager, ready.migrations.clone()))
    }
}
