//! Schema migrations applied through the [`ConnectionManager`].
//!
//! Each pending migration runs in its own transaction at the driver's
//! [`migration_isolation_level`](Driver::migration_isolation_level), and is recorded as applied
//! inside that same transaction. Names are applied in ascending order and the first failure
//! stops the run; the next run starts again from the failed migration.

mod source;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::SqlDbError;
use crate::manager::ConnectionManager;

pub use source::{MigrationSet, MigrationSource, SqlDirectory, SqlMigration};

/// One named schema or data change.
#[async_trait]
pub trait Migration<D: Driver>: Send + Sync {
    /// Unique name; migrations are applied in ascending name order.
    fn name(&self) -> &str;

    /// Apply the change. Runs inside the migration's transaction.
    ///
    /// # Errors
    /// Any error aborts the migration run and rolls this migration back.
    async fn up<'c>(&self, conn: &mut Connection<'c, D>) -> Result<(), SqlDbError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    /// Bookkeeping table holding applied migration names
    pub table_name: String,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            table_name: "migrations".to_string(),
        }
    }
}

impl MigrationOptions {
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }

    /// # Errors
    /// Returns `SqlDbError::ConfigError` for an empty table name.
    pub fn validate(&self) -> Result<(), SqlDbError> {
        if self.table_name.trim().is_empty() {
            return Err(SqlDbError::ConfigError(
                "migrations table name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The migration that stopped a run.
#[derive(Debug)]
pub struct FailedMigration {
    pub name: String,
    pub error: SqlDbError,
}

/// Outcome of [`Migrator::run`].
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Applied by this run, in order
    pub applied: Vec<String>,
    pub failed: Option<FailedMigration>,
    /// Pending migrations after the failed one, never attempted
    pub skipped: Vec<String>,
}

impl MigrationReport {
    /// True when every pending migration was applied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }
}

/// Applies pending migrations from a [`MigrationSource`].
pub struct Migrator<'m, D: Driver> {
    manager: &'m ConnectionManager<D>,
    options: MigrationOptions,
}

impl<'m, D: Driver> Migrator<'m, D> {
    #[must_use]
    pub fn new(manager: &'m ConnectionManager<D>, options: MigrationOptions) -> Self {
        Self { manager, options }
    }

    #[must_use]
    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Migrations from `source` not yet recorded as applied, ascending by name.
    ///
    /// Read-only: a missing bookkeeping table counts as nothing applied and is not created.
    ///
    /// # Errors
    /// Returns `SqlDbError` if the bookkeeping table cannot be read, the source cannot be
    /// listed, or two migrations share a name.
    pub async fn pending(
        &self,
        source: &dyn MigrationSource<D>,
    ) -> Result<Vec<Arc<dyn Migration<D>>>, SqlDbError> {
        self.options.validate()?;
        let driver = self.manager.driver();
        let table = self.options.table_name.as_str();

        let mut all = source.migrations().await?;
        all.sort_by(|a, b| a.name().cmp(b.name()));
        if let Some(dup) = all.windows(2).find(|w| w[0].name() == w[1].name()) {
            return Err(SqlDbError::ConfigError(format!(
                "duplicate migration name <{}>",
                dup[0].name()
            )));
        }

        let executed: HashSet<String> = driver
            .list_executed_migration_names(table)
            .await?
            .into_iter()
            .collect();
        all.retain(|m| !executed.contains(m.name()));
        Ok(all)
    }

    /// Apply every pending migration, in order, stopping at the first failure.
    ///
    /// A failing migration does not make this return `Err`: it is logged and reported in
    /// [`MigrationReport::failed`].
    ///
    /// # Errors
    /// Returns `SqlDbError` only when the bookkeeping table cannot be created or the pending
    /// list cannot be computed (see [`Migrator::pending`]).
    pub async fn run(
        &self,
        source: &dyn MigrationSource<D>,
    ) -> Result<MigrationReport, SqlDbError> {
        let logger = self.manager.logger();
        self.options.validate()?;
        self.manager
            .driver()
            .ensure_migrations_table(&self.options.table_name)
            .await?;
        let pending = self.pending(source).await?;
        let mut report = MigrationReport::default();

        if pending.is_empty() {
            logger.info("No migrations to execute");
            return Ok(report);
        }

        let mut remaining = pending.into_iter();
        for migration in remaining.by_ref() {
            let name = migration.name().to_string();
            logger.info(&format!("Executing migration <{name}>..."));
            match self.apply(migration.as_ref()).await {
                Ok(()) => report.applied.push(name),
                Err(error) => {
                    logger.error(&format!("Migration <{name}> failed: {error}"));
                    report.failed = Some(FailedMigration { name, error });
                    break;
                }
            }
        }
        report.skipped = remaining.map(|m| m.name().to_string()).collect();

        if report.is_complete() {
            logger.info("Migrations complete.");
        }
        Ok(report)
    }

    async fn apply(&self, migration: &dyn Migration<D>) -> Result<(), SqlDbError> {
        let driver = self.manager.driver();
        let table = self.options.table_name.as_str();

        self.manager
            .use_connection(driver.migration_isolation_level(), async |conn| {
                migration.up(conn).await?;
                driver
                    .log_migration_successful(conn, table, migration.name())
                    .await
            })
            .await
    }
}
