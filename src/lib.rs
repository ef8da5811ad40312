//! Transactional units of work over pluggable async SQL drivers.
//!
//! A [`Driver`] owns the physical connectivity. The [`ConnectionManager`] borrows one client
//! per unit of work, wraps it in a [`Connection`], commits on success, rolls back on failure
//! and always releases the client. [`ConnectionManager::use_with_retry`] re-runs a unit that
//! failed, commit included, and the [`Migrator`] applies named migrations once each.
//!
//! [`Database`] is the handle most applications start from.

pub mod prelude;

pub mod config;
pub mod connection;
pub mod db;
pub mod driver;
pub mod error;
pub mod logger;
pub mod manager;
pub mod migrations;
pub mod results;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use config::{DbOptions, RetryOptions};
pub use connection::{CommitFailurePolicy, Connection, TxState};
pub use db::{Database, DatabaseState};
pub use driver::{DatabaseType, Driver, DriverOptions};
pub use error::SqlDbError;
pub use logger::{Logger, LoggerChoice, NoopLogger, TracingLogger};
pub use manager::{ConnectionManager, UseWith};
pub use migrations::{
    FailedMigration, Migration, MigrationOptions, MigrationReport, MigrationSet, MigrationSource,
    Migrator, SqlDirectory, SqlMigration,
};
pub use results::{Row, RowShape};
pub use types::{IsolationLevel, Value};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDriver, SqliteOptions, SqliteOptionsBuilder};
