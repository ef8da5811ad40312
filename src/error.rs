use thiserror::Error;

/// Errors surfaced by the middleware and by drivers implementing [`Driver`](crate::driver::Driver).
///
/// The core never wraps or translates a driver error: whatever a driver returns is what the
/// caller of `use_connection` observes.
#[derive(Debug, Error)]
pub enum SqlDbError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("{0}")]
    Other(String),
}

impl SqlDbError {
    /// Configuration error returned by a [`Database`](crate::db::Database) handle that has not
    /// been initialized (or has been shut down).
    #[must_use]
    pub fn not_initialized() -> Self {
        SqlDbError::ConfigError("DB not initialized".to_string())
    }

    /// True for errors raised before any I/O because of misuse or bad configuration.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, SqlDbError::ConfigError(_))
    }
}
