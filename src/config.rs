use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::error::SqlDbError;
use crate::logger::{Logger, LoggerChoice};
use crate::migrations::{MigrationOptions, MigrationSource};

/// Retry policy of [`ConnectionManager::use_with_retry`](crate::manager::ConnectionManager::use_with_retry).
///
/// Deserializes from `{ "retry_delay_ms": 500, "max_attempts": 3 }`; both keys are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Pause between two attempts
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub delay: Duration,
    /// Total attempts, including the first one
    pub max_attempts: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            max_attempts: 3,
        }
    }
}

impl RetryOptions {
    #[must_use]
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// # Errors
    /// Returns `SqlDbError::ConfigError` when `max_attempts` is zero.
    pub fn validate(&self) -> Result<(), SqlDbError> {
        if self.max_attempts == 0 {
            return Err(SqlDbError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Options for [`Database::initialize`](crate::db::Database::initialize).
pub struct DbOptions<D: Driver> {
    pub logger: LoggerChoice,
    pub retry: RetryOptions,
    pub migrations: MigrationOptions,
    pub migration_source: Option<Arc<dyn MigrationSource<D>>>,
    /// Apply pending migrations from `migration_source` right after initialization.
    pub run_migrations: bool,
}

impl<D: Driver> Default for DbOptions<D> {
    fn default() -> Self {
        Self {
            logger: LoggerChoice::Default,
            retry: RetryOptions::default(),
            migrations: MigrationOptions::default(),
            migration_source: None,
            run_migrations: false,
        }
    }
}

impl<D: Driver> DbOptions<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = LoggerChoice::Custom(logger);
        self
    }

    #[must_use]
    pub fn without_logging(mut self) -> Self {
        self.logger = LoggerChoice::Disabled;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn migrations_table(mut self, table_name: impl Into<String>) -> Self {
        self.migrations.table_name = table_name.into();
        self
    }

    /// Where migrations come from; does not by itself apply them.
    #[must_use]
    pub fn migration_source(mut self, source: Arc<dyn MigrationSource<D>>) -> Self {
        self.migration_source = Some(source);
        self
    }

    /// Apply pending migrations from `source` during initialization.
    #[must_use]
    pub fn run_migrations(mut self, source: Arc<dyn MigrationSource<D>>) -> Self {
        self.migration_source = Some(source);
        self.run_migrations = true;
        self
    }
}
