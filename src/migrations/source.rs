use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::Migration;
use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::SqlDbError;

/// Where a [`Migrator`](super::Migrator) finds its migrations.
#[async_trait]
pub trait MigrationSource<D: Driver>: Send + Sync {
    /// Every known migration, in any order.
    ///
    /// # Errors
    /// Returns `SqlDbError` if the migrations cannot be listed or loaded.
    async fn migrations(&self) -> Result<Vec<Arc<dyn Migration<D>>>, SqlDbError>;
}

/// A migration made of one SQL script, run with [`Connection::exec_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    name: String,
    sql: String,
}

impl SqlMigration {
    #[must_use]
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[async_trait]
impl<D: Driver> Migration<D> for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn up<'c>(&self, conn: &mut Connection<'c, D>) -> Result<(), SqlDbError> {
        conn.exec_batch(&self.sql).await
    }
}

/// `*.sql` files of one directory. The migration name is the lowercased file name,
/// extension included, so `001-Init.SQL` becomes `001-init.sql`.
#[derive(Debug, Clone)]
pub struct SqlDirectory {
    dir: PathBuf,
}

impl SqlDirectory {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the scripts, sorted by name.
    ///
    /// # Errors
    /// Returns `SqlDbError::IoError` if the directory or a file cannot be read, and
    /// `SqlDbError::MigrationError` for a file name that is not valid UTF-8.
    pub async fn load(&self) -> Result<Vec<SqlMigration>, SqlDbError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut scripts = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                return Err(SqlDbError::MigrationError(format!(
                    "migration file name {} is not valid UTF-8",
                    entry.path().display()
                )));
            };
            let name = file_name.to_lowercase();
            if !name.ends_with(".sql") {
                continue;
            }
            let sql = tokio::fs::read_to_string(entry.path()).await?;
            scripts.push(SqlMigration::new(name, sql));
        }

        scripts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(scripts)
    }
}

#[async_trait]
impl<D: Driver> MigrationSource<D> for SqlDirectory {
    async fn migrations(&self) -> Result<Vec<Arc<dyn Migration<D>>>, SqlDbError> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .map(|m| Arc::new(m) as Arc<dyn Migration<D>>)
            .collect())
    }
}

/// Migrations registered in code.
///
/// ```rust,ignore
/// let set = MigrationSet::new()
///     .with_sql("001-users.sql", include_str!("../migrations/001-users.sql"))
///     .with(Arc::new(BackfillEmails));
/// ```
pub struct MigrationSet<D: Driver> {
    migrations: Vec<Arc<dyn Migration<D>>>,
}

impl<D: Driver> Default for MigrationSet<D> {
    fn default() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }
}

impl<D: Driver> MigrationSet<D> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(name, sql)` pairs.
    #[must_use]
    pub fn from_sql(scripts: &[(&str, &str)]) -> Self {
        scripts
            .iter()
            .fold(Self::new(), |set, (name, sql)| set.with_sql(*name, *sql))
    }

    #[must_use]
    pub fn with(mut self, migration: Arc<dyn Migration<D>>) -> Self {
        self.migrations.push(migration);
        self
    }

    #[must_use]
    pub fn with_sql(self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.with(Arc::new(SqlMigration::new(name, sql)))
    }

    pub fn push(&mut self, migration: Arc<dyn Migration<D>>) {
        self.migrations.push(migration);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[async_trait]
impl<D: Driver> MigrationSource<D> for MigrationSet<D> {
    async fn migrations(&self) -> Result<Vec<Arc<dyn Migration<D>>>, SqlDbError> {
        Ok(self.migrations.clone())
    }
}
