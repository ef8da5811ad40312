// SQLite backend: rusqlite connections pooled with bb8, driven from tokio's blocking pool.

pub mod config;
pub mod driver;
pub mod params;
pub mod query;

pub use config::{IN_MEMORY, SharedSqliteConnection, SqliteManager, SqliteOptions, SqliteOptionsBuilder};
pub use driver::{DEFERRED, EXCLUSIVE, IMMEDIATE, SqliteClient, SqliteDriver};
