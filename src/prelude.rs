//! Convenient imports for common functionality.
//!
//! ```rust,ignore
//! use sqldb_middleware::prelude::*;
//! ```

pub use crate::config::{DbOptions, RetryOptions};
pub use crate::connection::Connection;
pub use crate::db::Database;
pub use crate::driver::Driver;
pub use crate::error::SqlDbError;
pub use crate::manager::{ConnectionManager, UseWith};
pub use crate::migrations::{Migration, MigrationSet, SqlDirectory};
pub use crate::results::Row;
pub use crate::types::{IsolationLevel, Value};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteDriver, SqliteOptions};
