//! Injectable logging capability.
//!
//! The middleware and drivers log through a [`Logger`] rather than calling `tracing` directly,
//! so an application can route (or silence) database logging independently.

use std::fmt;
use std::sync::Arc;

pub trait Logger: Send + Sync {
    fn trace(&self, message: &str);
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Forwards every message to the `tracing` macro of the same level under the `sqldb` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn trace(&self, message: &str) {
        tracing::trace!(target: "sqldb", "{message}");
    }

    fn debug(&self, message: &str) {
        tracing::debug!(target: "sqldb", "{message}");
    }

    fn info(&self, message: &str) {
        tracing::info!(target: "sqldb", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "sqldb", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "sqldb", "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn trace(&self, _message: &str) {}
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Which logger a [`Database`](crate::db::Database) hands to its driver and manager.
#[derive(Clone, Default)]
pub enum LoggerChoice {
    /// Not specified: log through `tracing`.
    #[default]
    Default,
    /// Explicitly disabled.
    Disabled,
    Custom(Arc<dyn Logger>),
}

impl LoggerChoice {
    #[must_use]
    pub fn resolve(&self) -> Arc<dyn Logger> {
        match self {
            LoggerChoice::Default => Arc::new(TracingLogger),
            LoggerChoice::Disabled => Arc::new(NoopLogger),
            LoggerChoice::Custom(logger) => Arc::clone(logger),
        }
    }
}

impl fmt::Debug for LoggerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Disabled => f.write_str("Disabled"),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<dyn Logger>").finish(),
        }
    }
}

impl From<Option<Arc<dyn Logger>>> for LoggerChoice {
    /// `None` is an explicit opt-out, mirroring a caller passing "no logger".
    fn from(logger: Option<Arc<dyn Logger>>) -> Self {
        match logger {
            Some(logger) => LoggerChoice::Custom(logger),
            None => LoggerChoice::Disabled,
        }
    }
}
