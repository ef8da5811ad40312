use std::fmt;

use crate::driver::Driver;
use crate::error::SqlDbError;
use crate::logger::Logger;
use crate::results::Row;
use crate::types::{IsolationLevel, Value};

/// What [`Connection::commit`] does when the driver fails to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitFailurePolicy {
    /// Return the error to the caller.
    #[default]
    Propagate,
    /// Keep the error on the connection and report success; the retry loop of
    /// [`ConnectionManager::use_with_retry`](crate::manager::ConnectionManager::use_with_retry)
    /// inspects it once the unit of work has finished.
    Absorb,
}

/// Transaction state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Opened without an isolation level; commit and rollback are no-ops.
    NoTransaction,
    Active,
    /// A commit or rollback succeeded; further calls to either are no-ops.
    Ended,
}

/// A driver client bound to an optional transaction, handed to units of work.
///
/// The client stays owned by whoever acquired it (normally the
/// [`ConnectionManager`](crate::manager::ConnectionManager)); the connection only borrows it.
pub struct Connection<'c, D: Driver> {
    driver: &'c D,
    client: &'c mut D::Client,
    logger: &'c dyn Logger,
    isolation_level: Option<IsolationLevel>,
    state: TxState,
    commit_policy: CommitFailurePolicy,
    absorbed_commit_error: Option<SqlDbError>,
}

impl<'c, D: Driver> Connection<'c, D> {
    /// Wrap `client`, starting a transaction first when `isolation_level` is set.
    ///
    /// # Errors
    /// Returns the driver's error if the transaction cannot be started; no connection exists in
    /// that case so nothing needs rolling back.
    pub(crate) async fn open(
        driver: &'c D,
        client: &'c mut D::Client,
        logger: &'c dyn Logger,
        isolation_level: Option<IsolationLevel>,
    ) -> Result<Self, SqlDbError> {
        let state = match &isolation_level {
            Some(level) => {
                if let Err(err) = driver.start_transaction(client, level).await {
                    logger.error(&format!("Error starting new transaction: {err}"));
                    return Err(err);
                }
                TxState::Active
            }
            None => TxState::NoTransaction,
        };

        Ok(Self {
            driver,
            client,
            logger,
            isolation_level,
            state,
            commit_policy: CommitFailurePolicy::Propagate,
            absorbed_commit_error: None,
        })
    }

    /// Run `sql` and return every row.
    ///
    /// # Errors
    /// Returns the driver's error unchanged, after logging it with the statement text.
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SqlDbError> {
        match self.driver.query(self.client, sql, params).await {
            Ok(rows) => Ok(rows),
            Err(err) => {
                self.logger
                    .error(&format!("Error performing DB query [{sql}]: {err}"));
                Err(err)
            }
        }
    }

    /// First row of `sql`, or `None` when it returned nothing.
    ///
    /// # Errors
    /// See [`Connection::query`].
    pub async fn query_single(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, SqlDbError> {
        let rows = self.query(sql, params).await?;
        Ok(rows.into_iter().next())
    }

    /// Run one statement and return the affected row count.
    ///
    /// # Errors
    /// Returns the driver's error unchanged, after logging it with the statement text.
    pub async fn exec(&mut self, sql: &str, params: &[Value]) -> Result<usize, SqlDbError> {
        match self.driver.exec(self.client, sql, params).await {
            Ok(count) => Ok(count),
            Err(err) => {
                self.logger
                    .error(&format!("Error executing DB statement [{sql}]: {err}"));
                Err(err)
            }
        }
    }

    /// Run parameterless statements in order, one count per statement. Stops at the first
    /// failing statement.
    ///
    /// # Errors
    /// Returns the error of the first statement that fails.
    pub async fn exec_all<S: AsRef<str>>(&mut self, sqls: &[S]) -> Result<Vec<usize>, SqlDbError> {
        let mut counts = Vec::with_capacity(sqls.len());
        for sql in sqls {
            counts.push(self.exec(sql.as_ref(), &[]).await?);
        }
        Ok(counts)
    }

    /// Run a multi-statement script through [`Driver::exec_batch`].
    ///
    /// # Errors
    /// Returns the driver's error unchanged, after logging it.
    pub async fn exec_batch(&mut self, sql: &str) -> Result<(), SqlDbError> {
        self.driver
            .exec_batch(self.client, sql)
            .await
            .inspect_err(|err| {
                self.logger
                    .error(&format!("Error executing DB batch [{sql}]: {err}"));
            })
    }

    /// Commit the transaction.
    ///
    /// A no-op without an active transaction or once the connection has ended. The connection
    /// is marked ended only when the driver reports success, so a failed commit can still be
    /// followed by [`rollback`](Connection::rollback).
    ///
    /// # Errors
    /// Returns the driver's error under [`CommitFailurePolicy::Propagate`].
    pub async fn commit(&mut self) -> Result<(), SqlDbError> {
        if self.state != TxState::Active {
            return Ok(());
        }

        self.logger.trace("Committing transaction");
        match self.driver.commit_transaction(self.client).await {
            Ok(()) => {
                self.state = TxState::Ended;
                Ok(())
            }
            Err(err) => {
                self.logger
                    .error(&format!("Error committing transaction: {err}"));
                match self.commit_policy {
                    CommitFailurePolicy::Propagate => Err(err),
                    CommitFailurePolicy::Absorb => {
                        self.absorbed_commit_error = Some(err);
                        Ok(())
                    }
                }
            }
        }
    }

    /// Roll the transaction back, passing `cause` to the driver for diagnostics.
    ///
    /// A no-op without an active transaction or once the connection has ended.
    ///
    /// # Errors
    /// Returns the driver's error; the connection stays active in that case.
    pub async fn rollback(&mut self, cause: Option<&SqlDbError>) -> Result<(), SqlDbError> {
        if self.state != TxState::Active {
            return Ok(());
        }

        match cause {
            Some(cause) => self
                .logger
                .trace(&format!("Rolling back transaction because of: {cause}")),
            None => self.logger.trace("Rolling back transaction"),
        }
        match self.driver.rollback_transaction(self.client, cause).await {
            Ok(()) => {
                self.state = TxState::Ended;
                Ok(())
            }
            Err(err) => {
                self.logger
                    .error(&format!("Error rolling back transaction: {err}"));
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn isolation_level(&self) -> Option<&IsolationLevel> {
        self.isolation_level.as_ref()
    }

    #[must_use]
    pub fn tx_state(&self) -> TxState {
        self.state
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.state == TxState::Active
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.state == TxState::Ended
    }

    #[must_use]
    pub fn commit_policy(&self) -> CommitFailurePolicy {
        self.commit_policy
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        self.driver
    }

    /// Raw access to the driver client for backend-specific calls.
    pub fn client_mut(&mut self) -> &mut D::Client {
        self.client
    }

    pub(crate) fn replace_commit_policy(
        &mut self,
        policy: CommitFailurePolicy,
    ) -> CommitFailurePolicy {
        std::mem::replace(&mut self.commit_policy, policy)
    }

    pub(crate) fn take_absorbed_commit_error(&mut self) -> Option<SqlDbError> {
        self.absorbed_commit_error.take()
    }
}

impl<D: Driver> fmt::Debug for Connection<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("isolation_level", &self.isolation_level)
            .field("state", &self.state)
            .field("commit_policy", &self.commit_policy)
            .finish_non_exhaustive()
    }
}
