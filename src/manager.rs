use std::sync::Arc;

use crate::config::RetryOptions;
use crate::connection::{CommitFailurePolicy, Connection};
use crate::driver::Driver;
use crate::error::SqlDbError;
use crate::logger::Logger;
use crate::results::Row;
use crate::types::{IsolationLevel, Value};

/// Which connection a unit of work runs on.
///
/// ```rust,ignore
/// manager.use_connection(UseWith::NoTransaction, async |conn| conn.exec(sql, &[]).await).await?;
/// manager.use_connection("immediate", async |conn| conn.exec(sql, &[]).await).await?;
/// manager.use_connection(&mut *outer_conn, async |conn| conn.exec(sql, &[]).await).await?;
/// ```
pub enum UseWith<'r, 'c, D: Driver> {
    /// Fresh client, no transaction.
    NoTransaction,
    /// Fresh client, transaction at this isolation level.
    Transaction(IsolationLevel),
    /// Reuse a caller-owned connection as is. The manager neither acquires, releases, commits
    /// nor rolls back anything for it.
    Existing(&'r mut Connection<'c, D>),
}

impl<D: Driver> From<IsolationLevel> for UseWith<'_, '_, D> {
    fn from(level: IsolationLevel) -> Self {
        UseWith::Transaction(level)
    }
}

impl<D: Driver> From<&str> for UseWith<'_, '_, D> {
    fn from(level: &str) -> Self {
        UseWith::Transaction(IsolationLevel::from(level))
    }
}

impl<D: Driver> From<Option<IsolationLevel>> for UseWith<'_, '_, D> {
    fn from(level: Option<IsolationLevel>) -> Self {
        level.map_or(UseWith::NoTransaction, UseWith::Transaction)
    }
}

impl<'r, 'c, D: Driver> From<&'r mut Connection<'c, D>> for UseWith<'r, 'c, D> {
    fn from(conn: &'r mut Connection<'c, D>) -> Self {
        UseWith::Existing(conn)
    }
}

/// Runs units of work against clients borrowed from a [`Driver`].
///
/// Every unit that acquires a client releases it exactly once, commits when the work succeeds
/// and rolls back when the work (or the commit) fails.
pub struct ConnectionManager<D: Driver> {
    driver: Arc<D>,
    logger: Arc<dyn Logger>,
    retry: RetryOptions,
}

impl<D: Driver> ConnectionManager<D> {
    #[must_use]
    pub fn new(driver: Arc<D>, logger: Arc<dyn Logger>, retry: RetryOptions) -> Self {
        Self {
            driver,
            logger,
            retry,
        }
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    #[must_use]
    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    #[must_use]
    pub fn retry_options(&self) -> RetryOptions {
        self.retry
    }

    /// Run `work` on the connection selected by `target`.
    ///
    /// # Errors
    /// Returns the first error raised by client acquisition, transaction start, `work` or the
    /// commit. A rollback or release failure that follows another error is logged and the
    /// original error is returned.
    pub async fn use_connection<'r, 'c: 'r, T, F>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        work: F,
    ) -> Result<T, SqlDbError>
    where
        F: AsyncFnOnce(&mut Connection<'_, D>) -> Result<T, SqlDbError>,
    {
        match target.into() {
            UseWith::Existing(conn) => work(conn).await,
            UseWith::NoTransaction => {
                self.run_fresh(None, CommitFailurePolicy::Propagate, work)
                    .await
                    .0
            }
            UseWith::Transaction(level) => {
                self.run_fresh(Some(level), CommitFailurePolicy::Propagate, work)
                    .await
                    .0
            }
        }
    }

    /// Like [`use_connection`](Self::use_connection), but a failed unit is run again.
    ///
    /// Commit failures (from the automatic commit or from `work` calling
    /// [`Connection::commit`]) are recorded instead of returned and `work` finishes normally.
    /// A recorded commit failure, or any error from acquiring the client, starting the
    /// transaction or `work` itself, starts the unit again after [`RetryOptions::delay`] until
    /// [`RetryOptions::max_attempts`] is reached.
    ///
    /// `work` may therefore run several times. Anything it does outside the database
    /// transaction must be idempotent, or deferred until this call returns. When `work` commits
    /// explicitly and that commit is recorded as failed, the automatic commit still runs, so
    /// the first attempt's writes may already be committed when the unit is re-run.
    ///
    /// # Errors
    /// Returns the last error once attempts are exhausted. A recorded commit failure takes
    /// precedence over the error of the same attempt.
    pub async fn use_with_retry<'r, 'c: 'r, T, F>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        work: F,
    ) -> Result<T, SqlDbError>
    where
        F: AsyncFn(&mut Connection<'_, D>) -> Result<T, SqlDbError>,
    {
        let mut target = target.into();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let (result, tx_err) = match &mut target {
                UseWith::Existing(conn) => {
                    let previous = conn.replace_commit_policy(CommitFailurePolicy::Absorb);
                    let result = work(&mut **conn).await;
                    conn.replace_commit_policy(previous);
                    (result, conn.take_absorbed_commit_error())
                }
                UseWith::NoTransaction => {
                    self.run_fresh(None, CommitFailurePolicy::Absorb, &work)
                        .await
                }
                UseWith::Transaction(level) => {
                    self.run_fresh(Some(level.clone()), CommitFailurePolicy::Absorb, &work)
                        .await
                }
            };

            let tx_err = match (result, tx_err) {
                (Ok(value), None) => return Ok(value),
                (_, Some(tx_err)) | (Err(tx_err), None) => tx_err,
            };
            if attempt >= max_attempts {
                self.logger.error(&format!(
                    "Retried executing db transaction too many times, aborting: {tx_err}"
                ));
                return Err(tx_err);
            }
            self.logger.warn(&format!(
                "DB transaction error, wait a bit and retry ({} attempts left): {tx_err}",
                max_attempts - attempt
            ));
            tokio::time::sleep(self.retry.delay).await;
        }
    }

    /// # Errors
    /// See [`use_connection`](Self::use_connection).
    pub async fn query<'r, 'c: 'r>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, SqlDbError> {
        self.use_connection(target, async |conn| conn.query(sql, params).await)
            .await
    }

    /// `None` when the query returned no rows.
    ///
    /// # Errors
    /// See [`use_connection`](Self::use_connection).
    pub async fn query_single<'r, 'c: 'r>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>, SqlDbError> {
        self.use_connection(target, async |conn| conn.query_single(sql, params).await)
            .await
    }

    /// # Errors
    /// See [`use_connection`](Self::use_connection).
    pub async fn exec<'r, 'c: 'r>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sql: &str,
        params: &[Value],
    ) -> Result<usize, SqlDbError> {
        self.use_connection(target, async |conn| conn.exec(sql, params).await)
            .await
    }

    /// # Errors
    /// See [`use_connection`](Self::use_connection).
    pub async fn exec_all<'r, 'c: 'r, S: AsRef<str>>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sqls: &[S],
    ) -> Result<Vec<usize>, SqlDbError> {
        self.use_connection(target, async |conn| conn.exec_all(sqls).await)
            .await
    }

    /// # Errors
    /// See [`use_with_retry`](Self::use_with_retry).
    pub async fn retryable_query<'r, 'c: 'r>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, SqlDbError> {
        self.use_with_retry(target, async |conn| conn.query(sql, params).await)
            .await
    }

    /// # Errors
    /// See [`use_with_retry`](Self::use_with_retry).
    pub async fn retryable_exec<'r, 'c: 'r>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sql: &str,
        params: &[Value],
    ) -> Result<usize, SqlDbError> {
        self.use_with_retry(target, async |conn| conn.exec(sql, params).await)
            .await
    }

    /// # Errors
    /// See [`use_with_retry`](Self::use_with_retry).
    pub async fn retryable_exec_all<'r, 'c: 'r, S: AsRef<str>>(
        &self,
        target: impl Into<UseWith<'r, 'c, D>>,
        sqls: &[S],
    ) -> Result<Vec<usize>, SqlDbError> {
        self.use_with_retry(target, async |conn| conn.exec_all(sqls).await)
            .await
    }

    /// Shut the driver down.
    ///
    /// # Errors
    /// Returns the driver's shutdown error.
    pub async fn shutdown(&self) -> Result<(), SqlDbError> {
        self.driver.shutdown().await
    }

    /// Acquire a client, run the unit on it and release it, whatever the outcome.
    ///
    /// Returns the unit's result and the commit error absorbed under
    /// [`CommitFailurePolicy::Absorb`], if any.
    async fn run_fresh<T, F>(
        &self,
        isolation_level: Option<IsolationLevel>,
        policy: CommitFailurePolicy,
        work: F,
    ) -> (Result<T, SqlDbError>, Option<SqlDbError>)
    where
        F: AsyncFnOnce(&mut Connection<'_, D>) -> Result<T, SqlDbError>,
    {
        let mut client = match self.driver.get_client().await {
            Ok(client) => client,
            Err(err) => {
                self.logger
                    .error(&format!("Error acquiring DB client: {err}"));
                return (Err(err), None);
            }
        };

        let (result, tx_err) = self
            .run_on_client(&mut client, isolation_level, policy, work)
            .await;

        match (result, self.driver.release_client(client).await) {
            (result, Ok(())) => (result, tx_err),
            (Ok(_), Err(release_err)) => {
                self.logger
                    .error(&format!("Error releasing DB client: {release_err}"));
                (Err(release_err), tx_err)
            }
            (Err(err), Err(release_err)) => {
                self.logger.error(&format!(
                    "Error releasing DB client after failure [{err}]: {release_err}"
                ));
                (Err(err), tx_err)
            }
        }
    }

    async fn run_on_client<T, F>(
        &self,
        client: &mut D::Client,
        isolation_level: Option<IsolationLevel>,
        policy: CommitFailurePolicy,
        work: F,
    ) -> (Result<T, SqlDbError>, Option<SqlDbError>)
    where
        F: AsyncFnOnce(&mut Connection<'_, D>) -> Result<T, SqlDbError>,
    {
        let mut conn =
            match Connection::open(&*self.driver, client, &*self.logger, isolation_level).await {
                Ok(conn) => conn,
                Err(err) => return (Err(err), None),
            };
        conn.replace_commit_policy(policy);

        let result = match work(&mut conn).await {
            Ok(value) => conn.commit().await.map(|()| value),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            if let Err(rollback_err) = conn.rollback(Some(err)).await {
                self.logger.warn(&format!(
                    "Ignoring rollback failure after error [{err}]: {rollback_err}"
                ));
            }
        }

        let tx_err = conn.take_absorbed_commit_error();
        // An absorbed commit failure can leave the transaction open on the client; close it
        // before the client goes back to the driver.
        if let Some(tx_err) = &tx_err {
            if let Err(rollback_err) = conn.rollback(Some(tx_err)).await {
                self.logger.warn(&format!(
                    "Ignoring rollback failure after commit error [{tx_err}]: {rollback_err}"
                ));
            }
        }

        (result, tx_err)
    }
}
