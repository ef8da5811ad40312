#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sqldb_middleware::{
    Connection, Driver, DriverOptions, IsolationLevel, Logger, Row, SqlDbError, Value,
};

/// Every driver call, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initialize,
    Shutdown,
    GetClient(usize),
    Release(usize),
    Query(String),
    Exec(String),
    ExecBatch(String),
    Start(String),
    Commit,
    Rollback(Option<String>),
    EnsureTable(String),
    ListExecuted(String),
    LogMigration(String),
}

/// Failures the mock should produce.
#[derive(Debug, Default)]
pub struct Script {
    /// The next N commits fail, then commits succeed
    pub commit_failures: usize,
    /// The next N checkouts fail
    pub get_client_failures: usize,
    pub fail_get_client: bool,
    pub fail_start: bool,
    pub fail_release: bool,
    pub fail_rollback: bool,
    pub fail_initialize: bool,
    /// `query`/`exec` fail for statements containing this text
    pub fail_sql_containing: Option<String>,
    pub rows: Vec<Row>,
}

pub struct MockClient {
    pub id: usize,
}

#[derive(Default)]
pub struct MockDriver {
    calls: Mutex<Vec<Call>>,
    script: Mutex<Script>,
    next_client: AtomicUsize,
    executed: Mutex<Vec<String>>,
    staged: Mutex<Vec<String>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Script) -> Self {
        let driver = Self::default();
        *driver.script.lock().unwrap() = script;
        driver
    }

    pub fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn executed_migrations(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn mark_executed(&self, name: &str) {
        self.executed.lock().unwrap().push(name.to_string());
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_sql(&self, sql: &str) -> Result<(), SqlDbError> {
        let script = self.script.lock().unwrap();
        match &script.fail_sql_containing {
            Some(needle) if sql.contains(needle.as_str()) => {
                Err(SqlDbError::ExecutionError(format!("mock failure for [{sql}]")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Client = MockClient;

    async fn initialize(&self, options: DriverOptions) -> Result<(), SqlDbError> {
        self.record(Call::Initialize);
        if self.script().fail_initialize {
            return Err(SqlDbError::ConnectionError("mock initialize failure".into()));
        }
        options.logger.debug("mock driver initialized");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SqlDbError> {
        self.record(Call::Shutdown);
        Ok(())
    }

    async fn get_client(&self) -> Result<MockClient, SqlDbError> {
        {
            let mut script = self.script();
            if script.get_client_failures > 0 {
                script.get_client_failures -= 1;
                return Err(SqlDbError::ConnectionError("pool exhausted".into()));
            }
            if script.fail_get_client {
                return Err(SqlDbError::ConnectionError("pool exhausted".into()));
            }
        }
        let id = self.next_client.fetch_add(1, Ordering::SeqCst);
        self.record(Call::GetClient(id));
        Ok(MockClient { id })
    }

    async fn release_client(&self, client: MockClient) -> Result<(), SqlDbError> {
        self.record(Call::Release(client.id));
        if self.script().fail_release {
            return Err(SqlDbError::ConnectionError("release failed".into()));
        }
        Ok(())
    }

    async fn query(
        &self,
        _client: &mut MockClient,
        sql: &str,
        _params: &[Value],
    ) -> Result<Vec<Row>, SqlDbError> {
        self.record(Call::Query(sql.to_string()));
        self.check_sql(sql)?;
        Ok(self.script().rows.clone())
    }

    async fn exec(
        &self,
        _client: &mut MockClient,
        sql: &str,
        _params: &[Value],
    ) -> Result<usize, SqlDbError> {
        self.record(Call::Exec(sql.to_string()));
        self.check_sql(sql)?;
        Ok(1)
    }

    async fn exec_batch(&self, _client: &mut MockClient, sql: &str) -> Result<(), SqlDbError> {
        self.record(Call::ExecBatch(sql.to_string()));
        self.check_sql(sql)
    }

    async fn start_transaction(
        &self,
        _client: &mut MockClient,
        isolation_level: &IsolationLevel,
    ) -> Result<(), SqlDbError> {
        self.record(Call::Start(isolation_level.as_str().to_string()));
        if self.script().fail_start {
            return Err(SqlDbError::TransactionError("cannot begin".into()));
        }
        Ok(())
    }

    async fn commit_transaction(&self, _client: &mut MockClient) -> Result<(), SqlDbError> {
        self.record(Call::Commit);
        {
            let mut script = self.script();
            if script.commit_failures > 0 {
                script.commit_failures -= 1;
                return Err(SqlDbError::TransactionError("database is locked".into()));
            }
        }
        let staged = std::mem::take(&mut *self.staged.lock().unwrap());
        self.executed.lock().unwrap().extend(staged);
        Ok(())
    }

    async fn rollback_transaction(
        &self,
        _client: &mut MockClient,
        cause: Option<&SqlDbError>,
    ) -> Result<(), SqlDbError> {
        self.record(Call::Rollback(cause.map(ToString::to_string)));
        if self.script().fail_rollback {
            return Err(SqlDbError::TransactionError("rollback failed".into()));
        }
        self.staged.lock().unwrap().clear();
        Ok(())
    }

    async fn ensure_migrations_table(&self, table_name: &str) -> Result<(), SqlDbError> {
        self.record(Call::EnsureTable(table_name.to_string()));
        Ok(())
    }

    async fn list_executed_migration_names(
        &self,
        table_name: &str,
    ) -> Result<Vec<String>, SqlDbError> {
        self.record(Call::ListExecuted(table_name.to_string()));
        let mut names = self.executed_migrations();
        names.sort();
        Ok(names)
    }

    async fn log_migration_successful<'c>(
        &self,
        conn: &mut Connection<'c, Self>,
        _table_name: &str,
        migration_name: &str,
    ) -> Result<(), SqlDbError> {
        assert!(conn.in_transaction(), "migrations are recorded inside their transaction");
        self.record(Call::LogMigration(migration_name.to_string()));
        self.staged.lock().unwrap().push(migration_name.to_string());
        Ok(())
    }

    fn migration_isolation_level(&self) -> IsolationLevel {
        IsolationLevel::from_static("serializable")
    }

    fn isolation_levels(&self) -> Vec<IsolationLevel> {
        vec![
            IsolationLevel::from_static("read committed"),
            IsolationLevel::from_static("serializable"),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Logger keeping every message for assertions.
#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    fn push(&self, level: Level, message: &str) {
        self.entries.lock().unwrap().push((level, message.to_string()));
    }
}

impl Logger for RecordingLogger {
    fn trace(&self, message: &str) {
        self.push(Level::Trace, message);
    }

    fn debug(&self, message: &str) {
        self.push(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }
}
