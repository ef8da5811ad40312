mod common;

use std::sync::Arc;

use common::{Call, Level, MockDriver, RecordingLogger, Script};
use sqldb_middleware::{
    ConnectionManager, Logger, RetryOptions, Row, SqlDbError, TxState, UseWith, Value,
};

fn manager_with(driver: MockDriver) -> (ConnectionManager<MockDriver>, Arc<RecordingLogger>) {
    let logger = Arc::new(RecordingLogger::default());
    let manager = ConnectionManager::new(
        Arc::new(driver),
        Arc::clone(&logger) as Arc<dyn Logger>,
        RetryOptions::default(),
    );
    (manager, logger)
}

#[tokio::test]
async fn double_commit_commits_once() -> Result<(), SqlDbError> {
    let (manager, _) = manager_with(MockDriver::new());

    manager
        .use_connection("read committed", async |conn| {
            assert!(conn.in_transaction());
            conn.commit().await?;
            conn.commit().await?;
            assert_eq!(conn.tx_state(), TxState::Ended);
            Ok(())
        })
        .await?;

    assert_eq!(manager.driver().count(|c| *c == Call::Commit), 1);
    assert_eq!(manager.driver().count(|c| matches!(c, Call::Rollback(_))), 0);
    Ok(())
}

#[tokio::test]
async fn double_rollback_rolls_back_once() -> Result<(), SqlDbError> {
    let (manager, _) = manager_with(MockDriver::new());

    manager
        .use_connection("read committed", async |conn| {
            conn.rollback(None).await?;
            conn.rollback(None).await?;
            // ended: commit is now a no-op
            conn.commit().await?;
            Ok(())
        })
        .await?;

    let driver = manager.driver();
    assert_eq!(driver.count(|c| matches!(c, Call::Rollback(_))), 1);
    assert_eq!(driver.count(|c| *c == Call::Commit), 0);
    Ok(())
}

#[tokio::test]
async fn rollback_after_failed_commit_still_runs() -> Result<(), SqlDbError> {
    let (manager, logger) = manager_with(MockDriver::with_script(Script {
        commit_failures: 1,
        ..Script::default()
    }));

    manager
        .use_connection("serializable", async |conn| {
            let err = conn.commit().await.unwrap_err();
            assert!(conn.in_transaction(), "failed commit leaves the transaction open");
            conn.rollback(Some(&err)).await?;
            assert!(conn.is_ended());
            Ok(())
        })
        .await?;

    let driver = manager.driver();
    assert_eq!(driver.count(|c| *c == Call::Commit), 1);
    assert_eq!(
        driver.count(|c| *c == Call::Rollback(Some("Transaction error: database is locked".into()))),
        1
    );
    assert!(
        logger
            .messages_at(Level::Error)
            .iter()
            .any(|m| m.starts_with("Error committing transaction"))
    );
    Ok(())
}

#[tokio::test]
async fn without_transaction_commit_and_rollback_are_noops() -> Result<(), SqlDbError> {
    let (manager, _) = manager_with(MockDriver::new());

    manager
        .use_connection(UseWith::NoTransaction, async |conn| {
            assert_eq!(conn.tx_state(), TxState::NoTransaction);
            assert!(conn.isolation_level().is_none());
            conn.commit().await?;
            conn.rollback(None).await?;
            conn.exec("UPDATE t SET x = 1", &[]).await
        })
        .await?;

    let calls = manager.driver().calls();
    assert_eq!(
        calls,
        vec![
            Call::GetClient(0),
            Call::Exec("UPDATE t SET x = 1".into()),
            Call::Release(0),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn query_single_is_none_only_for_empty_results() -> Result<(), SqlDbError> {
    let (manager, _) = manager_with(MockDriver::new());
    let none = manager
        .query_single(UseWith::NoTransaction, "SELECT * FROM t", &[])
        .await?;
    assert!(none.is_none());

    let rows = vec![
        Row::from_pairs([("id", Value::Int(1))]),
        Row::from_pairs([("id", Value::Int(2))]),
    ];
    let (manager, _) = manager_with(MockDriver::with_script(Script {
        rows,
        ..Script::default()
    }));
    let first = manager
        .query_single(UseWith::NoTransaction, "SELECT * FROM t", &[])
        .await?
        .expect("one row");
    assert_eq!(first.get("id"), Some(&Value::Int(1)));
    Ok(())
}

#[tokio::test]
async fn exec_all_returns_one_count_per_statement_in_order() -> Result<(), SqlDbError> {
    let (manager, _) = manager_with(MockDriver::new());
    let statements = ["INSERT INTO a VALUES (1)", "INSERT INTO b VALUES (2)", "DELETE FROM c"];

    let counts = manager
        .exec_all(UseWith::NoTransaction, &statements)
        .await?;
    assert_eq!(counts, vec![1, 1, 1]);

    let execs: Vec<Call> = manager
        .driver()
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Exec(_)))
        .collect();
    assert_eq!(
        execs,
        statements.iter().map(|s| Call::Exec((*s).into())).collect::<Vec<_>>()
    );

    let single = manager.exec(UseWith::NoTransaction, "DELETE FROM c", &[]).await?;
    assert_eq!(single, 1);
    Ok(())
}

#[tokio::test]
async fn failed_query_is_logged_with_statement_and_returned_unchanged() {
    let (manager, logger) = manager_with(MockDriver::with_script(Script {
        fail_sql_containing: Some("missing_table".into()),
        ..Script::default()
    }));

    let err = manager
        .query(UseWith::NoTransaction, "SELECT * FROM missing_table", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlDbError::ExecutionError(_)));
    assert!(
        logger
            .messages_at(Level::Error)
            .iter()
            .any(|m| m.starts_with("Error performing DB query [SELECT * FROM missing_table]"))
    );
}
