mod common;

use std::sync::Arc;

use common::{Call, Level, MockDriver, RecordingLogger, Script};
use sqldb_middleware::{ConnectionManager, Logger, RetryOptions, SqlDbError, UseWith};

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
async fn fresh_client_is_acquired_and_released_once() -> Result<(), SqlDbError> {
    let (manager, _) = manager_with(MockDriver::new());

    let value = manager
        .use_connection("rc", async |conn| {
            conn.exec("INSERT INTO t VALUES (1)", &[]).await?;
            Ok(42)
        })
        .await?;
    assert_eq!(value, 42);

    assert_eq!(
        manager.driver().calls(),
        vec![
            Call::GetClient(0),
            Call::Start("rc".into()),
            Call::Exec("INSERT INTO t VALUES (1)".into()),
            Call::Commit,
            Call::Release(0),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn failing_work_rolls_back_with_cause_and_surfaces_original_error() {
    let (manager, _) = manager_with(MockDriver::new());

    let err = manager
        .use_connection("rc", async |_conn| -> Result<(), SqlDbError> {
            Err(SqlDbError::Other("boom".into()))
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "boom");
    assert_eq!(
        manager.driver().calls(),
        vec![
            Call::GetClient(0),
            Call::Start("rc".into()),
            Call::Rollback(Some("boom".into())),
            Call::Release(0),
        ]
    );
}

#[tokio::test]
async fn rollback_failure_does_not_mask_work_error() {
    let (manager, logger) = manager_with(MockDriver::with_script(Script {
        fail_rollback: true,
        ..Script::default()
    }));

    let err = manager
        .use_connection("rc", async |_conn| -> Result<(), SqlDbError> {
            Err(SqlDbError::Other("boom".into()))
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "boom");
    assert_eq!(manager.driver().count(|c| matches!(c, Call::Release(_))), 1);
    assert!(
        logger
            .messages_at(Level::Warn)
            .iter()
            .any(|m| m.contains("rollback failure after error [boom]"))
    );
}

#[tokio::test]
async fn start_failure_skips_work_and_still_releases() {
    let (manager, _) = manager_with(MockDriver::with_script(Script {
        fail_start: true,
        ..Script::default()
    }));
    let mut ran = false;

    let err = manager
        .use_connection("rc", async |_conn| {
            ran = true;
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(!ran);
    assert!(matches!(err, SqlDbError::TransactionError(_)));
    assert_eq!(
        manager.driver().calls(),
        vec![
            Call::GetClient(0),
            Call::Start("rc".into()),
            Call::Release(0)
        ]
    );
}

#[tokio::test]
async fn acquisition_failure_is_returned_without_release() {
    let (manager, logger) = manager_with(MockDriver::with_script(Script {
        fail_get_client: true,
        ..Script::default()
    }));

    let err = manager
        .exec(UseWith::NoTransaction, "DELETE FROM t", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, SqlDbError::ConnectionError(_)));
    assert!(manager.driver().calls().is_empty());
    assert_eq!(logger.messages_at(Level::Error).len(), 1);
}

#[tokio::test]
async fn release_failure_surfaces_after_success_but_not_after_failure() {
    let (manager, _) = manager_with(MockDriver::with_script(Script {
        fail_release: true,
        ..Script::default()
    }));

    let err = manager
        .exec(UseWith::NoTransaction, "DELETE FROM t", &[])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Connection error: release failed");

    let err = manager
        .use_connection(UseWith::NoTransaction, async |_conn| -> Result<(), SqlDbError> {
            Err(SqlDbError::Other("boom".into()))
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "boom");
}

#[tokio::test]
async fn existing_connection_is_reused_without_lifecycle_calls() -> Result<(), SqlDbError> {
    let (manager, _) = manager_with(MockDriver::new());

    manager
        .use_connection("rc", async |outer| {
            let count = manager
                .use_connection(&mut *outer, async |inner| {
                    assert!(inner.in_transaction());
                    inner.exec("UPDATE t SET x = 2", &[]).await
                })
                .await?;
            assert_eq!(count, 1);
            // the outer transaction is untouched by the nested unit
            assert!(outer.in_transaction());
            manager.exec(outer, "UPDATE t SET y = 3", &[]).await
        })
        .await?;

    assert_eq!(
        manager.driver().calls(),
        vec![
            Call::GetClient(0),
            Call::Start("rc".into()),
            Call::Exec("UPDATE t SET x = 2".into()),
            Call::Exec("UPDATE t SET y = 3".into()),
            Call::Commit,
            Call::Release(0),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn nested_failure_on_existing_connection_does_not_roll_back() {
    let (manager, _) = manager_with(MockDriver::new());

    let err = manager
        .use_connection("rc", async |outer| {
            let nested = manager
                .use_connection(&mut *outer, async |_inner| -> Result<(), SqlDbError> {
                    Err(SqlDbError::Other("inner".into()))
                })
                .await;
            assert!(nested.is_err());
            assert!(outer.in_transaction());
            nested
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "inner");
    // only the owning unit rolls back, once
    assert_eq!(
        manager
            .driver()
            .count(|c| *c == Call::Rollback(Some("inner".into()))),
        1
    );
}
