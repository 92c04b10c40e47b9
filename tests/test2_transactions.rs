#![cfg(feature = "test-utils")]

use std::time::Duration;

use async_sql_bridge::driver::SessionIsolation;
use async_sql_bridge::prelude::*;
use async_sql_bridge::test_utils::{MockCall, MockResult, MockScript, MockSession, mock_connection};

fn executed_sql(session: &MockSession) -> Vec<String> {
    session
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            MockCall::Execute(sql) => Some(sql),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn conflicting_definition_fails_before_io() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new();
    let conn = mock_connection(&session);

    let definition = TransactionDefinition::new()
        .isolation_level(IsolationLevel::Serializable)
        .read_only(true);
    let err = conn
        .begin_transaction_with(&definition)
        .expect_err("isolation and read-only conflict");
    assert!(matches!(err, SqlBridgeError::InvalidArgument(_)));

    let lock_wait = TransactionDefinition::new()
        .read_only(false)
        .lock_wait_timeout(Duration::from_secs(1));
    assert!(matches!(
        conn.begin_transaction_with(&lock_wait),
        Err(SqlBridgeError::Unsupported(_))
    ));
    assert!(session.calls().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn begin_disables_auto_commit_and_sets_transaction() -> Result<(), Box<dyn std::error::Error>>
{
    let session = MockSession::new();
    let conn = mock_connection(&session);

    let definition = TransactionDefinition::new()
        .read_only(true)
        .name("nightly load");
    conn.begin_transaction_with(&definition)?.await?;

    assert!(!session.auto_commit_flag());
    assert_eq!(
        executed_sql(&session),
        vec!["SET TRANSACTION READ ONLY NAME 'nightly load'".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn begin_uses_session_isolation() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new().with_isolation(SessionIsolation::Serializable);
    let conn = mock_connection(&session);

    conn.begin_transaction()?.await?;
    assert_eq!(
        executed_sql(&session),
        vec!["SET TRANSACTION ISOLATION LEVEL SERIALIZABLE".to_string()]
    );

    let odd = MockSession::new().with_isolation(SessionIsolation::Other(4096));
    let conn = mock_connection(&odd);
    let err = conn.begin_transaction()?.await.expect_err("unknown level");
    assert!(matches!(err, SqlBridgeError::Unsupported(_)));
    assert!(odd.auto_commit_flag());
    Ok(())
}

#[tokio::test]
async fn enabling_auto_commit_commits_once() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new();
    let conn = mock_connection(&session);

    conn.begin_transaction()?.await?;
    conn.set_auto_commit(true)?.await?;
    assert_eq!(session.commits(), 1);
    assert!(conn.is_auto_commit().await?);

    // Already on: nothing to commit.
    conn.set_auto_commit(true)?.await?;
    assert_eq!(session.commits(), 1);
    Ok(())
}

#[tokio::test]
async fn commit_and_rollback_skip_auto_commit_sessions() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new();
    let conn = mock_connection(&session);

    conn.commit_transaction()?.await?;
    conn.rollback_transaction()?.await?;
    assert_eq!(session.commits(), 0);
    assert_eq!(session.count(|c| matches!(c, MockCall::Rollback)), 0);

    conn.set_auto_commit(false)?.await?;
    conn.rollback_transaction()?.await?;
    conn.commit_transaction()?.await?;
    assert_eq!(session.count(|c| matches!(c, MockCall::Rollback)), 1);
    assert_eq!(session.commits(), 1);
    Ok(())
}

#[tokio::test]
async fn operations_are_lazy_and_replay() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new().with_auto_commit(false);
    let conn = mock_connection(&session);

    let commit = conn.commit_transaction()?;
    tokio::task::yield_now().await;
    assert_eq!(session.commits(), 0);

    let again = commit.clone();
    commit.await?;
    again.await?;
    assert_eq!(session.commits(), 1);
    Ok(())
}

#[tokio::test]
async fn savepoints_are_unsupported() -> Result<(), Box<dyn std::error::Error>> {
    let conn = mock_connection(&MockSession::new());
    assert!(matches!(
        conn.create_savepoint("s1"),
        Err(SqlBridgeError::Unsupported(_))
    ));
    assert!(matches!(
        conn.rollback_transaction_to_savepoint("s1"),
        Err(SqlBridgeError::Unsupported(_))
    ));
    assert!(matches!(
        conn.release_savepoint(""),
        Err(SqlBridgeError::InvalidArgument(_))
    ));
    conn.release_savepoint("s1")?.await?;
    Ok(())
}

#[tokio::test]
async fn isolation_level_follows_the_session() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new();
    let conn = mock_connection(&session);
    assert_eq!(conn.transaction_isolation_level().await?, IsolationLevel::ReadCommitted);
    conn.set_transaction_isolation_level(IsolationLevel::ReadCommitted)?
        .await?;
    let err = conn
        .set_transaction_isolation_level(IsolationLevel::Serializable)?
        .await
        .expect_err("session runs read committed");
    assert!(matches!(err, SqlBridgeError::Unsupported(_)));
    assert!(matches!(
        conn.set_transaction_isolation_level(IsolationLevel::RepeatableRead),
        Err(SqlBridgeError::Unsupported(_))
    ));

    let serializable = MockSession::new().with_isolation(SessionIsolation::Serializable);
    let conn = mock_connection(&serializable);
    let definition = TransactionDefinition::new().isolation_level(IsolationLevel::Serializable);
    conn.begin_transaction_with(&definition)?.await?;
    assert_eq!(conn.transaction_isolation_level().await?, IsolationLevel::Serializable);
    conn.set_transaction_isolation_level(IsolationLevel::Serializable)?
        .await?;

    let odd = MockSession::new().with_isolation(SessionIsolation::Other(4096));
    let conn = mock_connection(&odd);
    assert!(matches!(
        conn.transaction_isolation_level().await,
        Err(SqlBridgeError::Unsupported(_))
    ));
    Ok(())
}

#[tokio::test]
async fn local_validation_skips_the_query() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new();
    let conn = mock_connection(&session);

    assert!(conn.validate(ValidationDepth::Local).await?);
    assert!(executed_sql(&session).is_empty());
    Ok(())
}

#[tokio::test]
async fn remote_validation_runs_the_query() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new().with_script(
        "SELECT 1 FROM sys.dual",
        MockScript::results(vec![MockResult::column("1", vec![SqlValue::BigInt(1)])]),
    );
    let conn = mock_connection(&session);

    assert!(conn.validate(ValidationDepth::Remote).await?);
    assert_eq!(session.open_statements(), 0);
    Ok(())
}

#[tokio::test]
async fn remote_validation_failure_reports_false() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new().failing("execute", DriverError::new("connection reset"));
    let conn = mock_connection(&session);

    assert!(!conn.validate(ValidationDepth::Remote).await?);
    assert!(conn.validate(ValidationDepth::Local).await?);
    Ok(())
}

#[tokio::test]
async fn closed_connection_rejects_everything() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new();
    let conn = mock_connection(&session);

    conn.close().await?;
    // Closing twice is harmless.
    conn.close().await?;
    assert_eq!(session.count(|c| matches!(c, MockCall::Close)), 1);

    assert!(!conn.validate(ValidationDepth::Local).await?);
    assert!(matches!(
        conn.create_statement("SELECT 1"),
        Err(SqlBridgeError::IllegalState(_))
    ));
    assert!(matches!(
        conn.begin_transaction(),
        Err(SqlBridgeError::IllegalState(_))
    ));
    assert!(matches!(
        conn.set_auto_commit(true),
        Err(SqlBridgeError::IllegalState(_))
    ));
    assert!(matches!(
        conn.create_batch(),
        Err(SqlBridgeError::IllegalState(_))
    ));
    Ok(())
}

#[tokio::test]
async fn statement_outlives_its_connection_state() -> Result<(), Box<dyn std::error::Error>> {
    let conn = mock_connection(&MockSession::new());
    let mut stmt = conn.create_statement("SELECT :a")?;
    conn.close().await?;
    assert!(matches!(
        stmt.bind("a", 1_i64),
        Err(SqlBridgeError::IllegalState(_))
    ));
    Ok(())
}
