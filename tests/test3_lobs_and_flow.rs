#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_sql_bridge::prelude::*;
use async_sql_bridge::type_map::DriverType;
use async_sql_bridge::test_utils::{MockCall, MockResult, MockScript, MockSession, mock_connection};
use futures_util::stream;
use tokio::time::{sleep, timeout};

/// Poll `check` until it holds or two seconds pass.
async fn eventually(check: impl Fn() -> bool) -> bool {
    timeout(Duration::from_secs(2), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

fn counter_hook(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blob_is_written_in_chunks_and_freed() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new();
    let conn = mock_connection(&session);
    let discarded = Arc::new(AtomicUsize::new(0));

    let blob = Blob::from_bytes(vec![7_u8; 10], 4).on_discard(counter_hook(&discarded));
    let mut stmt = conn.create_statement("INSERT INTO files (data) VALUES (:data)")?;
    stmt.bind("data", blob)?;
    let counts = stmt.execute()?.rows_updated().await?;

    assert_eq!(counts, vec![Some(0)]);
    let writes: Vec<usize> = session
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            MockCall::WriteBlob(_, len) => Some(len),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec![4, 4, 2]);
    assert_eq!(discarded.load(Ordering::SeqCst), 1);
    assert_eq!(session.count(|c| matches!(c, MockCall::FreeLob(_))), 1);
    assert_eq!(session.open_lobs(), 0);

    // The lob is freed only after the statement is closed.
    let calls = session.calls();
    let closed = calls
        .iter()
        .position(|c| matches!(c, MockCall::CloseStatement(_)))
        .expect("statement closed");
    let freed = calls
        .iter()
        .position(|c| matches!(c, MockCall::FreeLob(_)))
        .expect("lob freed");
    assert!(closed < freed);
    Ok(())
}

#[tokio::test]
async fn bytes_declared_as_blob_upload_in_configured_chunks() -> Result<(), Box<dyn std::error::Error>>
{
    let session = MockSession::new();
    let options = SessionOptions::builder().lob_chunk_size(4).finish()?;
    let conn = Connection::with_options(session.clone(), options);

    let mut stmt = conn.create_statement("INSERT INTO files (data) VALUES (?)")?;
    stmt.bind(0_usize, Parameter::typed(SqlValue::Bytes(vec![0; 10]), SqlType::Blob))?;
    stmt.execute()?.rows_updated().await?;

    assert_eq!(session.count(|c| matches!(c, MockCall::WriteBlob(..))), 3);
    assert_eq!(session.count(|c| matches!(c, MockCall::FreeLob(_))), 1);
    Ok(())
}

#[tokio::test]
async fn clob_binds_as_nclob() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new();
    let conn = mock_connection(&session);

    let mut stmt = conn.create_statement("INSERT INTO notes (body) VALUES (?)")?;
    stmt.bind(0_usize, Clob::from_text("héllo wörld", 3))?;
    stmt.execute()?.rows_updated().await?;

    assert!(session.calls().iter().any(|call| matches!(
        call,
        MockCall::Bind {
            lob: Some(_),
            ty: DriverType::NClob,
            ..
        }
    )));
    assert!(session.count(|c| matches!(c, MockCall::WriteClob(..))) >= 4);
    assert_eq!(session.open_lobs(), 0);
    Ok(())
}

#[tokio::test]
async fn lob_cannot_bind_to_repeated_name() -> Result<(), Box<dyn std::error::Error>> {
    let conn = mock_connection(&MockSession::new());
    let mut stmt = conn.create_statement("SELECT :b FROM t WHERE x = :b")?;
    assert!(matches!(
        stmt.bind("b", Blob::from_bytes(vec![1, 2, 3], 8)),
        Err(SqlBridgeError::InvalidArgument(_))
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_subscription_frees_lobs_once() -> Result<(), Box<dyn std::error::Error>> {
    let sql = "SELECT * FROM t WHERE data = :data";
    let rows = (0..50).map(SqlValue::Int).collect();
    let session =
        MockSession::new().with_script(sql, MockScript::results(vec![MockResult::column("N", rows)]));
    let conn = mock_connection(&session);
    let discarded = Arc::new(AtomicUsize::new(0));

    let mut stmt = conn.create_statement(sql)?;
    stmt.bind(
        "data",
        Blob::from_bytes(vec![1; 64], 16).on_discard(counter_hook(&discarded)),
    )?
    .fetch_size(5)?;
    let mut results = stmt.execute()?.subscribe()?;
    let result = results.next().await.expect("first result")?;
    let mut rows = result.rows();
    assert!(rows.next().await.is_some());
    drop(rows);
    drop(results);

    let watch = session.clone();
    assert!(eventually(move || watch.open_lobs() == 0 && watch.open_statements() == 0).await);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(session.count(|c| matches!(c, MockCall::FreeLob(_))), 1);
    assert_eq!(discarded.load(Ordering::SeqCst), 1);
    // Only the first page was fetched.
    assert_eq!(session.count(|c| matches!(c, MockCall::Fetch(5))), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelling_a_stalled_upload_releases_everything() -> Result<(), Box<dyn std::error::Error>>
{
    let session = MockSession::new();
    let conn = mock_connection(&session);
    let discarded = Arc::new(AtomicUsize::new(0));

    let chunks = stream::iter([Ok(vec![1_u8; 4])]).chain(stream::pending());
    let blob = Blob::from_stream(chunks).on_discard(counter_hook(&discarded));
    let mut stmt = conn.create_statement("INSERT INTO files (data) VALUES (?)")?;
    stmt.bind(0_usize, blob)?;
    let results = stmt.execute()?.subscribe()?;

    let watch = session.clone();
    assert!(eventually(move || watch.count(|c| matches!(c, MockCall::WriteBlob(..))) == 1).await);
    assert_eq!(session.open_statements(), 1);
    assert_eq!(session.open_lobs(), 1);
    drop(results);

    let watch = session.clone();
    assert!(eventually(move || watch.open_lobs() == 0 && watch.open_statements() == 0).await);
    assert_eq!(session.count(|c| matches!(c, MockCall::FreeLob(_))), 1);
    assert_eq!(session.count(|c| matches!(c, MockCall::Execute(_))), 0);
    assert_eq!(discarded.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn failed_release_is_reported_as_cleanup() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new().failing("free_lob", DriverError::new("free failed"));
    let conn = mock_connection(&session);

    let mut stmt = conn.create_statement("INSERT INTO files VALUES (?)")?;
    stmt.bind(0_usize, Blob::from_bytes(vec![1, 2], 8))?;
    let mut results = stmt.execute()?.subscribe()?;

    let first = results.next().await.expect("count")?;
    assert_eq!(first.rows_updated().await?, Some(0));
    match results.next().await {
        Some(Err(SqlBridgeError::Cleanup { primary, failures })) => {
            assert!(primary.is_none());
            assert_eq!(failures.len(), 1);
        }
        other => panic!("expected cleanup failure, got {other:?}"),
    }
    assert!(results.next().await.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn next_result_waits_for_consumption() -> Result<(), Box<dyn std::error::Error>> {
    let sql = "BEGIN report; END;";
    let session = MockSession::new().with_script(
        sql,
        MockScript::results(vec![
            MockResult::column("A", vec![SqlValue::Int(1), SqlValue::Int(2)]),
            MockResult::Count(3),
        ]),
    );
    let conn = mock_connection(&session);

    let mut results = conn.create_statement(sql)?.execute()?.subscribe()?;
    let first = results.next().await.expect("row data")?;
    assert!(first.is_row_data());

    sleep(Duration::from_millis(50)).await;
    assert_eq!(session.count(|c| matches!(c, MockCall::MoreResults)), 0);

    let rows = first.collect_rows().await?;
    assert_eq!(rows.len(), 2);
    let second = results.next().await.expect("update count")?;
    assert_eq!(session.count(|c| matches!(c, MockCall::MoreResults)), 1);

    // The statement stays open until the last result is consumed.
    sleep(Duration::from_millis(20)).await;
    assert_eq!(session.open_statements(), 1);
    assert_eq!(second.rows_updated().await?, Some(3));
    assert!(results.next().await.is_none());
    assert_eq!(session.open_statements(), 0);
    Ok(())
}

#[tokio::test]
async fn dropping_a_result_counts_as_consumed() -> Result<(), Box<dyn std::error::Error>> {
    let sql = "BEGIN two; END;";
    let session = MockSession::new().with_script(
        sql,
        MockScript::results(vec![
            MockResult::column("A", vec![SqlValue::Int(1)]),
            MockResult::column("B", vec![SqlValue::Int(2)]),
        ]),
    );
    let conn = mock_connection(&session);

    let mut results = conn.create_statement(sql)?.execute()?.subscribe()?;
    drop(results.next().await.expect("first")?);
    let second = results.next().await.expect("second")?;
    let values: Vec<Result<Option<i64>, SqlBridgeError>> = second
        .map(|row| row.get("b").and_then(SqlValue::as_i64))
        .collect()
        .await;
    assert!(matches!(values.as_slice(), [Ok(Some(2))]));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_runs_statements_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new()
        .with_script("DELETE FROM a", MockScript::results(vec![MockResult::Count(4)]))
        .with_script("DELETE FROM b", MockScript::results(vec![MockResult::Count(2)]));
    let conn = mock_connection(&session);

    let mut batch = conn.create_batch()?;
    batch.add("DELETE FROM a")?.add("DELETE FROM b")?;
    let counts = batch.execute()?.rows_updated().await?;
    assert_eq!(counts, vec![Some(4), Some(2)]);

    let mut with_marker = conn.create_batch()?;
    with_marker.add("DELETE FROM a WHERE id = ?")?;
    assert!(matches!(
        with_marker.execute(),
        Err(SqlBridgeError::IllegalState(_))
    ));
    Ok(())
}

#[tokio::test]
async fn batch_stops_at_first_failure() -> Result<(), Box<dyn std::error::Error>> {
    let session = MockSession::new().failing("execute", DriverError::new("no such table"));
    let conn = mock_connection(&session);

    let mut batch = conn.create_batch()?;
    batch.add("DELETE FROM a")?.add("DELETE FROM b")?;
    let mut results = batch.execute()?.subscribe()?;
    assert!(matches!(results.next().await, Some(Err(SqlBridgeError::Driver(_)))));
    assert!(results.next().await.is_none());
    assert_eq!(session.count(|c| matches!(c, MockCall::Execute(_))), 1);
    Ok(())
}
