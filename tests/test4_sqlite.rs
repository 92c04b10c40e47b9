#![cfg(feature = "sqlite")]

use async_sql_bridge::prelude::*;
use async_sql_bridge::sqlite::SqliteSession;
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

async fn run(conn: &Connection<SqliteSession>, sql: &str) -> Result<(), SqlBridgeError> {
    conn.create_statement(sql)?.execute()?.rows_updated().await?;
    Ok(())
}

async fn count_rows(conn: &Connection<SqliteSession>, table: &str) -> Result<i64, SqlBridgeError> {
    let execution = conn
        .create_statement(&format!("SELECT COUNT(*) AS n FROM {table}"))?
        .execute()?;
    let mut results = execution.subscribe()?;
    let mut count = None;
    while let Some(result) = results.next().await {
        let rows = result?.collect_rows().await?;
        count = rows.first().and_then(|row| row.get("n")).and_then(SqlValue::as_i64);
    }
    count.ok_or_else(|| SqlBridgeError::IllegalState("no count row".into()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_named_parameters_and_rows() -> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_builder(unique_db_path("rows")).connect().await?;
    run(&conn, "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INTEGER)").await?;

    let mut insert = conn.create_statement("INSERT INTO people (name, age) VALUES (:name, :age)")?;
    insert.bind("name", "alice")?.bind("age", 30_i64)?;
    assert_eq!(insert.execute()?.rows_updated().await?, vec![Some(1)]);
    insert.bind("name", "bob")?.bind_null("age", SqlType::Integer)?;
    assert_eq!(insert.execute()?.rows_updated().await?, vec![Some(1)]);

    let mut select = conn.create_statement("SELECT name, age FROM people WHERE name <> ? ORDER BY id")?;
    select.bind(0_usize, "nobody")?.fetch_size(1)?;
    let mut results = select.execute()?.subscribe()?;
    let result = results.next().await.expect("row data")?;
    assert!(result.is_row_data());
    let rows = result.collect_rows().await?;
    assert!(results.next().await.is_none());

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name").and_then(SqlValue::as_text), Some("alice"));
    assert_eq!(rows[0].get("age").and_then(SqlValue::as_i64), Some(30));
    assert_eq!(rows[1].get("age"), Some(&SqlValue::Null));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_batch_binds() -> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_builder(unique_db_path("batch")).connect().await?;
    run(&conn, "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)").await?;

    let mut insert = conn.create_statement("INSERT INTO items (id, label) VALUES (?, ?)")?;
    for id in 1..=3_i64 {
        insert.bind(0_usize, id)?.bind(1_usize, format!("item-{id}"))?.add()?;
    }
    let counts = insert.execute()?.rows_updated().await?;
    assert_eq!(counts, vec![Some(1); 3]);
    assert_eq!(count_rows(&conn, "items").await?, 3);

    let mut update = conn.create_statement("UPDATE items SET label = :label WHERE id >= :min")?;
    update.bind("label", "x")?.bind("min", 2_i64)?.add()?;
    update.bind("label", "y")?.bind("min", 3_i64)?;
    assert_eq!(update.execute()?.rows_updated().await?, vec![Some(2), Some(1)]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_generated_values() -> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_builder(":memory:".to_string()).connect().await?;
    run(&conn, "CREATE TABLE events (id INTEGER PRIMARY KEY AUTOINCREMENT, kind TEXT)").await?;
    run(&conn, "INSERT INTO events (kind) VALUES ('seed')").await?;

    let mut insert = conn.create_statement("INSERT INTO events (kind) VALUES (:kind)")?;
    insert.bind("kind", "login")?.return_generated_values(["id", "kind"])?;
    let mut results = insert.execute()?.subscribe()?;
    let result = results.next().await.expect("generated values")?;
    assert!(!result.is_row_data());
    let keys = result.collect_rows().await?;
    assert!(results.next().await.is_none());

    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].get("id").and_then(SqlValue::as_i64), Some(2));
    assert_eq!(keys[0].get("kind").and_then(SqlValue::as_text), Some("login"));

    let mut query = conn.create_statement("SELECT id FROM events")?;
    query.return_generated_values(Vec::<String>::new())?;
    let err = query.execute()?.rows_updated().await.expect_err("query cannot generate");
    assert!(matches!(err, SqlBridgeError::IllegalState(_)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_commit_and_rollback() -> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_builder(unique_db_path("tx")).connect().await?;
    run(&conn, "CREATE TABLE ledger (amount INTEGER)").await?;

    assert_eq!(conn.transaction_isolation_level().await?, IsolationLevel::Serializable);
    conn.begin_transaction()?.await?;
    assert!(!conn.is_auto_commit().await?);
    run(&conn, "INSERT INTO ledger VALUES (10)").await?;
    conn.rollback_transaction()?.await?;
    assert_eq!(count_rows(&conn, "ledger").await?, 0);

    let definition = TransactionDefinition::new().name("deposit");
    conn.begin_transaction_with(&definition)?.await?;
    run(&conn, "INSERT INTO ledger VALUES (20)").await?;
    conn.commit_transaction()?.await?;

    // Auto-commit is still off: the next insert opens a transaction committed on re-enable.
    run(&conn, "INSERT INTO ledger VALUES (30)").await?;
    conn.set_auto_commit(true)?.await?;
    assert!(conn.is_auto_commit().await?);

    conn.close().await?;
    assert!(conn.is_closed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_changes_survive_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let path = unique_db_path("reopen");
    let conn = sqlite_builder(path.clone()).connect().await?;
    run(&conn, "CREATE TABLE ledger (amount INTEGER)").await?;
    conn.set_auto_commit(false)?.await?;
    run(&conn, "INSERT INTO ledger VALUES (1)").await?;
    run(&conn, "INSERT INTO ledger VALUES (2)").await?;
    conn.set_auto_commit(true)?.await?;
    conn.close().await?;

    let reopened = sqlite_builder(path).connect().await?;
    assert_eq!(count_rows(&reopened, "ledger").await?, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_large_objects() -> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_builder(":memory:".to_string())
        .lob_chunk_size(8)
        .connect()
        .await?;
    run(&conn, "CREATE TABLE docs (data BLOB, body TEXT)").await?;

    let bytes: Vec<u8> = (0..100_u8).collect();
    let mut insert = conn.create_statement("INSERT INTO docs (data, body) VALUES (:data, :body)")?;
    insert
        .bind("data", Blob::from_bytes(bytes.clone(), 8))?
        .bind("body", Clob::from_text("größer als", 4))?;
    assert_eq!(insert.execute()?.rows_updated().await?, vec![Some(1)]);

    let execution = conn.create_statement("SELECT data, body FROM docs")?.execute()?;
    let mut results = execution.subscribe()?;
    let rows = results.next().await.expect("row data")?.collect_rows().await?;
    assert_eq!(rows[0].get("data").and_then(SqlValue::as_bytes), Some(bytes.as_slice()));
    assert_eq!(rows[0].get("body").and_then(SqlValue::as_text), Some("größer als"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_connection_batch_and_validation() -> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_builder(":memory:".to_string()).connect().await?;
    let mut batch = conn.create_batch()?;
    batch
        .add("CREATE TABLE a (x INTEGER)")?
        .add("INSERT INTO a VALUES (1)")?
        .add("INSERT INTO a VALUES (2)")?;
    let counts = batch.execute()?.rows_updated().await?;
    assert_eq!(counts, vec![Some(0), Some(1), Some(1)]);

    assert!(conn.validate(ValidationDepth::Remote).await?);
    conn.close().await?;
    assert!(!conn.validate(ValidationDepth::Remote).await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_errors_keep_driver_diagnostics() -> Result<(), Box<dyn std::error::Error>> {
    let conn = sqlite_builder(":memory:".to_string()).connect().await?;
    let err = conn
        .create_statement("SELECT * FROM missing_table")?
        .execute()?
        .rows_updated()
        .await
        .expect_err("no such table");
    let driver = err.driver_error().expect("driver error");
    assert!(driver.message().contains("missing_table"));

    let mut call = conn.create_statement("SELECT :v")?;
    call.bind("v", Parameter::out(SqlType::Integer))?;
    assert!(call.execute()?.rows_updated().await.is_err());
    Ok(())
}
