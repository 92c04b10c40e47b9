use std::collections::HashMap;
use std::path::Path;

use rusqlite::types::Value;

use crate::driver::{
    DriverResult, DriverValue, GeneratedColumns, PrepareKind, Session, SessionIsolation,
};
use crate::error::DriverError;
use crate::translation::to_positional;
use crate::type_map::DriverType;
use crate::types::SqlValue;

use super::params::sql_value_to_sqlite;
use super::query::{SqliteCursor, run_query};

/// Handle of a temporary large object held by a [`SqliteSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqliteLob(u64);

#[derive(Debug)]
enum LobBuffer {
    Binary(Vec<u8>),
    Text(String),
}

#[derive(Debug)]
enum Outcome {
    Rows(SqliteCursor),
    Count(i64),
}

/// A statement prepared on a [`SqliteSession`].
///
/// `rusqlite` statements borrow their connection, so the handle keeps the rewritten SQL and
/// re-prepares it from the connection's statement cache on every execution.
#[derive(Debug)]
pub struct SqliteStatement {
    sql: String,
    kind: PrepareKind,
    params: Vec<Value>,
    batch: Vec<Vec<Value>>,
    current: Option<Outcome>,
    generated: Option<SqliteCursor>,
}

/// Blocking driver session over one `rusqlite` connection.
///
/// Auto-commit is emulated: while it is disabled, the first statement of a transaction opens
/// it with `BEGIN`. `SET TRANSACTION` directives open a transaction the same way.
#[derive(Debug)]
pub struct SqliteSession {
    conn: Option<rusqlite::Connection>,
    auto_commit: bool,
    lobs: HashMap<u64, LobBuffer>,
    next_lob: u64,
}

impl SqliteSession {
    #[must_use]
    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn: Some(conn),
            auto_commit: true,
            lobs: HashMap::new(),
            next_lob: 0,
        }
    }

    /// # Errors
    /// Returns the `rusqlite` error if the database cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> DriverResult<Self> {
        Ok(Self::from_connection(rusqlite::Connection::open(path)?))
    }

    /// # Errors
    /// Returns the `rusqlite` error if the database cannot be opened.
    pub fn open_in_memory() -> DriverResult<Self> {
        Ok(Self::from_connection(rusqlite::Connection::open_in_memory()?))
    }

    /// Number of temporary large objects not yet freed.
    #[must_use]
    pub fn open_lobs(&self) -> usize {
        self.lobs.len()
    }

    fn conn(&self) -> DriverResult<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DriverError::new("connection is closed").with_sql_state("08003"))
    }

    /// Open the implicit transaction when auto-commit is off and none is active.
    fn ensure_transaction(&self) -> DriverResult<()> {
        let conn = self.conn()?;
        if !self.auto_commit && conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn run(&self, stmt: &SqliteStatement, params: &[Value]) -> DriverResult<Outcome> {
        let conn = self.conn()?;
        let mut prepared = conn.prepare_cached(&stmt.sql)?;
        if prepared.column_count() > 0 {
            Ok(Outcome::Rows(run_query(&mut prepared, params)?))
        } else {
            let changed = prepared.execute(rusqlite::params_from_iter(params.iter()))?;
            Ok(Outcome::Count(i64::try_from(changed).unwrap_or(i64::MAX)))
        }
    }

    /// Run DML with a `RETURNING` clause, reporting the affected row count and the returned
    /// values as generated keys.
    fn run_returning(
        &self,
        stmt: &SqliteStatement,
        columns: &GeneratedColumns,
    ) -> DriverResult<(i64, SqliteCursor)> {
        let returning = match columns {
            GeneratedColumns::DriverDefault => "rowid".to_string(),
            GeneratedColumns::Named(names) => names.join(", "),
        };
        let sql = format!(
            "{} RETURNING {returning}",
            stmt.sql.trim_end().trim_end_matches(';')
        );
        let conn = self.conn()?;
        let mut prepared = conn.prepare_cached(&sql)?;
        let keys = run_query(&mut prepared, &stmt.params)?;
        Ok((i64::try_from(keys.len()).unwrap_or(i64::MAX), keys))
    }

    fn is_query(&self, sql: &str) -> DriverResult<bool> {
        let prepared = self.conn()?.prepare_cached(sql)?;
        Ok(prepared.readonly() && prepared.column_count() > 0)
    }

    fn lob(&self, handle: SqliteLob) -> DriverResult<&LobBuffer> {
        self.lobs
            .get(&handle.0)
            .ok_or_else(|| DriverError::new(format!("unknown large object handle {}", handle.0)))
    }

    fn allocate(&mut self, buffer: LobBuffer) -> DriverResult<SqliteLob> {
        self.conn()?;
        let id = self.next_lob;
        self.next_lob += 1;
        self.lobs.insert(id, buffer);
        Ok(SqliteLob(id))
    }
}

fn is_set_transaction(sql: &str) -> bool {
    let mut words = sql.split_whitespace();
    matches!(
        (words.next(), words.next()),
        (Some(first), Some(second))
            if first.eq_ignore_ascii_case("SET") && second.eq_ignore_ascii_case("TRANSACTION")
    )
}

fn no_result(what: &str) -> DriverError {
    DriverError::new(format!("statement has no {what}"))
}

impl Session for SqliteSession {
    type Statement = SqliteStatement;
    type Cursor = SqliteCursor;
    type Lob = SqliteLob;

    fn prepare(&mut self, sql: &str, kind: &PrepareKind) -> DriverResult<SqliteStatement> {
        let sql = to_positional(sql).into_owned();
        if !is_set_transaction(&sql) {
            // Surface syntax errors at prepare time.
            self.conn()?.prepare_cached(&sql)?;
        }
        Ok(SqliteStatement {
            sql,
            kind: kind.clone(),
            params: Vec::new(),
            batch: Vec::new(),
            current: None,
            generated: None,
        })
    }

    fn set_fetch_size(&mut self, _stmt: &mut SqliteStatement, _rows: u32) -> DriverResult<()> {
        // Cursors are materialized; the page size is applied by `fetch`.
        Ok(())
    }

    fn bind(
        &mut self,
        stmt: &mut SqliteStatement,
        index: usize,
        value: DriverValue<SqliteLob>,
        _ty: DriverType,
    ) -> DriverResult<()> {
        let value = match value {
            DriverValue::Null => Value::Null,
            DriverValue::Value(value) => sql_value_to_sqlite(value),
            DriverValue::Lob(handle) => match self.lob(handle)? {
                LobBuffer::Binary(bytes) => Value::Blob(bytes.clone()),
                LobBuffer::Text(text) => Value::Text(text.clone()),
            },
        };
        if stmt.params.len() <= index {
            stmt.params.resize(index + 1, Value::Null);
        }
        stmt.params[index] = value;
        Ok(())
    }

    fn register_out(
        &mut self,
        _stmt: &mut SqliteStatement,
        index: usize,
        _ty: DriverType,
    ) -> DriverResult<()> {
        Err(DriverError::new(format!(
            "SQLite has no out parameters (parameter {index})"
        )))
    }

    fn add_batch(&mut self, stmt: &mut SqliteStatement) -> DriverResult<()> {
        let params = std::mem::take(&mut stmt.params);
        stmt.batch.push(params);
        Ok(())
    }

    fn execute(&mut self, stmt: &mut SqliteStatement) -> DriverResult<bool> {
        if is_set_transaction(&stmt.sql) {
            let conn = self.conn()?;
            if conn.is_autocommit() {
                conn.execute_batch("BEGIN")?;
            }
            stmt.current = Some(Outcome::Count(0));
            return Ok(false);
        }
        self.ensure_transaction()?;
        if let PrepareKind::GeneratedKeys(columns) = &stmt.kind {
            // Queries cannot take a RETURNING clause; run them as they are.
            if !self.is_query(&stmt.sql)? {
                let (count, keys) = self.run_returning(stmt, columns)?;
                stmt.current = Some(Outcome::Count(count));
                stmt.generated = Some(keys);
                return Ok(false);
            }
        }
        let outcome = self.run(stmt, &stmt.params)?;
        let is_rowset = matches!(outcome, Outcome::Rows(_));
        stmt.current = Some(outcome);
        Ok(is_rowset)
    }

    fn execute_batch(&mut self, stmt: &mut SqliteStatement) -> DriverResult<Vec<i64>> {
        self.ensure_transaction()?;
        let batch = std::mem::take(&mut stmt.batch);
        let mut counts = Vec::with_capacity(batch.len());
        for params in &batch {
            match self.run(stmt, params)? {
                Outcome::Count(count) => counts.push(count),
                Outcome::Rows(_) => {
                    return Err(DriverError::new("batch entry returned row data"));
                }
            }
        }
        Ok(counts)
    }

    fn more_results(&mut self, stmt: &mut SqliteStatement) -> DriverResult<bool> {
        // One SQL text yields one result.
        stmt.current = None;
        Ok(false)
    }

    fn update_count(&mut self, stmt: &mut SqliteStatement) -> DriverResult<i64> {
        Ok(match &stmt.current {
            Some(Outcome::Count(count)) => *count,
            _ => -1,
        })
    }

    fn result_set(&mut self, stmt: &mut SqliteStatement) -> DriverResult<SqliteCursor> {
        match stmt.current.take() {
            Some(Outcome::Rows(cursor)) => Ok(cursor),
            other => {
                stmt.current = other;
                Err(no_result("row data"))
            }
        }
    }

    fn generated_keys(&mut self, stmt: &mut SqliteStatement) -> DriverResult<SqliteCursor> {
        stmt.generated
            .take()
            .ok_or_else(|| no_result("generated values"))
    }

    fn out_value(&mut self, _stmt: &mut SqliteStatement, index: usize) -> DriverResult<SqlValue> {
        Err(DriverError::new(format!(
            "SQLite has no out parameters (parameter {index})"
        )))
    }

    fn close_statement(&mut self, stmt: SqliteStatement) -> DriverResult<()> {
        drop(stmt);
        Ok(())
    }

    fn column_names(&mut self, cursor: &mut SqliteCursor) -> DriverResult<Vec<String>> {
        Ok(cursor.columns().to_vec())
    }

    fn fetch(
        &mut self,
        cursor: &mut SqliteCursor,
        max_rows: usize,
    ) -> DriverResult<Vec<Vec<SqlValue>>> {
        Ok(cursor.take_page(max_rows))
    }

    fn allocate_blob(&mut self) -> DriverResult<SqliteLob> {
        self.allocate(LobBuffer::Binary(Vec::new()))
    }

    fn allocate_nclob(&mut self) -> DriverResult<SqliteLob> {
        self.allocate(LobBuffer::Text(String::new()))
    }

    fn write_blob(&mut self, lob: &SqliteLob, chunk: &[u8]) -> DriverResult<()> {
        match self.lobs.get_mut(&lob.0) {
            Some(LobBuffer::Binary(bytes)) => {
                bytes.extend_from_slice(chunk);
                Ok(())
            }
            _ => Err(DriverError::new(format!("{lob:?} is not a binary large object"))),
        }
    }

    fn write_clob(&mut self, lob: &SqliteLob, chunk: &str) -> DriverResult<()> {
        match self.lobs.get_mut(&lob.0) {
            Some(LobBuffer::Text(text)) => {
                text.push_str(chunk);
                Ok(())
            }
            _ => Err(DriverError::new(format!("{lob:?} is not a character large object"))),
        }
    }

    fn free_lob(&mut self, lob: SqliteLob) -> DriverResult<()> {
        self.lobs
            .remove(&lob.0)
            .map(|_| ())
            .ok_or_else(|| DriverError::new(format!("{lob:?} was already freed")))
    }

    fn auto_commit(&mut self) -> DriverResult<bool> {
        self.conn()?;
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()> {
        let conn = self.conn()?;
        if enabled && !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    fn isolation_level(&mut self) -> DriverResult<SessionIsolation> {
        self.conn()?;
        Ok(SessionIsolation::Serializable)
    }

    fn commit(&mut self) -> DriverResult<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn is_closed(&mut self) -> DriverResult<bool> {
        Ok(self.conn.is_none())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.lobs.clear();
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| DriverError::from(err)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_set_transaction() {
        assert!(is_set_transaction("SET TRANSACTION READ ONLY"));
        assert!(is_set_transaction("set  transaction name 'x'"));
        assert!(!is_set_transaction("SELECT 1"));
    }

    #[test]
    fn statements_keep_rewritten_sql() {
        let mut session = SqliteSession::open_in_memory().expect("in-memory database");
        let stmt = session
            .prepare("SELECT :a + :b", &PrepareKind::Plain)
            .expect("prepare");
        assert_eq!(stmt.sql, "SELECT ?1 + ?2");
    }

    #[test]
    fn lobs_are_freed_once() {
        let mut session = SqliteSession::open_in_memory().expect("in-memory database");
        let lob = session.allocate_blob().expect("blob");
        session.write_blob(&lob, b"abc").expect("write");
        assert_eq!(session.open_lobs(), 1);
        session.free_lob(lob).expect("free");
        assert!(session.free_lob(lob).is_err());
        assert_eq!(session.open_lobs(), 0);
    }
}
