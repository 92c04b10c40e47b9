//! Scripted in-memory driver that records every call made on it.
//!
//! Clones share state, so a test keeps one clone for assertions and hands the other to a
//! [`Connection`](crate::connection::Connection).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::driver::{DriverResult, DriverValue, PrepareKind, Session, SessionIsolation};
use crate::error::DriverError;
use crate::type_map::DriverType;
use crate::types::SqlValue;

/// One result a scripted statement produces.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResult {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
    },
    Count(i64),
}

impl MockResult {
    /// Single-column rows.
    #[must_use]
    pub fn column(name: &str, values: Vec<SqlValue>) -> Self {
        MockResult::Rows {
            columns: vec![name.to_string()],
            rows: values.into_iter().map(|value| vec![value]).collect(),
        }
    }
}

/// What executing a given SQL text does.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    /// Results in the order the driver reports them. Empty means a single count of 0.
    pub results: Vec<MockResult>,
    /// Rows returned as generated keys.
    pub generated: Option<MockResult>,
    /// Out parameter values by zero-based parameter position.
    pub out_values: HashMap<usize, SqlValue>,
    /// Count reported for every batch entry; 1 when unset.
    pub batch_count: Option<i64>,
}

impl MockScript {
    #[must_use]
    pub fn results(results: Vec<MockResult>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }
}

/// A recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Prepare(String, PrepareKind),
    SetFetchSize(u32),
    Bind {
        index: usize,
        value: Option<SqlValue>,
        lob: Option<u64>,
        ty: DriverType,
    },
    RegisterOut(usize, DriverType),
    AddBatch,
    Execute(String),
    ExecuteBatch(usize),
    MoreResults,
    ResultSet,
    GeneratedKeys,
    OutValue(usize),
    Fetch(usize),
    CloseStatement(String),
    AllocateBlob(u64),
    AllocateNClob(u64),
    WriteBlob(u64, usize),
    WriteClob(u64, usize),
    FreeLob(u64),
    AutoCommit,
    SetAutoCommit(bool),
    IsolationLevel,
    Commit,
    Rollback,
    IsClosed,
    Close,
}

#[derive(Debug)]
struct MockState {
    scripts: HashMap<String, MockScript>,
    failures: HashMap<&'static str, DriverError>,
    calls: Vec<MockCall>,
    auto_commit: bool,
    isolation: SessionIsolation,
    closed: bool,
    lobs: HashMap<u64, Vec<u8>>,
    next_lob: u64,
    open_statements: usize,
}

/// Scripted driver session.
#[derive(Debug, Clone)]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug)]
pub struct MockStatement {
    sql: String,
    pending: VecDeque<MockResult>,
    current: Option<MockResult>,
    script: MockScript,
    batch: usize,
}

#[derive(Debug)]
pub struct MockCursor {
    columns: Vec<String>,
    rows: VecDeque<Vec<SqlValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockLob(u64);

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                scripts: HashMap::new(),
                failures: HashMap::new(),
                calls: Vec::new(),
                auto_commit: true,
                isolation: SessionIsolation::ReadCommitted,
                closed: false,
                lobs: HashMap::new(),
                next_lob: 1,
                open_statements: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread poisons the lock; the state is still usable for assertions.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Script what executing `sql` produces.
    #[must_use]
    pub fn with_script(self, sql: &str, script: MockScript) -> Self {
        self.state().scripts.insert(sql.to_string(), script);
        self
    }

    /// Make every call of the driver operation named `op` fail with `err`.
    #[must_use]
    pub fn failing(self, op: &'static str, err: DriverError) -> Self {
        self.state().failures.insert(op, err);
        self
    }

    #[must_use]
    pub fn with_isolation(self, isolation: SessionIsolation) -> Self {
        self.state().isolation = isolation;
        self
    }

    #[must_use]
    pub fn with_auto_commit(self, enabled: bool) -> Self {
        self.state().auto_commit = enabled;
        self
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| pred(call)).count()
    }

    #[must_use]
    pub fn commits(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Commit))
    }

    /// Large objects allocated and not yet freed.
    #[must_use]
    pub fn open_lobs(&self) -> usize {
        self.state().lobs.len()
    }

    /// Statements prepared and not yet closed.
    #[must_use]
    pub fn open_statements(&self) -> usize {
        self.state().open_statements
    }

    #[must_use]
    pub fn auto_commit_flag(&self) -> bool {
        self.state().auto_commit
    }

    /// Record `call` when the caller has no further use for the state.
    fn log(&self, op: &'static str, call: MockCall) -> DriverResult<()> {
        self.record(op, call).map(drop)
    }

    fn record(&self, op: &'static str, call: MockCall) -> DriverResult<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        state.calls.push(call);
        if let Some(err) = state.failures.get(op) {
            return Err(err.clone());
        }
        if state.closed && op != "close" && op != "is_closed" {
            return Err(DriverError::new("session is closed").with_sql_state("08003"));
        }
        Ok(state)
    }
}

fn rows_cursor(result: MockResult) -> MockCursor {
    match result {
        MockResult::Rows { columns, rows } => MockCursor {
            columns,
            rows: rows.into(),
        },
        MockResult::Count(_) => MockCursor {
            columns: Vec::new(),
            rows: VecDeque::new(),
        },
    }
}

impl Session for MockSession {
    type Statement = MockStatement;
    type Cursor = MockCursor;
    type Lob = MockLob;

    fn prepare(&mut self, sql: &str, kind: &PrepareKind) -> DriverResult<MockStatement> {
        let mut state = self.record("prepare", MockCall::Prepare(sql.to_string(), kind.clone()))?;
        let script = state.scripts.get(sql).cloned().unwrap_or_default();
        state.open_statements += 1;
        Ok(MockStatement {
            sql: sql.to_string(),
            pending: VecDeque::new(),
            current: None,
            script,
            batch: 0,
        })
    }

    fn set_fetch_size(&mut self, _stmt: &mut MockStatement, rows: u32) -> DriverResult<()> {
        self.log("set_fetch_size", MockCall::SetFetchSize(rows))?;
        Ok(())
    }

    fn bind(
        &mut self,
        _stmt: &mut MockStatement,
        index: usize,
        value: DriverValue<MockLob>,
        ty: DriverType,
    ) -> DriverResult<()> {
        let (value, lob) = match value {
            DriverValue::Null => (None, None),
            DriverValue::Value(value) => (Some(value), None),
            DriverValue::Lob(MockLob(id)) => (None, Some(id)),
        };
        self.log("bind", MockCall::Bind {
            index,
            value,
            lob,
            ty,
        })?;
        Ok(())
    }

    fn register_out(
        &mut self,
        _stmt: &mut MockStatement,
        index: usize,
        ty: DriverType,
    ) -> DriverResult<()> {
        self.log("register_out", MockCall::RegisterOut(index, ty))?;
        Ok(())
    }

    fn add_batch(&mut self, stmt: &mut MockStatement) -> DriverResult<()> {
        self.log("add_batch", MockCall::AddBatch)?;
        stmt.batch += 1;
        Ok(())
    }

    fn execute(&mut self, stmt: &mut MockStatement) -> DriverResult<bool> {
        self.log("execute", MockCall::Execute(stmt.sql.clone()))?;
        let mut results: VecDeque<MockResult> = stmt.script.results.clone().into();
        if results.is_empty() {
            results.push_back(MockResult::Count(0));
        }
        stmt.current = results.pop_front();
        stmt.pending = results;
        Ok(matches!(stmt.current, Some(MockResult::Rows { .. })))
    }

    fn execute_batch(&mut self, stmt: &mut MockStatement) -> DriverResult<Vec<i64>> {
        self.log("execute_batch", MockCall::ExecuteBatch(stmt.batch))?;
        let count = stmt.script.batch_count.unwrap_or(1);
        let entries = std::mem::take(&mut stmt.batch);
        Ok(vec![count; entries])
    }

    fn more_results(&mut self, stmt: &mut MockStatement) -> DriverResult<bool> {
        self.log("more_results", MockCall::MoreResults)?;
        stmt.current = stmt.pending.pop_front();
        Ok(matches!(stmt.current, Some(MockResult::Rows { .. })))
    }

    fn update_count(&mut self, stmt: &mut MockStatement) -> DriverResult<i64> {
        Ok(match stmt.current {
            Some(MockResult::Count(count)) => count,
            _ => -1,
        })
    }

    fn result_set(&mut self, stmt: &mut MockStatement) -> DriverResult<MockCursor> {
        self.log("result_set", MockCall::ResultSet)?;
        match stmt.current.take() {
            Some(result @ MockResult::Rows { .. }) => Ok(rows_cursor(result)),
            other => {
                stmt.current = other;
                Err(DriverError::new("current result is not row data"))
            }
        }
    }

    fn generated_keys(&mut self, stmt: &mut MockStatement) -> DriverResult<MockCursor> {
        self.log("generated_keys", MockCall::GeneratedKeys)?;
        Ok(rows_cursor(stmt.script.generated.clone().unwrap_or(
            MockResult::Rows {
                columns: vec!["ROWID".into()],
                rows: Vec::new(),
            },
        )))
    }

    fn out_value(&mut self, stmt: &mut MockStatement, index: usize) -> DriverResult<SqlValue> {
        self.log("out_value", MockCall::OutValue(index))?;
        Ok(stmt
            .script
            .out_values
            .get(&index)
            .cloned()
            .unwrap_or(SqlValue::Null))
    }

    fn close_statement(&mut self, stmt: MockStatement) -> DriverResult<()> {
        let mut state = self.record("close_statement", MockCall::CloseStatement(stmt.sql))?;
        state.open_statements = state.open_statements.saturating_sub(1);
        Ok(())
    }

    fn column_names(&mut self, cursor: &mut MockCursor) -> DriverResult<Vec<String>> {
        Ok(cursor.columns.clone())
    }

    fn fetch(
        &mut self,
        cursor: &mut MockCursor,
        max_rows: usize,
    ) -> DriverResult<Vec<Vec<SqlValue>>> {
        self.log("fetch", MockCall::Fetch(max_rows))?;
        let count = max_rows.min(cursor.rows.len());
        Ok(cursor.rows.drain(..count).collect())
    }

    fn allocate_blob(&mut self) -> DriverResult<MockLob> {
        let id = self.state().next_lob;
        let mut state = self.record("allocate_blob", MockCall::AllocateBlob(id))?;
        state.next_lob += 1;
        state.lobs.insert(id, Vec::new());
        Ok(MockLob(id))
    }

    fn allocate_nclob(&mut self) -> DriverResult<MockLob> {
        let id = self.state().next_lob;
        let mut state = self.record("allocate_nclob", MockCall::AllocateNClob(id))?;
        state.next_lob += 1;
        state.lobs.insert(id, Vec::new());
        Ok(MockLob(id))
    }

    fn write_blob(&mut self, lob: &MockLob, chunk: &[u8]) -> DriverResult<()> {
        let mut state = self.record("write_blob", MockCall::WriteBlob(lob.0, chunk.len()))?;
        state
            .lobs
            .get_mut(&lob.0)
            .ok_or_else(|| DriverError::new("unknown large object"))?
            .extend_from_slice(chunk);
        Ok(())
    }

    fn write_clob(&mut self, lob: &MockLob, chunk: &str) -> DriverResult<()> {
        let mut state = self.record("write_clob", MockCall::WriteClob(lob.0, chunk.len()))?;
        state
            .lobs
            .get_mut(&lob.0)
            .ok_or_else(|| DriverError::new("unknown large object"))?
            .extend_from_slice(chunk.as_bytes());
        Ok(())
    }

    fn free_lob(&mut self, lob: MockLob) -> DriverResult<()> {
        let mut state = self.record("free_lob", MockCall::FreeLob(lob.0))?;
        state
            .lobs
            .remove(&lob.0)
            .map(|_| ())
            .ok_or_else(|| DriverError::new("large object freed twice"))
    }

    fn auto_commit(&mut self) -> DriverResult<bool> {
        let state = self.record("auto_commit", MockCall::AutoCommit)?;
        Ok(state.auto_commit)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()> {
        let mut state = self.record("set_auto_commit", MockCall::SetAutoCommit(enabled))?;
        state.auto_commit = enabled;
        Ok(())
    }

    fn isolation_level(&mut self) -> DriverResult<SessionIsolation> {
        let state = self.record("isolation_level", MockCall::IsolationLevel)?;
        Ok(state.isolation)
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.log("commit", MockCall::Commit)?;
        Ok(())
    }

    fn rollback(&mut self) -> DriverResult<()> {
        self.log("rollback", MockCall::Rollback)?;
        Ok(())
    }

    fn is_closed(&mut self) -> DriverResult<bool> {
        let state = self.record("is_closed", MockCall::IsClosed)?;
        Ok(state.closed)
    }

    fn close(&mut self) -> DriverResult<()> {
        let mut state = self.record("close", MockCall::Close)?;
        state.closed = true;
        Ok(())
    }
}
