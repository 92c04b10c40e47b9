//! Contract of the blocking, call-by-call driver this crate adapts.
//!
//! Every method may block the calling thread. The adapter only ever calls them from
//! `spawn_blocking` while holding the session lock, so an implementation never sees two calls
//! at once. Handles (`Statement`, `Cursor`, `Lob`) are plain values owned by the adapter and
//! handed back to the session for every operation on them.

use crate::error::DriverError;
use crate::type_map::DriverType;
use crate::types::SqlValue;

pub type DriverResult<T> = Result<T, DriverError>;

/// How a statement handle is prepared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareKind {
    /// Arbitrary SQL.
    Plain,
    /// Stored procedure call with out parameters.
    Call,
    /// DML that returns generated values.
    GeneratedKeys(GeneratedColumns),
}

/// Which generated values a DML statement returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedColumns {
    /// Whatever the driver returns by default (usually a row identifier).
    DriverDefault,
    /// The named columns, in order.
    Named(Vec<String>),
}

/// A value handed to [`Session::bind`].
#[derive(Debug, Clone, PartialEq)]
pub enum DriverValue<L> {
    Null,
    Value(SqlValue),
    /// A temporary large object previously allocated on the session.
    Lob(L),
}

/// Session isolation levels a driver may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionIsolation {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    /// Vendor specific level code
    Other(i32),
}

/// One logical database session of a blocking driver.
pub trait Session: Send + 'static {
    type Statement: Send + 'static;
    type Cursor: Send + 'static;
    type Lob: Clone + Send + Sync + 'static;

    fn prepare(&mut self, sql: &str, kind: &PrepareKind) -> DriverResult<Self::Statement>;

    fn set_fetch_size(&mut self, stmt: &mut Self::Statement, rows: u32) -> DriverResult<()>;

    /// Bind `value` at the zero-based parameter `index`.
    fn bind(
        &mut self,
        stmt: &mut Self::Statement,
        index: usize,
        value: DriverValue<Self::Lob>,
        ty: DriverType,
    ) -> DriverResult<()>;

    /// Register the zero-based parameter `index` as an out parameter of type `ty`.
    fn register_out(
        &mut self,
        stmt: &mut Self::Statement,
        index: usize,
        ty: DriverType,
    ) -> DriverResult<()>;

    /// Queue the currently bound values as one batch entry.
    fn add_batch(&mut self, stmt: &mut Self::Statement) -> DriverResult<()>;

    /// Execute the statement; `true` when the first result is row data.
    fn execute(&mut self, stmt: &mut Self::Statement) -> DriverResult<bool>;

    /// Execute every queued batch entry, returning one update count per entry.
    fn execute_batch(&mut self, stmt: &mut Self::Statement) -> DriverResult<Vec<i64>>;

    /// Advance to the next result; `true` when it is row data.
    fn more_results(&mut self, stmt: &mut Self::Statement) -> DriverResult<bool>;

    /// Update count of the current result; negative when there is none.
    fn update_count(&mut self, stmt: &mut Self::Statement) -> DriverResult<i64>;

    fn result_set(&mut self, stmt: &mut Self::Statement) -> DriverResult<Self::Cursor>;

    fn generated_keys(&mut self, stmt: &mut Self::Statement) -> DriverResult<Self::Cursor>;

    /// Value of the out parameter at zero-based `index` after execution.
    fn out_value(&mut self, stmt: &mut Self::Statement, index: usize) -> DriverResult<SqlValue>;

    /// Close the statement together with any cursor it opened.
    fn close_statement(&mut self, stmt: Self::Statement) -> DriverResult<()>;

    fn column_names(&mut self, cursor: &mut Self::Cursor) -> DriverResult<Vec<String>>;

    /// Fetch up to `max_rows` rows; an empty vector means the cursor is exhausted.
    fn fetch(
        &mut self,
        cursor: &mut Self::Cursor,
        max_rows: usize,
    ) -> DriverResult<Vec<Vec<SqlValue>>>;

    fn allocate_blob(&mut self) -> DriverResult<Self::Lob>;

    /// Allocate a character LOB able to hold any Unicode text.
    fn allocate_nclob(&mut self) -> DriverResult<Self::Lob>;

    fn write_blob(&mut self, lob: &Self::Lob, chunk: &[u8]) -> DriverResult<()>;

    fn write_clob(&mut self, lob: &Self::Lob, chunk: &str) -> DriverResult<()>;

    fn free_lob(&mut self, lob: Self::Lob) -> DriverResult<()>;

    fn auto_commit(&mut self) -> DriverResult<bool>;

    fn set_auto_commit(&mut self, enabled: bool) -> DriverResult<()>;

    fn isolation_level(&mut self) -> DriverResult<SessionIsolation>;

    fn commit(&mut self) -> DriverResult<()>;

    fn rollback(&mut self) -> DriverResult<()>;

    fn is_closed(&mut self) -> DriverResult<bool>;

    fn close(&mut self) -> DriverResult<()>;

    /// Quote `literal` as a SQL string literal.
    fn enquote_literal(&mut self, literal: &str) -> DriverResult<String> {
        Ok(format!("'{}'", literal.replace('\'', "''")))
    }
}
