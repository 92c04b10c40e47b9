//! Results of executing a statement.
//!
//! A [`QueryResult`] is either row data or an update count. It carries a consumption signal:
//! the statement that produced it does not advance its cursor (or close) until the result has
//! been fully consumed, which happens when its rows are exhausted, when
//! [`QueryResult::rows_updated`] completes, or when the result is dropped.

use std::fmt;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::oneshot;

use crate::error::SqlBridgeError;

pub mod row;
pub(crate) mod source;

pub use row::{Columns, Row};
use source::RowSource;

/// Stream of rows belonging to one [`QueryResult`].
pub type RowStream = BoxStream<'static, Result<Row, SqlBridgeError>>;

enum ResultKind {
    UpdateCount(Option<u64>),
    Rows(Box<dyn RowSource>),
    GeneratedValues {
        count: Option<u64>,
        keys: Box<dyn RowSource>,
    },
    OutParameters(Row),
}

/// One discrete outcome of an execution.
pub struct QueryResult {
    kind: ResultKind,
    consumed: Option<oneshot::Sender<()>>,
}

/// Resolves once the paired [`QueryResult`] has been fully consumed or dropped.
pub(crate) struct Consumed(oneshot::Receiver<()>);

impl Consumed {
    pub(crate) async fn wait(self) {
        // Both an explicit signal and a dropped sender mean the result is finished with.
        let _ = self.0.await;
    }
}

impl QueryResult {
    fn with_kind(kind: ResultKind) -> (Self, Consumed) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                kind,
                consumed: Some(tx),
            },
            Consumed(rx),
        )
    }

    pub(crate) fn update_count(count: Option<u64>) -> (Self, Consumed) {
        Self::with_kind(ResultKind::UpdateCount(count))
    }

    pub(crate) fn row_data(rows: Box<dyn RowSource>) -> (Self, Consumed) {
        Self::with_kind(ResultKind::Rows(rows))
    }

    pub(crate) fn generated_values(
        count: Option<u64>,
        keys: Box<dyn RowSource>,
    ) -> (Self, Consumed) {
        Self::with_kind(ResultKind::GeneratedValues { count, keys })
    }

    pub(crate) fn out_parameters(row: Row) -> (Self, Consumed) {
        Self::with_kind(ResultKind::OutParameters(row))
    }

    /// Whether this result carries rows from a query (not generated values or out parameters).
    #[must_use]
    pub fn is_row_data(&self) -> bool {
        matches!(self.kind, ResultKind::Rows(_))
    }

    /// Whether this result exposes the out parameters of a procedure call.
    #[must_use]
    pub fn is_out_parameters(&self) -> bool {
        matches!(self.kind, ResultKind::OutParameters(_))
    }

    /// Number of rows updated, consuming the result.
    ///
    /// Query results and out-parameter results report `None`; their rows are discarded.
    ///
    /// # Errors
    /// Currently infallible; the `Result` keeps the signature aligned with the row accessors.
    pub async fn rows_updated(self) -> Result<Option<u64>, SqlBridgeError> {
        let count = match &self.kind {
            ResultKind::UpdateCount(count) | ResultKind::GeneratedValues { count, .. } => *count,
            ResultKind::Rows(_) | ResultKind::OutParameters(_) => None,
        };
        drop(self);
        Ok(count)
    }

    /// Stream the rows of this result. Update-count results yield no rows.
    #[must_use]
    pub fn rows(mut self) -> RowStream {
        let consumed = self.consumed.take();
        let source: Option<Box<dyn RowSource>> = match self.kind {
            ResultKind::UpdateCount(_) => None,
            ResultKind::Rows(rows) | ResultKind::GeneratedValues { keys: rows, .. } => Some(rows),
            ResultKind::OutParameters(row) => {
                Some(Box::new(source::MaterializedRows::new([row])))
            }
        };
        stream::unfold((source, consumed), |(source, consumed)| async move {
            let mut source = source?;
            match source.next_row().await {
                Ok(Some(row)) => Some((Ok(row), (Some(source), consumed))),
                // Exhausted: dropping the sender signals full consumption.
                Ok(None) => None,
                Err(err) => Some((Err(err), (None, consumed))),
            }
        })
        .boxed()
    }

    /// Collect every row of this result.
    ///
    /// # Errors
    /// Returns the first error raised while fetching rows.
    pub async fn collect_rows(self) -> Result<Vec<Row>, SqlBridgeError> {
        let mut rows = self.rows();
        let mut collected = Vec::new();
        while let Some(row) = rows.next().await {
            collected.push(row?);
        }
        Ok(collected)
    }

    /// Map every row through `mapper`.
    pub fn map<T, F>(self, mut mapper: F) -> BoxStream<'static, Result<T, SqlBridgeError>>
    where
        F: FnMut(&Row) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.rows()
            .map(move |row| row.map(|row| mapper(&row)))
            .boxed()
    }
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            ResultKind::UpdateCount(count) => format!("UpdateCount({count:?})"),
            ResultKind::Rows(_) => "Rows".to_string(),
            ResultKind::GeneratedValues { count, .. } => format!("GeneratedValues({count:?})"),
            ResultKind::OutParameters(row) => format!("OutParameters({} values)", row.len()),
        };
        f.debug_struct("QueryResult").field("kind", &kind).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlValue;
    use std::sync::Arc;

    #[tokio::test]
    async fn dropping_a_result_signals_consumption() {
        let (result, consumed) = QueryResult::update_count(Some(3));
        drop(result);
        consumed.wait().await;
    }

    #[tokio::test]
    async fn out_parameter_rows_stream_once() {
        let columns = Arc::new(Columns::new(vec!["0".into()]));
        let (result, consumed) =
            QueryResult::out_parameters(Row::new(columns, vec![SqlValue::Int(5)]));
        assert!(result.is_out_parameters());
        let rows = result.collect_rows().await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("0"), Some(&SqlValue::Int(5)));
        consumed.wait().await;
    }

    #[tokio::test]
    async fn update_count_results_have_no_rows() {
        let (result, _consumed) = QueryResult::update_count(Some(1));
        assert!(!result.is_row_data());
        assert_eq!(result.rows_updated().await.expect("count"), Some(1));
    }
}
