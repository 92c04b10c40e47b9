use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

use crate::driver::Session;
use crate::error::SqlBridgeError;
use crate::session::SessionHandle;

use super::row::{Columns, Row};

/// Rows fetched lazily from wherever a result keeps them.
#[async_trait]
pub(crate) trait RowSource: Send {
    /// Next row, or `None` once the source is exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>, SqlBridgeError>;
}

/// Default number of rows requested per round trip when no fetch size is set.
pub(crate) const DEFAULT_FETCH_ROWS: usize = 100;

/// Rows read from a driver cursor, one fetch-size page per round trip.
pub(crate) struct CursorRows<S: Session> {
    session: SessionHandle<S>,
    cursor: Option<S::Cursor>,
    columns: Option<Arc<Columns>>,
    buffer: VecDeque<Vec<crate::types::SqlValue>>,
    fetch_rows: usize,
    exhausted: bool,
}

impl<S: Session> CursorRows<S> {
    pub(crate) fn new(session: SessionHandle<S>, cursor: S::Cursor, fetch_size: u32) -> Self {
        let fetch_rows = match usize::try_from(fetch_size) {
            Ok(0) | Err(_) => DEFAULT_FETCH_ROWS,
            Ok(rows) => rows,
        };
        Self {
            session,
            cursor: Some(cursor),
            columns: None,
            buffer: VecDeque::new(),
            fetch_rows,
            exhausted: false,
        }
    }

    async fn fill(&mut self) -> Result<(), SqlBridgeError> {
        let Some(mut cursor) = self.cursor.take() else {
            self.exhausted = true;
            return Ok(());
        };
        let need_columns = self.columns.is_none();
        let max_rows = self.fetch_rows;
        let (cursor, columns, rows) = self
            .session
            .run(move |session| {
                let columns = if need_columns {
                    Some(session.column_names(&mut cursor)?)
                } else {
                    None
                };
                let rows = session.fetch(&mut cursor, max_rows)?;
                Ok((cursor, columns, rows))
            })
            .await?;
        if let Some(names) = columns {
            self.columns = Some(Arc::new(Columns::new(names)));
        }
        if rows.is_empty() {
            // The cursor itself is released when its statement closes.
            self.exhausted = true;
            drop(cursor);
        } else {
            tracing::trace!(rows = rows.len(), "fetched rows");
            self.buffer.extend(rows);
            self.cursor = Some(cursor);
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Session> RowSource for CursorRows<S> {
    async fn next_row(&mut self) -> Result<Option<Row>, SqlBridgeError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }
        match (self.buffer.pop_front(), &self.columns) {
            (Some(values), Some(columns)) => Ok(Some(Row::new(Arc::clone(columns), values))),
            (Some(_), None) => Err(SqlBridgeError::IllegalState(
                "cursor returned rows without column names".into(),
            )),
            (None, _) => Ok(None),
        }
    }
}

/// Rows already held in memory, such as the out-parameter row of a call.
pub(crate) struct MaterializedRows {
    rows: VecDeque<Row>,
}

impl MaterializedRows {
    pub(crate) fn new(rows: impl IntoIterator<Item = Row>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }
}

#[async_trait]
impl RowSource for MaterializedRows {
    async fn next_row(&mut self) -> Result<Option<Row>, SqlBridgeError> {
        Ok(self.rows.pop_front())
    }
}
