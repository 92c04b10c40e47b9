use std::collections::VecDeque;

use rusqlite::Statement;
use rusqlite::types::Value;

use crate::types::SqlValue;

use super::params::sqlite_to_sql_value;

/// Rows of a finished query, handed out a page at a time.
#[derive(Debug, Clone, Default)]
pub struct SqliteCursor {
    columns: Vec<String>,
    rows: VecDeque<Vec<SqlValue>>,
}

impl SqliteCursor {
    pub(crate) fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn take_page(&mut self, max_rows: usize) -> Vec<Vec<SqlValue>> {
        let count = max_rows.max(1).min(self.rows.len());
        self.rows.drain(..count).collect()
    }
}

/// Run a prepared query and materialize every row.
///
/// # Errors
/// Returns the `rusqlite` error if the query or a value extraction fails.
pub(crate) fn run_query(
    stmt: &mut Statement<'_>,
    params: &[Value],
) -> Result<SqliteCursor, rusqlite::Error> {
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let column_count = columns.len();

    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut collected = VecDeque::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            let value: Value = row.get(idx)?;
            values.push(sqlite_to_sql_value(value));
        }
        collected.push_back(values);
    }
    Ok(SqliteCursor {
        columns,
        rows: collected,
    })
}
