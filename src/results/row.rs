use std::collections::HashMap;
use std::sync::Arc;

use crate::types::SqlValue;

/// Column names of one result, shared by all of its rows.
#[derive(Debug)]
pub struct Columns {
    names: Vec<String>,
    // Internal cache for faster column lookups (to avoid repeated string comparisons)
    index_cache: HashMap<String, usize>,
}

impl Columns {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        let mut index_cache = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // First occurrence wins for duplicated names
            index_cache.entry(name.clone()).or_insert(i);
        }
        Self { names, index_cache }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by name.
    ///
    /// Exact matches are found through the cache; otherwise the lookup falls back to a
    /// case-insensitive scan, since databases commonly report identifiers upper-cased.
    #[must_use]
    pub fn index_of(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.index_cache.get(column_name) {
            return Some(idx);
        }
        self.names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }
}

/// A row of a query result, an out-parameter result, or a generated-values result.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Columns>,
    values: Vec<SqlValue>,
}

impl Row {
    #[must_use]
    pub fn new(columns: Arc<Columns>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    #[must_use]
    pub fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        self.columns
            .index_of(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by zero-based column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
