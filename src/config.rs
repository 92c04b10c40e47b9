use serde::{Deserialize, Serialize};

use crate::error::SqlBridgeError;

/// Default size of the chunks an in-memory large object is written in.
pub const DEFAULT_LOB_CHUNK_SIZE: usize = 32 * 1024;

/// Default query run by remote validation.
pub const DEFAULT_VALIDATION_QUERY: &str = "SELECT 1 FROM sys.dual";

/// Options shared by every statement created on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Rows fetched per round trip when a statement sets no fetch size; 0 leaves it to the driver.
    pub default_fetch_size: u32,
    pub lob_chunk_size: usize,
    /// Single-row query whose first column is 1 on a healthy session.
    pub validation_query: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            default_fetch_size: 0,
            lob_chunk_size: DEFAULT_LOB_CHUNK_SIZE,
            validation_query: DEFAULT_VALIDATION_QUERY.to_string(),
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::new()
    }

    /// Parse options from JSON; missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::InvalidArgument` if the JSON is malformed or a field has the
    /// wrong type, or if the parsed options are invalid.
    pub fn from_json(json: &str) -> Result<Self, SqlBridgeError> {
        let opts: Self = serde_json::from_str(json).map_err(|e| {
            SqlBridgeError::InvalidArgument(format!("invalid session options: {e}"))
        })?;
        opts.validate()?;
        Ok(opts)
    }

    fn validate(&self) -> Result<(), SqlBridgeError> {
        if self.lob_chunk_size == 0 {
            return Err(SqlBridgeError::InvalidArgument(
                "lob_chunk_size must be greater than zero".into(),
            ));
        }
        if self.validation_query.trim().is_empty() {
            return Err(SqlBridgeError::InvalidArgument(
                "validation_query must not be blank".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`SessionOptions`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptionsBuilder {
    opts: SessionOptions,
}

impl SessionOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn default_fetch_size(mut self, rows: u32) -> Self {
        self.opts.default_fetch_size = rows;
        self
    }

    #[must_use]
    pub fn lob_chunk_size(mut self, bytes: usize) -> Self {
        self.opts.lob_chunk_size = bytes;
        self
    }

    #[must_use]
    pub fn validation_query(mut self, sql: impl Into<String>) -> Self {
        self.opts.validation_query = sql.into();
        self
    }

    /// Finish building.
    ///
    /// # Errors
    /// Returns `SqlBridgeError::InvalidArgument` for a zero chunk size or a blank validation
    /// query.
    pub fn finish(self) -> Result<SessionOptions, SqlBridgeError> {
        self.opts.validate()?;
        Ok(self.opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let opts = SessionOptions::from_json(r#"{"default_fetch_size": 25}"#).expect("options");
        assert_eq!(opts.default_fetch_size, 25);
        assert_eq!(opts.lob_chunk_size, DEFAULT_LOB_CHUNK_SIZE);
        assert_eq!(opts.validation_query, DEFAULT_VALIDATION_QUERY);
    }

    #[test]
    fn builder_rejects_zero_chunk_size() {
        let err = SessionOptions::builder().lob_chunk_size(0).finish();
        assert!(matches!(err, Err(SqlBridgeError::InvalidArgument(_))));
    }

    #[test]
    fn builder_sets_validation_query() {
        let opts = SessionOptions::builder()
            .validation_query("SELECT 1")
            .finish()
            .expect("options");
        assert_eq!(opts.validation_query, "SELECT 1");
    }
}
