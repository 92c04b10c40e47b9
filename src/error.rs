use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Failure reported by the underlying blocking driver.
///
/// The message, SQLSTATE and vendor code are kept verbatim so callers can still branch on the
/// database's own diagnostics after the error has crossed the async boundary.
#[derive(Debug, Clone)]
pub struct DriverError {
    message: String,
    sql_state: Option<String>,
    vendor_code: i32,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl DriverError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sql_state: None,
            vendor_code: 0,
            source: None,
        }
    }

    #[must_use]
    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }

    #[must_use]
    pub fn with_vendor_code(mut self, vendor_code: i32) -> Self {
        self.vendor_code = vendor_code;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }

    #[must_use]
    pub fn vendor_code(&self) -> i32 {
        self.vendor_code
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql_state {
            Some(state) => write!(
                f,
                "{} (SQLSTATE {state}, vendor code {})",
                self.message, self.vendor_code
            ),
            None => write!(f, "{} (vendor code {})", self.message, self.vendor_code),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Clone, Error)]
pub enum SqlBridgeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Cleanup actions (statement close, LOB release) failed. `primary` holds the outcome the
    /// sequence would otherwise have reported.
    #[error("{} cleanup action(s) failed{}", .failures.len(), describe_primary(.primary))]
    Cleanup {
        primary: Option<Box<SqlBridgeError>>,
        failures: Vec<SqlBridgeError>,
    },

    #[error("Result sequence cancelled by its subscriber")]
    Cancelled,

    #[error("Connection error: {0}")]
    ConnectionError(String),
}

fn describe_primary(primary: &Option<Box<SqlBridgeError>>) -> String {
    match primary {
        Some(err) => format!(" after: {err}"),
        None => String::new(),
    }
}

impl SqlBridgeError {
    /// Attach cleanup failures to an outcome without replacing it.
    #[must_use]
    pub(crate) fn with_cleanup_failures(
        primary: Option<SqlBridgeError>,
        failures: Vec<SqlBridgeError>,
    ) -> Option<SqlBridgeError> {
        match (primary, failures.is_empty()) {
            (primary, true) => primary,
            (primary, false) => Some(SqlBridgeError::Cleanup {
                primary: primary.map(Box::new),
                failures,
            }),
        }
    }

    /// The driver diagnostics behind this error, if it came from the driver.
    #[must_use]
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            SqlBridgeError::Driver(err) => Some(err),
            SqlBridgeError::Cleanup {
                primary: Some(primary),
                ..
            } => primary.driver_error(),
            _ => None,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        let (vendor_code, sql_state) = match &err {
            rusqlite::Error::SqliteFailure(ffi_err, _) => {
                (ffi_err.extended_code, Some(format!("{:?}", ffi_err.code)))
            }
            _ => (0, None),
        };
        let driver_err = DriverError::new(err.to_string()).with_vendor_code(vendor_code);
        let driver_err = match sql_state {
            Some(state) => driver_err.with_sql_state(state),
            None => driver_err,
        };
        driver_err.with_source(err)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SqlBridgeError {
    fn from(err: rusqlite::Error) -> Self {
        SqlBridgeError::Driver(DriverError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_failures_never_replace_primary() {
        let primary = SqlBridgeError::IllegalState("boom".into());
        let combined = SqlBridgeError::with_cleanup_failures(
            Some(primary),
            vec![SqlBridgeError::Driver(DriverError::new("free failed"))],
        );
        match combined {
            Some(SqlBridgeError::Cleanup { primary, failures }) => {
                assert!(matches!(
                    primary.as_deref(),
                    Some(SqlBridgeError::IllegalState(msg)) if msg == "boom"
                ));
                assert_eq!(failures.len(), 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn no_failures_keeps_outcome() {
        assert!(SqlBridgeError::with_cleanup_failures(None, Vec::new()).is_none());
    }

    #[test]
    fn driver_diagnostics_survive() {
        let err = SqlBridgeError::from(
            DriverError::new("table or view does not exist")
                .with_sql_state("42000")
                .with_vendor_code(942),
        );
        let driver = err.driver_error().expect("driver error");
        assert_eq!(driver.vendor_code(), 942);
        assert_eq!(driver.sql_state(), Some("42000"));
        assert!(err.to_string().contains("942"));
    }
}
