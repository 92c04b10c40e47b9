//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::{SessionOptions, SessionOptionsBuilder};
pub use crate::connection::{
    Batch, Connection, IsolationLevel, Operation, TransactionDefinition, ValidationDepth,
};
pub use crate::driver::Session;
pub use crate::error::{DriverError, SqlBridgeError};
pub use crate::executor::{Execution, ResultStream};
pub use crate::results::{Columns, QueryResult, Row, RowStream};
pub use crate::statement::{BindValue, Blob, Clob, Marker, Parameter, Statement};
pub use crate::types::{SqlType, SqlValue};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteOptions, SqliteSession, connect as connect_sqlite, sqlite_builder};

pub use futures_util::StreamExt;
