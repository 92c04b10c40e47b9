//! Non-blocking statement execution and transaction control over a blocking SQL driver.
//!
//! A driver implements [`driver::Session`], a call-by-call blocking contract. Wrapping it in a
//! [`Connection`] yields statements whose `execute()` returns a lazy [`Execution`]: nothing
//! touches the database until the execution is subscribed to, results arrive one at a time,
//! and the statement (plus any large objects it allocated) is released once the last result
//! has been consumed or the subscriber goes away.
//!
//! Blocking calls run on tokio's blocking pool while holding the session lock, so no two
//! calls ever overlap on one session.

pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod results;
pub(crate) mod session;
pub mod statement;
pub mod translation;
pub mod type_map;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use config::SessionOptions;
pub use connection::{
    Batch, Connection, IsolationLevel, Operation, TransactionDefinition, ValidationDepth,
};
pub use error::{DriverError, SqlBridgeError};
pub use executor::{Execution, ResultStream};
pub use results::{Columns, QueryResult, Row, RowStream};
pub use statement::{BindValue, Blob, Clob, Marker, Parameter, Statement};
pub use types::{SqlType, SqlValue};
