//! `SQLite` implementation of the blocking driver contract, backed by `rusqlite`.
//!
//! - config: options and opening connections
//! - params: value conversion between this crate and `SQLite`
//! - query: materialized cursors
//! - session: the `Session` implementation

pub mod config;
pub mod params;
pub mod query;
pub mod session;

pub use config::{SqliteOptions, SqliteOptionsBuilder, connect, sqlite_builder};
pub use query::SqliteCursor;
pub use session::{SqliteLob, SqliteSession, SqliteStatement};
