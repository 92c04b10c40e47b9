use crate::config::SessionOptions;
use crate::connection::Connection;
use crate::error::SqlBridgeError;

use super::session::SqliteSession;

/// Query used to validate `SQLite` sessions remotely.
pub const SQLITE_VALIDATION_QUERY: &str = "SELECT 1";

/// Options for opening a `SQLite` connection.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub session: SessionOptions,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            session: SessionOptions {
                validation_query: SQLITE_VALIDATION_QUERY.to_string(),
                ..SessionOptions::default()
            },
        }
    }

    #[must_use]
    pub fn with_session_options(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn default_fetch_size(mut self, rows: u32) -> Self {
        self.opts.session.default_fetch_size = rows;
        self
    }

    #[must_use]
    pub fn lob_chunk_size(mut self, bytes: usize) -> Self {
        self.opts.session.lob_chunk_size = bytes;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Open the database and wrap it in a [`Connection`].
    ///
    /// # Errors
    /// Returns `SqlBridgeError` if the database cannot be opened.
    pub async fn connect(self) -> Result<Connection<SqliteSession>, SqlBridgeError> {
        connect(self.finish()).await
    }
}

/// Start building options for the database at `db_path` (`:memory:` for an in-memory one).
#[must_use]
pub fn sqlite_builder(db_path: String) -> SqliteOptionsBuilder {
    SqliteOptionsBuilder::new(db_path)
}

/// Open a `SQLite` database off the async runtime's worker threads.
///
/// # Errors
/// Returns `SqlBridgeError::Driver` if the database cannot be opened, or
/// `SqlBridgeError::ConnectionError` if the opening task fails.
pub async fn connect(opts: SqliteOptions) -> Result<Connection<SqliteSession>, SqlBridgeError> {
    let SqliteOptions { db_path, session } = opts;
    let sqlite = tokio::task::spawn_blocking(move || {
        if db_path == ":memory:" {
            SqliteSession::open_in_memory()
        } else {
            SqliteSession::open(&db_path)
        }
    })
    .await
    .map_err(|e| SqlBridgeError::ConnectionError(format!("SQLite open task failed: {e}")))??;
    tracing::debug!("sqlite session opened");
    Ok(Connection::with_options(sqlite, session))
}
