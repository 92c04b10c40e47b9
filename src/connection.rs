//! Non-blocking connection over one blocking driver session.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;

use crate::config::SessionOptions;
use crate::driver::Session;
use crate::error::SqlBridgeError;
use crate::session::SessionHandle;
use crate::statement::Statement;

pub mod batch;
pub mod definition;
pub mod operation;
mod tx;

pub use batch::Batch;
pub use definition::{IsolationLevel, TransactionDefinition, ValidationDepth};
pub use operation::Operation;

/// A connection to a database through a blocking driver session.
///
/// Every driver call is serialized on the session: statements, batches and transaction
/// operations issued concurrently on one connection run one after another.
pub struct Connection<S: Session> {
    session: SessionHandle<S>,
    closed: Arc<AtomicBool>,
    options: Arc<SessionOptions>,
}

impl<S: Session> Connection<S> {
    /// Wrap an open driver session with default options.
    pub fn new(session: S) -> Self {
        Self::with_options(session, SessionOptions::default())
    }

    pub fn with_options(session: S, options: SessionOptions) -> Self {
        Self {
            session: SessionHandle::new(session),
            closed: Arc::new(AtomicBool::new(false)),
            options: Arc::new(options),
        }
    }

    #[must_use]
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Whether [`Connection::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn require_open(&self) -> Result<(), SqlBridgeError> {
        if self.is_closed() {
            Err(SqlBridgeError::IllegalState("connection is closed".into()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn statement(&self, sql: &str) -> Statement<S> {
        Statement::new(
            self.session.clone(),
            Arc::clone(&self.closed),
            Arc::clone(&self.options),
            sql,
        )
    }

    /// Create a statement for `sql`. Named markers (`:name`) and `?` markers are recognized.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed.
    pub fn create_statement(&self, sql: &str) -> Result<Statement<S>, SqlBridgeError> {
        self.require_open()?;
        Ok(self.statement(sql))
    }

    /// Create a batch of SQL texts executed one after another.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed.
    pub fn create_batch(&self) -> Result<Batch<S>, SqlBridgeError> {
        self.require_open()?;
        Ok(Batch::new(self.clone_handle()))
    }

    fn clone_handle(&self) -> Self {
        Self {
            session: self.session.clone(),
            closed: Arc::clone(&self.closed),
            options: Arc::clone(&self.options),
        }
    }

    /// Check that the session is usable. Failures never surface as errors; they report `false`.
    #[must_use]
    pub fn validate(&self, depth: ValidationDepth) -> Operation<bool> {
        let conn = self.clone_handle();
        Operation::new(async move { Ok(conn.check_valid(depth).await) })
    }

    async fn check_valid(&self, depth: ValidationDepth) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.session.run(|s| Ok(s.is_closed()?)).await {
            Ok(false) => {}
            Ok(true) => return false,
            Err(err) => {
                tracing::debug!(error = %err, "validation failed");
                return false;
            }
        }
        if depth == ValidationDepth::Local {
            return true;
        }
        match self.run_validation_query().await {
            Ok(valid) => valid,
            Err(err) => {
                tracing::debug!(error = %err, "validation query failed");
                false
            }
        }
    }

    async fn run_validation_query(&self) -> Result<bool, SqlBridgeError> {
        let execution = self.statement(&self.options.validation_query).execute()?;
        let mut results = execution.subscribe()?;
        let Some(result) = results.next().await else {
            return Ok(false);
        };
        let rows = result?.collect_rows().await?;
        let valid = rows
            .first()
            .and_then(|row| row.get_by_index(0))
            .and_then(crate::types::SqlValue::as_i64)
            == Some(1);
        // Drain so the statement is closed before the outcome is reported.
        while let Some(result) = results.next().await {
            result?;
        }
        Ok(valid)
    }

    /// Isolation level the session currently reports.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed, and `Unsupported` if the session
    /// reports a level other than READ COMMITTED or SERIALIZABLE.
    pub async fn transaction_isolation_level(&self) -> Result<IsolationLevel, SqlBridgeError> {
        self.require_open()?;
        tx::session_isolation(&self.session).await
    }

    /// Confirm the session runs at `level`. The session level itself is never changed.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed and `Unsupported` for a level other
    /// than READ COMMITTED or SERIALIZABLE. The operation fails with `Unsupported` when the
    /// session reports a different level.
    pub fn set_transaction_isolation_level(
        &self,
        level: IsolationLevel,
    ) -> Result<Operation<()>, SqlBridgeError> {
        self.require_open()?;
        if !matches!(
            level,
            IsolationLevel::ReadCommitted | IsolationLevel::Serializable
        ) {
            return Err(SqlBridgeError::Unsupported(format!(
                "isolation level {level} is not supported"
            )));
        }
        let session = self.session.clone();
        Ok(Operation::new(async move {
            let current = tx::session_isolation(&session).await?;
            if current == level {
                Ok(())
            } else {
                Err(SqlBridgeError::Unsupported(format!(
                    "cannot change the session isolation level from {current} to {level}"
                )))
            }
        }))
    }

    /// Close the session. Every later operation on this connection fails with `IllegalState`.
    #[must_use]
    pub fn close(&self) -> Operation<()> {
        let session = self.session.clone();
        let closed = Arc::clone(&self.closed);
        Operation::new(async move {
            if closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            tracing::debug!("closing connection");
            session.run(|s| Ok(s.close()?)).await
        })
    }
}

impl<S: Session> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("options", &self.options)
            .finish()
    }
}
