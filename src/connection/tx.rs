//! Auto-commit and transaction control.
//!
//! No transaction object is tracked here: the session's auto-commit flag is the only state.
//! Turning it off opens an implicit transaction; turning it back on commits first.

use crate::driver::{Session, SessionIsolation};
use crate::error::SqlBridgeError;
use crate::session::SessionHandle;

use super::{Connection, IsolationLevel, Operation, TransactionDefinition};

async fn apply_auto_commit<S: Session>(
    session: &SessionHandle<S>,
    enabled: bool,
) -> Result<(), SqlBridgeError> {
    session
        .run(move |s| {
            if s.auto_commit()? == enabled {
                return Ok(());
            }
            if enabled {
                // The open transaction must be committed before the flag flips.
                s.commit()?;
            }
            tracing::debug!(enabled, "setting auto-commit");
            Ok(s.set_auto_commit(enabled)?)
        })
        .await
}

/// Read the session's isolation level as one of the two levels transactions support.
pub(super) async fn session_isolation<S: Session>(
    session: &SessionHandle<S>,
) -> Result<IsolationLevel, SqlBridgeError> {
    match session.run(|s| Ok(s.isolation_level()?)).await? {
        SessionIsolation::ReadCommitted => Ok(IsolationLevel::ReadCommitted),
        SessionIsolation::Serializable => Ok(IsolationLevel::Serializable),
        other => Err(SqlBridgeError::Unsupported(format!(
            "unrecognized session isolation level: {other:?}"
        ))),
    }
}

impl<S: Session> Connection<S> {
    /// Begin a transaction with the session's current isolation level.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed. The operation fails with
    /// `Unsupported` if the session reports a level other than READ COMMITTED or SERIALIZABLE.
    pub fn begin_transaction(&self) -> Result<Operation<()>, SqlBridgeError> {
        self.require_open()?;
        let conn = self.clone_handle();
        Ok(Operation::new(async move {
            let level = session_isolation(&conn.session).await?;
            let definition = TransactionDefinition::new().isolation_level(level);
            conn.start_transaction(definition).await
        }))
    }

    /// Begin a transaction described by `definition`.
    ///
    /// The definition is checked before any round trip. Auto-commit is then disabled and a
    /// `SET TRANSACTION` directive built from the definition is executed.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed, and the validation errors of
    /// [`TransactionDefinition::validate`].
    pub fn begin_transaction_with(
        &self,
        definition: &TransactionDefinition,
    ) -> Result<Operation<()>, SqlBridgeError> {
        self.require_open()?;
        definition.validate()?;
        let conn = self.clone_handle();
        let definition = definition.clone();
        Ok(Operation::new(async move {
            conn.start_transaction(definition).await
        }))
    }

    async fn start_transaction(
        &self,
        definition: TransactionDefinition,
    ) -> Result<(), SqlBridgeError> {
        apply_auto_commit(&self.session, false).await?;
        let sql = self
            .session
            .run(move |s| definition.compose(|name| Ok(s.enquote_literal(name)?)))
            .await?;
        tracing::debug!(sql = %sql, "beginning transaction");
        self.statement(&sql).execute()?.rows_updated().await?;
        Ok(())
    }

    /// Commit the current transaction; does nothing while auto-commit is enabled.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed.
    pub fn commit_transaction(&self) -> Result<Operation<()>, SqlBridgeError> {
        self.require_open()?;
        let session = self.session.clone();
        Ok(Operation::new(async move {
            session
                .run(|s| {
                    if s.auto_commit()? {
                        return Ok(());
                    }
                    tracing::debug!("committing transaction");
                    Ok(s.commit()?)
                })
                .await
        }))
    }

    /// Roll back the current transaction; does nothing while auto-commit is enabled.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed.
    pub fn rollback_transaction(&self) -> Result<Operation<()>, SqlBridgeError> {
        self.require_open()?;
        let session = self.session.clone();
        Ok(Operation::new(async move {
            session
                .run(|s| {
                    if s.auto_commit()? {
                        return Ok(());
                    }
                    tracing::debug!("rolling back transaction");
                    Ok(s.rollback()?)
                })
                .await
        }))
    }

    /// Set the auto-commit mode. Enabling it commits any open transaction first.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed.
    pub fn set_auto_commit(&self, enabled: bool) -> Result<Operation<()>, SqlBridgeError> {
        self.require_open()?;
        let session = self.session.clone();
        Ok(Operation::new(async move {
            apply_auto_commit(&session, enabled).await
        }))
    }

    /// # Errors
    /// Returns `IllegalState` if the connection is closed, or the driver error.
    pub async fn is_auto_commit(&self) -> Result<bool, SqlBridgeError> {
        self.require_open()?;
        self.session.run(|s| Ok(s.auto_commit()?)).await
    }

    /// # Errors
    /// Always fails: `IllegalState` if the connection is closed, `Unsupported` otherwise.
    pub fn create_savepoint(&self, name: &str) -> Result<Operation<()>, SqlBridgeError> {
        self.require_open()?;
        Err(SqlBridgeError::Unsupported(format!(
            "savepoint {name} cannot be created: savepoints are not supported"
        )))
    }

    /// Savepoints are never created, so releasing one has nothing to do.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed and `InvalidArgument` for a blank name.
    pub fn release_savepoint(&self, name: &str) -> Result<Operation<()>, SqlBridgeError> {
        self.require_open()?;
        if name.trim().is_empty() {
            return Err(SqlBridgeError::InvalidArgument(
                "savepoint name is blank".into(),
            ));
        }
        Ok(Operation::ready(()))
    }

    /// # Errors
    /// Always fails: `IllegalState` if the connection is closed, `Unsupported` otherwise.
    pub fn rollback_transaction_to_savepoint(
        &self,
        name: &str,
    ) -> Result<Operation<()>, SqlBridgeError> {
        self.require_open()?;
        Err(SqlBridgeError::Unsupported(format!(
            "cannot roll back to savepoint {name}: savepoints are not supported"
        )))
    }
}
