use std::fmt;
use std::sync::{Arc, Mutex};

use crate::driver::Session;
use crate::error::SqlBridgeError;

/// Shared, serialized access to one blocking driver session.
///
/// Callers wait for the session asynchronously; only the driver call itself occupies a
/// blocking thread.
pub(crate) struct SessionHandle<S> {
    inner: Arc<tokio::sync::Mutex<S>>,
}

impl<S> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Session> SessionHandle<S> {
    pub(crate) fn new(session: S) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(session)),
        }
    }

    /// Run one blocking driver operation once every earlier operation has finished.
    pub(crate) async fn run<F, R>(&self, func: F) -> Result<R, SqlBridgeError>
    where
        F: FnOnce(&mut S) -> Result<R, SqlBridgeError> + Send + 'static,
        R: Send + 'static,
    {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let mut guard = guard;
            func(&mut guard)
        })
        .await
        .map_err(|e| {
            SqlBridgeError::ConnectionError(format!("driver spawn_blocking join error: {e}"))
        })?
    }

    /// Run a driver operation against a statement handle owned by an in-flight execution.
    pub(crate) async fn with_statement<F, R>(
        &self,
        stmt: &StatementCell<S>,
        func: F,
    ) -> Result<R, SqlBridgeError>
    where
        F: FnOnce(&mut S, &mut S::Statement) -> Result<R, SqlBridgeError> + Send + 'static,
        R: Send + 'static,
    {
        let stmt = stmt.clone();
        self.run(move |session| {
            let mut guard = stmt.lock()?;
            let handle = guard.as_mut().ok_or_else(|| {
                SqlBridgeError::IllegalState("statement handle is already closed".into())
            })?;
            func(session, handle)
        })
        .await
    }

    /// Close the statement handle. Closing twice is a no-op.
    pub(crate) async fn close_statement(
        &self,
        stmt: &StatementCell<S>,
    ) -> Result<(), SqlBridgeError> {
        let stmt = stmt.clone();
        self.run(move |session| {
            let handle = stmt.lock()?.take();
            match handle {
                Some(handle) => session.close_statement(handle).map_err(SqlBridgeError::from),
                None => Ok(()),
            }
        })
        .await
    }
}

impl<S> fmt::Debug for SessionHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("shared", &Arc::strong_count(&self.inner))
            .finish()
    }
}

/// Statement handle exclusively owned by one execution; `None` once closed.
pub(crate) struct StatementCell<S: Session> {
    slot: Arc<Mutex<Option<S::Statement>>>,
}

impl<S: Session> Clone for StatementCell<S> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<S: Session> StatementCell<S> {
    pub(crate) fn new(stmt: S::Statement) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(stmt))),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<S::Statement>>, SqlBridgeError> {
        self.slot.lock().map_err(|err| {
            SqlBridgeError::ConnectionError(format!("statement handle mutex poisoned: {err}"))
        })
    }
}
