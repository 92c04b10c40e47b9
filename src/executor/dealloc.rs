use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::driver::Session;
use crate::error::SqlBridgeError;
use crate::session::SessionHandle;

type DeallocAction<S> = Box<dyn FnOnce(&mut S) -> Result<(), SqlBridgeError> + Send>;

/// Release actions deferred until an execution's results are finished with, such as freeing
/// temporary large objects created while binding.
pub(crate) struct DeallocationQueue<S> {
    actions: Arc<Mutex<VecDeque<(&'static str, DeallocAction<S>)>>>,
}

impl<S> Clone for DeallocationQueue<S> {
    fn clone(&self) -> Self {
        Self {
            actions: Arc::clone(&self.actions),
        }
    }
}

impl<S: Session> DeallocationQueue<S> {
    pub(crate) fn new() -> Self {
        Self {
            actions: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub(crate) fn push<F>(&self, label: &'static str, action: F) -> Result<(), SqlBridgeError>
    where
        F: FnOnce(&mut S) -> Result<(), SqlBridgeError> + Send + 'static,
    {
        self.lock()?.push_back((label, Box::new(action)));
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.actions.lock().map_or(0, |actions| actions.len())
    }

    fn lock(
        &self,
    ) -> Result<
        std::sync::MutexGuard<'_, VecDeque<(&'static str, DeallocAction<S>)>>,
        SqlBridgeError,
    > {
        self.actions.lock().map_err(|err| {
            SqlBridgeError::ConnectionError(format!("deallocation queue mutex poisoned: {err}"))
        })
    }

    /// Run every queued action once, in enqueue order. A failing action never stops the ones
    /// after it; all failures are returned.
    pub(crate) async fn run_all(&self, session: &SessionHandle<S>) -> Vec<SqlBridgeError> {
        let mut failures = Vec::new();
        loop {
            let next = match self.lock() {
                Ok(mut actions) => actions.pop_front(),
                Err(err) => {
                    failures.push(err);
                    break;
                }
            };
            let Some((label, action)) = next else {
                break;
            };
            tracing::trace!(action = label, "running deallocation");
            if let Err(err) = session.run(action).await {
                tracing::warn!(action = label, error = %err, "deallocation failed");
                failures.push(err);
            }
        }
        failures
    }
}
