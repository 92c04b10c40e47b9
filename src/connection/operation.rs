use std::fmt;
use std::future::{Future, IntoFuture};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

use crate::error::SqlBridgeError;

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, SqlBridgeError>>>;

/// A lazily run connection operation.
///
/// Nothing happens until the operation is first awaited. Clones share that single run: every
/// clone resolves to the same cached outcome. Calling the connection method again creates a
/// new operation that runs again.
pub struct Operation<T: Clone> {
    outcome: SharedOutcome<T>,
}

impl<T> Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, SqlBridgeError>> + Send + 'static,
    {
        Self {
            outcome: future.boxed().shared(),
        }
    }

    /// An operation that needs no round trip.
    pub(crate) fn ready(value: T) -> Self {
        Self::new(async move { Ok(value) })
    }

    /// The cached outcome, if the operation has already completed.
    #[must_use]
    pub fn peek(&self) -> Option<Result<T, SqlBridgeError>> {
        self.outcome.peek().cloned()
    }
}

impl<T: Clone> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            outcome: self.outcome.clone(),
        }
    }
}

impl<T> IntoFuture for Operation<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T, SqlBridgeError>;
    type IntoFuture = SharedOutcome<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.outcome
    }
}

impl<T: Clone> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").finish_non_exhaustive()
    }
}
