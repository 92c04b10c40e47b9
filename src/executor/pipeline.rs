use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::driver::Session;
use crate::error::SqlBridgeError;
use crate::results::{Consumed, QueryResult};
use crate::session::{SessionHandle, StatementCell};

use super::dealloc::DeallocationQueue;

/// Stream of results produced by one subscription to an [`Execution`].
pub type ResultStream = BoxStream<'static, Result<QueryResult, SqlBridgeError>>;

type StartFn = Box<dyn FnOnce(&Handle) -> ResultStream + Send>;

/// Lazily started result sequence returned by `execute()`.
///
/// Nothing runs until [`Execution::subscribe`] is called, and only one subscription is ever
/// served. Clones share the same claim.
#[derive(Clone)]
pub struct Execution {
    inner: Arc<ExecutionInner>,
}

struct ExecutionInner {
    claimed: AtomicBool,
    start: Mutex<Option<StartFn>>,
}

impl Execution {
    pub(crate) fn new<F>(start: F) -> Self
    where
        F: FnOnce(&Handle) -> ResultStream + Send + 'static,
    {
        Self {
            inner: Arc::new(ExecutionInner {
                claimed: AtomicBool::new(false),
                start: Mutex::new(Some(Box::new(start))),
            }),
        }
    }

    /// Start the execution and take its result stream.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::IllegalState`] if the execution was already subscribed to, and
    /// [`SqlBridgeError::ConnectionError`] when called outside a tokio runtime. Neither case
    /// has any side effect.
    pub fn subscribe(&self) -> Result<ResultStream, SqlBridgeError> {
        let handle = Handle::try_current().map_err(|err| {
            SqlBridgeError::ConnectionError(format!("execute requires a tokio runtime: {err}"))
        })?;
        if self
            .inner
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SqlBridgeError::IllegalState(
                "multiple subscribers are not supported by an execute() result sequence".into(),
            ));
        }
        let start = self
            .inner
            .start
            .lock()
            .map_err(|err| {
                SqlBridgeError::ConnectionError(format!("execution mutex poisoned: {err}"))
            })?
            .take()
            .ok_or_else(|| SqlBridgeError::IllegalState("execution already started".into()))?;
        Ok(start(&handle))
    }

    /// Subscribe and consume every result, returning their update counts in order.
    ///
    /// # Errors
    /// Returns the terminal error of the sequence, or the subscription error.
    pub async fn rows_updated(&self) -> Result<Vec<Option<u64>>, SqlBridgeError> {
        let mut results = self.subscribe()?;
        let mut counts = Vec::new();
        while let Some(result) = results.next().await {
            counts.push(result?.rows_updated().await?);
        }
        Ok(counts)
    }

    /// Whether a subscriber has already claimed this execution.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.inner.claimed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

/// Producer side of a result sequence.
///
/// The channel holds at most one result, and producers wait for each result's consumption
/// before asking the driver for the next one.
pub(crate) struct ResultSink {
    tx: mpsc::Sender<Result<QueryResult, SqlBridgeError>>,
    last: Arc<Mutex<Option<Consumed>>>,
    emitted: Arc<AtomicUsize>,
}

impl Clone for ResultSink {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            last: Arc::clone(&self.last),
            emitted: Arc::clone(&self.emitted),
        }
    }
}

impl ResultSink {
    fn channel() -> (Self, mpsc::Receiver<Result<QueryResult, SqlBridgeError>>) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                tx,
                last: Arc::new(Mutex::new(None)),
                emitted: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    /// Fails with [`SqlBridgeError::Cancelled`] once the subscriber has gone away.
    pub(crate) fn ensure_subscribed(&self) -> Result<(), SqlBridgeError> {
        if self.tx.is_closed() {
            Err(SqlBridgeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the subscriber has gone away.
    pub(crate) async fn closed(&self) {
        self.tx.closed().await;
    }

    pub(crate) fn emitted(&self) -> usize {
        self.emitted.load(Ordering::Acquire)
    }

    /// Hand a result to the subscriber.
    pub(crate) async fn emit(
        &self,
        (result, consumed): (QueryResult, Consumed),
    ) -> Result<(), SqlBridgeError> {
        tracing::trace!(result = ?result, "emitting result");
        if let Ok(mut last) = self.last.lock() {
            *last = Some(consumed);
        }
        self.tx
            .send(Ok(result))
            .await
            .map_err(|_| SqlBridgeError::Cancelled)?;
        self.emitted.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Wait until the most recently emitted result has been fully consumed.
    pub(crate) async fn wait_consumed(&self) {
        let pending = self.last.lock().ok().and_then(|mut last| last.take());
        if let Some(consumed) = pending {
            consumed.wait().await;
        }
    }

    async fn fail(&self, err: SqlBridgeError) {
        if self.tx.send(Err(err)).await.is_err() {
            tracing::debug!("subscriber gone before the terminal error was delivered");
        }
    }
}

pub(crate) type BindFn<S> = Box<
    dyn FnOnce(
            SessionHandle<S>,
            StatementCell<S>,
            DeallocationQueue<S>,
        ) -> BoxFuture<'static, Result<(), SqlBridgeError>>
        + Send,
>;

pub(crate) type ProduceFn<S> = Box<
    dyn FnOnce(
            SessionHandle<S>,
            StatementCell<S>,
            ResultSink,
        ) -> BoxFuture<'static, Result<(), SqlBridgeError>>
        + Send,
>;

pub(crate) type PrepareFn<S> =
    Box<dyn FnOnce(&mut S) -> Result<<S as Session>::Statement, SqlBridgeError> + Send>;

/// Build the lazy result sequence of one statement execution.
///
/// On subscription the statement is prepared, `bind` attaches all values (possibly
/// suspending on large object uploads), and `produce` emits results. However the sequence
/// ends (completion, error, or the subscriber going away) the statement is closed once the
/// last emitted result is consumed, and every queued deallocation runs afterwards.
pub(crate) fn execute<S: Session>(
    session: SessionHandle<S>,
    mode: &'static str,
    prepare: PrepareFn<S>,
    bind: BindFn<S>,
    produce: ProduceFn<S>,
) -> Execution {
    Execution::new(move |handle| {
        let (sink, rx) = ResultSink::channel();
        let span = tracing::debug_span!("execute", mode = mode);
        handle.spawn(drive(session, prepare, bind, produce, sink).instrument(span));
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    })
}

async fn drive<S: Session>(
    session: SessionHandle<S>,
    prepare: PrepareFn<S>,
    bind: BindFn<S>,
    produce: ProduceFn<S>,
    sink: ResultSink,
) {
    let stmt = match session.run(prepare).await {
        Ok(stmt) => StatementCell::<S>::new(stmt),
        Err(err) => {
            tracing::debug!(error = %err, "prepare failed");
            sink.fail(err).await;
            return;
        }
    };
    tracing::debug!("statement prepared");

    let queue = DeallocationQueue::<S>::new();
    let outcome = async {
        sink.ensure_subscribed()?;
        // A large object source may stall; stop binding once the subscriber leaves.
        tokio::select! {
            bound = bind(session.clone(), stmt.clone(), queue.clone()) => bound?,
            () = sink.closed() => return Err(SqlBridgeError::Cancelled),
        }
        sink.ensure_subscribed()?;
        produce(session.clone(), stmt.clone(), sink.clone()).await
    }
    .await;

    // Callers always observe at least one result.
    let outcome = match outcome {
        Ok(()) if sink.emitted() == 0 => sink.emit(QueryResult::update_count(None)).await,
        other => other,
    };

    sink.wait_consumed().await;
    let mut failures = Vec::new();
    if let Err(err) = session.close_statement(&stmt).await {
        failures.push(err);
    }
    tracing::debug!(deallocations = queue.len(), "statement closed");
    failures.extend(queue.run_all(&session).await);

    match outcome {
        Err(SqlBridgeError::Cancelled) => {
            tracing::debug!("result sequence cancelled");
            for failure in &failures {
                tracing::warn!(error = %failure, "cleanup failed after cancellation");
            }
        }
        outcome => {
            if let Some(err) = SqlBridgeError::with_cleanup_failures(outcome.err(), failures) {
                sink.fail(err).await;
            }
        }
    }
}
