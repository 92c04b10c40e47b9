use futures_util::StreamExt;
use futures_util::stream;

use crate::driver::Session;
use crate::error::SqlBridgeError;
use crate::executor::{Execution, ResultStream};

use super::Connection;

/// SQL texts run one after another, each as a plain statement without parameters.
pub struct Batch<S: Session> {
    conn: Connection<S>,
    sql: Vec<String>,
}

impl<S: Session> Batch<S> {
    pub(crate) fn new(conn: Connection<S>) -> Self {
        Self {
            conn,
            sql: Vec::new(),
        }
    }

    /// # Errors
    /// Returns `IllegalState` if the connection is closed.
    pub fn add(&mut self, sql: impl Into<String>) -> Result<&mut Self, SqlBridgeError> {
        self.conn.require_open()?;
        self.sql.push(sql.into());
        Ok(self)
    }

    /// Execute every added SQL text in order and concatenate their results.
    ///
    /// The first failing statement ends the sequence; the statements after it never run.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed, or if an added text contains
    /// parameter markers (they can never be bound).
    pub fn execute(&mut self) -> Result<Execution, SqlBridgeError> {
        self.conn.require_open()?;
        let executions = std::mem::take(&mut self.sql)
            .iter()
            .map(|sql| self.conn.statement(sql).execute())
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(statements = executions.len(), "executing batch");

        Ok(Execution::new(move |_| concat(executions)))
    }
}

fn concat(executions: Vec<Execution>) -> ResultStream {
    let state: (std::vec::IntoIter<Execution>, Option<ResultStream>) =
        (executions.into_iter(), None);
    stream::unfold(state, |(mut pending, mut current)| async move {
        loop {
            if let Some(results) = current.as_mut() {
                match results.next().await {
                    Some(Ok(result)) => return Some((Ok(result), (pending, current))),
                    Some(Err(err)) => return Some((Err(err), (Vec::new().into_iter(), None))),
                    None => {}
                }
            }
            current = match pending.next()?.subscribe() {
                Ok(results) => Some(results),
                Err(err) => return Some((Err(err), (Vec::new().into_iter(), None))),
            };
        }
    })
    .boxed()
}
