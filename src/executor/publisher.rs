//! Result producers for each execution mode.
//!
//! Every producer emits results through a [`ResultSink`] and never asks the driver for the
//! next result while the previous one is still being read.

use std::sync::Arc;

use crate::driver::Session;
use crate::error::SqlBridgeError;
use crate::results::source::CursorRows;
use crate::results::{Columns, Consumed, QueryResult, Row};
use crate::session::{SessionHandle, StatementCell};

use super::pipeline::ResultSink;

/// Driver update counts are signed; a negative count means "no count".
pub(crate) fn update_count_from_driver(count: i64) -> Option<u64> {
    u64::try_from(count).ok()
}

/// Execute the statement and emit the first result followed by any implicit results.
pub(crate) async fn publish_sql_results<S: Session>(
    session: &SessionHandle<S>,
    stmt: &StatementCell<S>,
    fetch_size: u32,
    sink: &ResultSink,
) -> Result<(), SqlBridgeError> {
    let is_rowset = session
        .with_statement(stmt, move |s, st| {
            s.set_fetch_size(st, fetch_size)?;
            Ok(s.execute(st)?)
        })
        .await?;
    tracing::debug!(is_rowset, "statement executed");

    let mut is_rowset = is_rowset;
    let mut first = true;
    loop {
        sink.ensure_subscribed()?;
        match current_result(session, stmt, is_rowset, fetch_size).await? {
            Some(result) => {
                sink.emit(result).await?;
                sink.wait_consumed().await;
            }
            // A first execution without a result may still be followed by implicit results;
            // any later gap ends the sequence.
            None if !first => return Ok(()),
            None => {}
        }
        first = false;
        sink.ensure_subscribed()?;
        is_rowset = session
            .with_statement(stmt, |s, st| Ok(s.more_results(st)?))
            .await?;
    }
}

async fn current_result<S: Session>(
    session: &SessionHandle<S>,
    stmt: &StatementCell<S>,
    is_rowset: bool,
    fetch_size: u32,
) -> Result<Option<(QueryResult, Consumed)>, SqlBridgeError> {
    if is_rowset {
        let cursor = session
            .with_statement(stmt, |s, st| Ok(s.result_set(st)?))
            .await?;
        let rows = CursorRows::new(session.clone(), cursor, fetch_size);
        Ok(Some(QueryResult::row_data(Box::new(rows))))
    } else {
        let count = session
            .with_statement(stmt, |s, st| Ok(s.update_count(st)?))
            .await?;
        Ok(update_count_from_driver(count).map(|count| QueryResult::update_count(Some(count))))
    }
}

/// Emit the implicit results of a procedure call, then one result holding its out parameters.
///
/// `out_params` lists the zero-based position and column name of each out parameter; the
/// out-parameter row addresses them densely in that order.
pub(crate) async fn publish_call_results<S: Session>(
    session: &SessionHandle<S>,
    stmt: &StatementCell<S>,
    fetch_size: u32,
    out_params: Vec<(usize, String)>,
    sink: &ResultSink,
) -> Result<(), SqlBridgeError> {
    publish_sql_results(session, stmt, fetch_size, sink).await?;
    sink.ensure_subscribed()?;

    let (positions, names): (Vec<usize>, Vec<String>) = out_params.into_iter().unzip();
    let values = session
        .with_statement(stmt, move |s, st| {
            positions
                .iter()
                .map(|&index| s.out_value(st, index).map_err(SqlBridgeError::from))
                .collect::<Result<Vec<_>, _>>()
        })
        .await?;
    let row = Row::new(Arc::new(Columns::new(names)), values);
    sink.emit(QueryResult::out_parameters(row)).await
}

/// Execute DML that returns generated values and emit its single result.
pub(crate) async fn publish_generated_values<S: Session>(
    session: &SessionHandle<S>,
    stmt: &StatementCell<S>,
    fetch_size: u32,
    sink: &ResultSink,
) -> Result<(), SqlBridgeError> {
    let is_rowset = session
        .with_statement(stmt, move |s, st| {
            s.set_fetch_size(st, fetch_size)?;
            Ok(s.execute(st)?)
        })
        .await?;
    if is_rowset {
        return Err(SqlBridgeError::IllegalState(
            "statement configured to return generated values has executed a query that returns row data"
                .into(),
        ));
    }
    let (count, keys) = session
        .with_statement(stmt, |s, st| {
            let count = s.update_count(st)?;
            let keys = s.generated_keys(st)?;
            Ok((count, keys))
        })
        .await?;
    let keys = CursorRows::new(session.clone(), keys, fetch_size);
    sink.emit(QueryResult::generated_values(
        update_count_from_driver(count),
        Box::new(keys),
    ))
    .await
}

/// Execute every queued batch entry and emit one update count per entry, in order.
pub(crate) async fn publish_batch_update<S: Session>(
    session: &SessionHandle<S>,
    stmt: &StatementCell<S>,
    sink: &ResultSink,
) -> Result<(), SqlBridgeError> {
    let counts = session
        .with_statement(stmt, |s, st| Ok(s.execute_batch(st)?))
        .await?;
    tracing::debug!(entries = counts.len(), "batch executed");
    for count in counts {
        sink.emit(QueryResult::update_count(update_count_from_driver(count)))
            .await?;
    }
    Ok(())
}
