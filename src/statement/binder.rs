//! Attaches parameter values to a prepared statement handle.
//!
//! Binds run strictly in position order. Large objects are allocated on the session, filled
//! chunk by chunk, and bound by handle; freeing them is deferred to the deallocation queue.
//! In-memory bytes or text declared as a large object type are uploaded the same way, in
//! chunks of `lob_chunk_size`.

use crate::driver::{DriverValue, Session};
use crate::error::SqlBridgeError;
use crate::executor::DeallocationQueue;
use crate::session::{SessionHandle, StatementCell};
use crate::type_map::{DriverType, to_driver_type};
use crate::types::{SqlType, SqlValue};

use super::params::{BindValue, Blob, Clob, Parameter};

fn driver_type(ty: &SqlType) -> Result<DriverType, SqlBridgeError> {
    to_driver_type(ty)
        .ok_or_else(|| SqlBridgeError::InvalidArgument(format!("unsupported SQL type: {ty:?}")))
}

/// Turn an in-memory value declared as a large object type into a chunked LOB source.
fn as_lob_source(value: BindValue, ty: &SqlType, chunk_size: usize) -> BindValue {
    match (value, ty) {
        (BindValue::Value(SqlValue::Bytes(bytes)), SqlType::Blob) => {
            BindValue::Blob(Blob::from_bytes(bytes, chunk_size))
        }
        (BindValue::Value(SqlValue::Text(text)), SqlType::Clob | SqlType::NClob) => {
            BindValue::Clob(Clob::from_text(&text, chunk_size))
        }
        (value, _) => value,
    }
}

/// Bind the value of every in and in-out parameter. Out-only positions are skipped.
pub(crate) async fn bind_in_parameters<S: Session>(
    session: &SessionHandle<S>,
    stmt: &StatementCell<S>,
    params: Vec<Parameter>,
    lob_chunk_size: usize,
    queue: &DeallocationQueue<S>,
) -> Result<(), SqlBridgeError> {
    for (index, param) in params.into_iter().enumerate() {
        let (value, sql_type) = param.into_parts();
        let Some(value) = value else {
            continue;
        };
        let ty = driver_type(&sql_type)?;
        let value = match as_lob_source(value, &sql_type, lob_chunk_size) {
            BindValue::Null => DriverValue::Null,
            BindValue::Value(value) => DriverValue::Value(value),
            BindValue::Blob(blob) => DriverValue::Lob(upload_blob(session, blob, queue).await?),
            BindValue::Clob(clob) => DriverValue::Lob(upload_clob(session, clob, queue).await?),
        };
        let ty = if matches!(value, DriverValue::Lob(_)) && ty == DriverType::Clob {
            DriverType::NClob
        } else {
            ty
        };
        tracing::trace!(index, ?ty, "binding parameter");
        session
            .with_statement(stmt, move |s, st| Ok(s.bind(st, index, value, ty)?))
            .await?;
    }
    Ok(())
}

/// Bind each parameter set in turn, queueing it as one batch entry.
pub(crate) async fn bind_batch<S: Session>(
    session: &SessionHandle<S>,
    stmt: &StatementCell<S>,
    batch: Vec<Vec<Parameter>>,
    lob_chunk_size: usize,
    queue: &DeallocationQueue<S>,
) -> Result<(), SqlBridgeError> {
    for params in batch {
        bind_in_parameters(session, stmt, params, lob_chunk_size, queue).await?;
        session
            .with_statement(stmt, |s, st| Ok(s.add_batch(st)?))
            .await?;
    }
    Ok(())
}

/// Register every out and in-out position by its declared type.
pub(crate) async fn register_out_parameters<S: Session>(
    session: &SessionHandle<S>,
    stmt: &StatementCell<S>,
    outs: Vec<(usize, SqlType)>,
) -> Result<(), SqlBridgeError> {
    let outs = outs
        .into_iter()
        .map(|(index, ty)| driver_type(&ty).map(|ty| (index, ty)))
        .collect::<Result<Vec<_>, _>>()?;
    session
        .with_statement(stmt, move |s, st| {
            for (index, ty) in outs {
                s.register_out(st, index, ty)?;
            }
            Ok(())
        })
        .await
}

async fn upload_blob<S: Session>(
    session: &SessionHandle<S>,
    mut blob: Blob,
    queue: &DeallocationQueue<S>,
) -> Result<S::Lob, SqlBridgeError> {
    // Queue the free together with the allocation so an abandoned upload still releases it.
    let pending = queue.clone();
    let lob = session
        .run(move |s| {
            let lob = s.allocate_blob()?;
            let freed = lob.clone();
            pending.push("free blob", move |s| Ok(s.free_lob(freed)?))?;
            Ok(lob)
        })
        .await?;

    let mut written = 0_usize;
    while let Some(chunk) = blob.next_chunk().await {
        let chunk = chunk?;
        written += chunk.len();
        let target = lob.clone();
        session
            .run(move |s| Ok(s.write_blob(&target, &chunk)?))
            .await?;
    }
    blob.discard();
    tracing::trace!(bytes = written, "blob uploaded");
    Ok(lob)
}

async fn upload_clob<S: Session>(
    session: &SessionHandle<S>,
    mut clob: Clob,
    queue: &DeallocationQueue<S>,
) -> Result<S::Lob, SqlBridgeError> {
    let pending = queue.clone();
    let lob = session
        .run(move |s| {
            let lob = s.allocate_nclob()?;
            let freed = lob.clone();
            pending.push("free clob", move |s| Ok(s.free_lob(freed)?))?;
            Ok(lob)
        })
        .await?;

    let mut written = 0_usize;
    while let Some(chunk) = clob.next_chunk().await {
        let chunk = chunk?;
        written += chunk.len();
        let target = lob.clone();
        session
            .run(move |s| Ok(s.write_clob(&target, &chunk)?))
            .await?;
    }
    clob.discard();
    tracing::trace!(bytes = written, "clob uploaded");
    Ok(lob)
}
