//! Statement bind state and execution mode selection.
//!
//! A [`Statement`] collects parameter values, queued batch entries, a fetch size and an
//! optional generated-values request. Each call to [`Statement::execute`] snapshots that state,
//! clears it, and picks one execution mode:
//!
//! - batch, when entries were queued with [`Statement::add`],
//! - call, when any parameter is an out or in-out parameter,
//! - generated values, after [`Statement::return_generated_values`],
//! - plain SQL otherwise.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::FutureExt;

use crate::config::SessionOptions;
use crate::driver::{GeneratedColumns, PrepareKind, Session};
use crate::error::SqlBridgeError;
use crate::executor::{
    BindFn, DeallocationQueue, Execution, PrepareFn, ProduceFn, ResultSink, execute,
    publish_batch_update, publish_call_results, publish_generated_values, publish_sql_results,
};
use crate::session::{SessionHandle, StatementCell};
use crate::translation::parse_parameter_names;
use crate::types::SqlType;

pub(crate) mod binder;
pub mod params;

pub use params::{BindValue, Blob, Clob, Marker, Parameter};

type ParameterSet = Vec<Option<Parameter>>;

/// A SQL statement bound to one connection.
pub struct Statement<S: Session> {
    session: SessionHandle<S>,
    closed: Arc<AtomicBool>,
    options: Arc<SessionOptions>,
    sql: Arc<str>,
    names: Arc<[Option<String>]>,
    params: ParameterSet,
    batch: VecDeque<Vec<Parameter>>,
    fetch_size: Option<u32>,
    generated_columns: Option<Vec<String>>,
}

impl<S: Session> Statement<S> {
    pub(crate) fn new(
        session: SessionHandle<S>,
        closed: Arc<AtomicBool>,
        options: Arc<SessionOptions>,
        sql: &str,
    ) -> Self {
        let names: Arc<[Option<String>]> = parse_parameter_names(sql).into();
        let params = empty_set(names.len());
        Self {
            session,
            closed,
            options,
            sql: Arc::from(sql),
            names,
            params,
            batch: VecDeque::new(),
            fetch_size: None,
            generated_columns: None,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Names of the parameter markers in order; `None` marks an unnamed `?`.
    #[must_use]
    pub fn parameter_names(&self) -> &[Option<String>] {
        &self.names
    }

    fn require_open(&self) -> Result<(), SqlBridgeError> {
        if self.closed.load(Ordering::Acquire) {
            Err(SqlBridgeError::IllegalState("connection is closed".into()))
        } else {
            Ok(())
        }
    }

    /// Positions a marker refers to. A name matches every marker carrying it, case sensitively.
    fn positions(&self, marker: &Marker) -> Result<Vec<usize>, SqlBridgeError> {
        match marker {
            Marker::Index(index) => {
                if self.names.is_empty() {
                    return Err(SqlBridgeError::InvalidArgument(
                        "statement has no parameter markers".into(),
                    ));
                }
                match usize::try_from(*index) {
                    Ok(position) if position < self.names.len() => Ok(vec![position]),
                    _ => Err(SqlBridgeError::InvalidArgument(format!(
                        "parameter index {index} is out of range; largest index is {}",
                        self.names.len() - 1
                    ))),
                }
            }
            Marker::Name(name) => {
                let positions: Vec<usize> = self
                    .names
                    .iter()
                    .enumerate()
                    .filter(|(_, candidate)| candidate.as_deref() == Some(name.as_str()))
                    .map(|(position, _)| position)
                    .collect();
                if positions.is_empty() {
                    Err(SqlBridgeError::InvalidArgument(format!(
                        "unrecognized parameter identifier: {name}"
                    )))
                } else {
                    Ok(positions)
                }
            }
        }
    }

    fn store(&mut self, marker: &Marker, param: Parameter) -> Result<(), SqlBridgeError> {
        let positions = self.positions(marker)?;
        param.validate()?;
        let (last, rest) = positions
            .split_last()
            .ok_or_else(|| SqlBridgeError::InvalidArgument("no parameter position".into()))?;
        for &position in rest {
            let copy = duplicate(&param).ok_or_else(|| {
                SqlBridgeError::InvalidArgument(format!(
                    "a large object cannot be bound to more than one marker named {marker:?}"
                ))
            })?;
            self.params[position] = Some(copy);
        }
        tracing::trace!(positions = ?positions, "parameter bound");
        self.params[*last] = Some(param);
        Ok(())
    }

    /// Bind a value, or a fully specified [`Parameter`], at a position or name.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed, and `InvalidArgument` for an unknown
    /// marker, a null value (use [`Statement::bind_null`]), an unsupported SQL type, or a value
    /// that does not fit its declared type.
    pub fn bind(
        &mut self,
        marker: impl Into<Marker>,
        value: impl Into<Parameter>,
    ) -> Result<&mut Self, SqlBridgeError> {
        self.require_open()?;
        let marker = marker.into();
        let param = value.into();
        if param.has_null_value() {
            return Err(SqlBridgeError::InvalidArgument(format!(
                "null bound at {marker:?}; use bind_null to bind a typed null"
            )));
        }
        self.store(&marker, param)?;
        Ok(self)
    }

    /// Bind a SQL NULL of type `ty`.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed, and `InvalidArgument` for an unknown
    /// marker or an unsupported SQL type.
    pub fn bind_null(
        &mut self,
        marker: impl Into<Marker>,
        ty: SqlType,
    ) -> Result<&mut Self, SqlBridgeError> {
        self.require_open()?;
        let marker = marker.into();
        self.store(&marker, Parameter::In(BindValue::Null, ty))?;
        Ok(self)
    }

    /// Queue the current bind values as one batch entry and start a fresh set.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed, a position is unset, or an out
    /// parameter is bound.
    pub fn add(&mut self) -> Result<&mut Self, SqlBridgeError> {
        self.require_open()?;
        self.add_current()?;
        Ok(self)
    }

    fn add_current(&mut self) -> Result<(), SqlBridgeError> {
        for param in &self.params {
            match param {
                None => return Err(parameter_not_set()),
                Some(param) if param.is_out() => {
                    return Err(SqlBridgeError::IllegalState(
                        "batch execution with out parameters is not supported".into(),
                    ));
                }
                Some(_) => {}
            }
        }
        let set = self.take_params();
        self.batch.push_back(set);
        Ok(())
    }

    /// Rows to fetch per round trip; 0 leaves it to the driver.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed.
    pub fn fetch_size(&mut self, rows: u32) -> Result<&mut Self, SqlBridgeError> {
        self.require_open()?;
        self.fetch_size = Some(rows);
        Ok(self)
    }

    /// Return values generated by DML for `columns`; an empty list asks for the driver's
    /// default generated value.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed, and `InvalidArgument` for a blank
    /// column name.
    pub fn return_generated_values<I, C>(&mut self, columns: I) -> Result<&mut Self, SqlBridgeError>
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        self.require_open()?;
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if let Some(index) = columns.iter().position(|c| c.trim().is_empty()) {
            return Err(SqlBridgeError::InvalidArgument(format!(
                "blank column name at index: {index}"
            )));
        }
        self.generated_columns = Some(columns);
        Ok(self)
    }

    /// Snapshot the current state and return its lazy result sequence.
    ///
    /// Bind values and queued batch entries are cleared when this returns; later changes never
    /// affect the returned execution.
    ///
    /// # Errors
    /// Returns `IllegalState` if the connection is closed, a parameter is unset, or the bound
    /// state combines modes that cannot run together.
    pub fn execute(&mut self) -> Result<Execution, SqlBridgeError> {
        self.require_open()?;
        if !self.batch.is_empty() {
            self.execute_batch()
        } else if self.params.iter().flatten().any(Parameter::is_out) {
            self.execute_call()
        } else if self.generated_columns.is_some() {
            self.execute_generating_values()
        } else {
            self.execute_sql()
        }
    }

    fn effective_fetch_size(&self) -> u32 {
        self.fetch_size.unwrap_or(self.options.default_fetch_size)
    }

    fn take_params(&mut self) -> Vec<Parameter> {
        std::mem::replace(&mut self.params, empty_set(self.names.len()))
            .into_iter()
            .flatten()
            .collect()
    }

    fn require_all_set(&self) -> Result<(), SqlBridgeError> {
        if self.params.iter().any(Option::is_none) {
            Err(parameter_not_set())
        } else {
            Ok(())
        }
    }

    /// Hand one snapshot of the statement to the execution core.
    fn launch(
        &self,
        mode: &'static str,
        kind: PrepareKind,
        binds: BindPlan,
        results: ResultPlan,
    ) -> Execution {
        let sql = Arc::clone(&self.sql);
        let chunk = self.options.lob_chunk_size;
        let prepare: PrepareFn<S> =
            Box::new(move |session: &mut S| Ok(session.prepare(&sql, &kind)?));
        let bind: BindFn<S> = Box::new(
            move |session: SessionHandle<S>, stmt: StatementCell<S>, queue: DeallocationQueue<S>| {
                async move {
                    match binds {
                        BindPlan::In(params) => {
                            binder::bind_in_parameters(&session, &stmt, params, chunk, &queue).await
                        }
                        BindPlan::Call { params, outs } => {
                            binder::bind_in_parameters(&session, &stmt, params, chunk, &queue)
                                .await?;
                            binder::register_out_parameters(&session, &stmt, outs).await
                        }
                        BindPlan::Batch(batch) => {
                            binder::bind_batch(&session, &stmt, batch, chunk, &queue).await
                        }
                    }
                }
                .boxed()
            },
        );
        let produce: ProduceFn<S> = Box::new(
            move |session: SessionHandle<S>, stmt: StatementCell<S>, sink: ResultSink| {
                async move {
                    match results {
                        ResultPlan::Sql { fetch_size } => {
                            publish_sql_results(&session, &stmt, fetch_size, &sink).await
                        }
                        ResultPlan::Call {
                            fetch_size,
                            out_columns,
                        } => {
                            publish_call_results(&session, &stmt, fetch_size, out_columns, &sink)
                                .await
                        }
                        ResultPlan::Generated { fetch_size } => {
                            publish_generated_values(&session, &stmt, fetch_size, &sink).await
                        }
                        ResultPlan::Batch => publish_batch_update(&session, &stmt, &sink).await,
                    }
                }
                .boxed()
            },
        );
        execute(self.session.clone(), mode, prepare, bind, produce)
    }

    fn execute_sql(&mut self) -> Result<Execution, SqlBridgeError> {
        self.require_all_set()?;
        let params = self.take_params();
        let fetch_size = self.effective_fetch_size();
        tracing::debug!(mode = "plain", params = params.len(), "executing statement");
        Ok(self.launch(
            "plain",
            PrepareKind::Plain,
            BindPlan::In(params),
            ResultPlan::Sql { fetch_size },
        ))
    }

    fn execute_call(&mut self) -> Result<Execution, SqlBridgeError> {
        self.require_all_set()?;
        let params = self.take_params();
        let fetch_size = self.effective_fetch_size();

        let outs: Vec<(usize, SqlType)> = params
            .iter()
            .enumerate()
            .filter(|(_, param)| param.is_out())
            .map(|(position, param)| (position, param.sql_type().clone()))
            .collect();
        // Out values are addressed densely; unnamed markers are named by that ordinal.
        let out_columns: Vec<(usize, String)> = outs
            .iter()
            .enumerate()
            .map(|(ordinal, (position, _))| {
                let name = self.names[*position]
                    .clone()
                    .unwrap_or_else(|| ordinal.to_string());
                (*position, name)
            })
            .collect();
        tracing::debug!(mode = "call", outs = outs.len(), "executing statement");
        Ok(self.launch(
            "call",
            PrepareKind::Call,
            BindPlan::Call { params, outs },
            ResultPlan::Call {
                fetch_size,
                out_columns,
            },
        ))
    }

    fn execute_generating_values(&mut self) -> Result<Execution, SqlBridgeError> {
        self.require_all_set()?;
        let columns = match &self.generated_columns {
            Some(columns) if !columns.is_empty() => GeneratedColumns::Named(columns.clone()),
            _ => GeneratedColumns::DriverDefault,
        };
        let params = self.take_params();
        let fetch_size = self.effective_fetch_size();
        tracing::debug!(mode = "generated", ?columns, "executing statement");
        Ok(self.launch(
            "generated",
            PrepareKind::GeneratedKeys(columns),
            BindPlan::In(params),
            ResultPlan::Generated { fetch_size },
        ))
    }

    fn execute_batch(&mut self) -> Result<Execution, SqlBridgeError> {
        if self.generated_columns.is_some() {
            return Err(SqlBridgeError::IllegalState(
                "batch execution with generated values is not supported".into(),
            ));
        }
        // A complete current set joins the batch; a partial one is an error.
        if self.params.first().is_some_and(Option::is_some) {
            self.add_current()?;
        } else if self.params.iter().skip(1).any(Option::is_some) {
            return Err(parameter_not_set());
        }
        let batch: Vec<Vec<Parameter>> = std::mem::take(&mut self.batch).into();
        tracing::debug!(mode = "batch", entries = batch.len(), "executing statement");
        Ok(self.launch(
            "batch",
            PrepareKind::Plain,
            BindPlan::Batch(batch),
            ResultPlan::Batch,
        ))
    }
}

enum BindPlan {
    In(Vec<Parameter>),
    Call {
        params: Vec<Parameter>,
        outs: Vec<(usize, SqlType)>,
    },
    Batch(Vec<Vec<Parameter>>),
}

enum ResultPlan {
    Sql {
        fetch_size: u32,
    },
    Call {
        fetch_size: u32,
        out_columns: Vec<(usize, String)>,
    },
    Generated {
        fetch_size: u32,
    },
    Batch,
}

impl<S: Session> fmt::Debug for Statement<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("bound", &self.params.iter().filter(|p| p.is_some()).count())
            .field("batch", &self.batch.len())
            .field("fetch_size", &self.fetch_size)
            .field("generated_columns", &self.generated_columns)
            .finish()
    }
}

fn empty_set(len: usize) -> ParameterSet {
    std::iter::repeat_with(|| None).take(len).collect()
}

fn parameter_not_set() -> SqlBridgeError {
    SqlBridgeError::IllegalState("one or more parameters are not set".into())
}

/// Copy a parameter for binding at another marker of the same name. Streamed large objects
/// can only be read once and have no copy.
fn duplicate(param: &Parameter) -> Option<Parameter> {
    let value = |value: &BindValue| match value {
        BindValue::Null => Some(BindValue::Null),
        BindValue::Value(value) => Some(BindValue::Value(value.clone())),
        BindValue::Blob(_) | BindValue::Clob(_) => None,
    };
    Some(match param {
        Parameter::In(v, ty) => Parameter::In(value(v)?, ty.clone()),
        Parameter::Out(ty) => Parameter::Out(ty.clone()),
        Parameter::InOut(v, ty) => Parameter::InOut(value(v)?, ty.clone()),
    })
}
