//! Execution core: turns one blocking statement execution into a lazily started, single
//! subscriber sequence of [`QueryResult`](crate::results::QueryResult)s.

mod dealloc;
mod pipeline;
mod publisher;

pub use self::pipeline::{Execution, ResultStream};

pub(crate) use self::pipeline::{BindFn, PrepareFn, ProduceFn, ResultSink, execute};
pub(crate) use dealloc::DeallocationQueue;
pub(crate) use publisher::{
    publish_batch_update, publish_call_results, publish_generated_values, publish_sql_results,
};
