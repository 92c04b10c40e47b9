use std::fmt;

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::SqlBridgeError;
use crate::type_map::to_driver_type;
use crate::types::{SqlType, SqlValue};

/// Identifies a parameter marker: by zero-based position or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Index(i64),
    Name(String),
}

impl From<usize> for Marker {
    fn from(index: usize) -> Self {
        Marker::Index(i64::try_from(index).unwrap_or(i64::MAX))
    }
}

impl From<i32> for Marker {
    fn from(index: i32) -> Self {
        Marker::Index(i64::from(index))
    }
}

impl From<i64> for Marker {
    fn from(index: i64) -> Self {
        Marker::Index(index)
    }
}

impl From<u32> for Marker {
    fn from(index: u32) -> Self {
        Marker::Index(i64::from(index))
    }
}

impl From<&str> for Marker {
    fn from(name: &str) -> Self {
        Marker::Name(name.to_owned())
    }
}

impl From<String> for Marker {
    fn from(name: String) -> Self {
        Marker::Name(name)
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Binary large object content, streamed to the database in chunks when bound.
pub struct Blob {
    chunks: BoxStream<'static, Result<Vec<u8>, SqlBridgeError>>,
    on_discard: Option<ReleaseHook>,
}

impl Blob {
    /// Blob backed by an asynchronous stream of chunks.
    pub fn from_stream<St>(chunks: St) -> Self
    where
        St: futures_util::Stream<Item = Result<Vec<u8>, SqlBridgeError>> + Send + 'static,
    {
        Self {
            chunks: chunks.boxed(),
            on_discard: None,
        }
    }

    /// Blob backed by bytes already in memory, written `chunk_size` bytes at a time.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>, chunk_size: usize) -> Self {
        let chunks: Vec<Result<Vec<u8>, SqlBridgeError>> = bytes
            .chunks(chunk_size.max(1))
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Self::from_stream(stream::iter(chunks))
    }

    /// Run `hook` when the content source is released.
    #[must_use]
    pub fn on_discard(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_discard = Some(Box::new(hook));
        self
    }

    pub(crate) async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, SqlBridgeError>> {
        self.chunks.next().await
    }

    /// Release the content source. Dropping the blob has the same effect.
    pub fn discard(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_discard.take() {
            hook();
        }
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob").finish_non_exhaustive()
    }
}

/// Character large object content, streamed to the database in chunks when bound.
pub struct Clob {
    chunks: BoxStream<'static, Result<String, SqlBridgeError>>,
    on_discard: Option<ReleaseHook>,
}

impl Clob {
    pub fn from_stream<St>(chunks: St) -> Self
    where
        St: futures_util::Stream<Item = Result<String, SqlBridgeError>> + Send + 'static,
    {
        Self {
            chunks: chunks.boxed(),
            on_discard: None,
        }
    }

    /// Clob backed by text already in memory, written in chunks of at most `chunk_size` bytes
    /// that never split a character.
    #[must_use]
    pub fn from_text(text: &str, chunk_size: usize) -> Self {
        let chunks: Vec<Result<String, SqlBridgeError>> = split_text(text, chunk_size.max(1))
            .into_iter()
            .map(|chunk| Ok(chunk.to_owned()))
            .collect();
        Self::from_stream(stream::iter(chunks))
    }

    #[must_use]
    pub fn on_discard(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_discard = Some(Box::new(hook));
        self
    }

    pub(crate) async fn next_chunk(&mut self) -> Option<Result<String, SqlBridgeError>> {
        self.chunks.next().await
    }

    pub fn discard(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(hook) = self.on_discard.take() {
            hook();
        }
    }
}

impl Drop for Clob {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Clob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clob").finish_non_exhaustive()
    }
}

fn split_text(text: &str, max_bytes: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max_bytes).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // A single character wider than the chunk size.
            end = start
                + text[start..]
                    .chars()
                    .next()
                    .map_or(text.len() - start, char::len_utf8);
        }
        chunks.push(&text[start..end]);
        start = end;
    }
    chunks
}

/// The value half of an in parameter.
#[derive(Debug)]
pub enum BindValue {
    Null,
    Value(SqlValue),
    Blob(Blob),
    Clob(Clob),
}

impl BindValue {
    fn is_null(&self) -> bool {
        matches!(self, BindValue::Null | BindValue::Value(SqlValue::Null))
    }

    fn inferred_type(&self) -> SqlType {
        match self {
            BindValue::Null => SqlType::Varchar,
            BindValue::Value(value) => value.inferred_type(),
            BindValue::Blob(_) => SqlType::Blob,
            BindValue::Clob(_) => SqlType::Clob,
        }
    }

    fn check_assignable(&self, ty: &SqlType) -> Result<(), SqlBridgeError> {
        let assignable = match self {
            BindValue::Null => true,
            BindValue::Value(value) => value.is_assignable_to(ty),
            BindValue::Blob(_) => matches!(
                ty,
                SqlType::Blob | SqlType::LongRaw | SqlType::VarBinary | SqlType::Binary
            ),
            BindValue::Clob(_) => matches!(
                ty,
                SqlType::Clob | SqlType::NClob | SqlType::Long | SqlType::Varchar | SqlType::NVarchar
            ),
        };
        if assignable {
            Ok(())
        } else {
            Err(SqlBridgeError::InvalidArgument(format!(
                "{self:?} cannot be bound as {ty:?}"
            )))
        }
    }
}

impl From<SqlValue> for BindValue {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => BindValue::Null,
            value => BindValue::Value(value),
        }
    }
}

impl From<Blob> for BindValue {
    fn from(blob: Blob) -> Self {
        BindValue::Blob(blob)
    }
}

impl From<Clob> for BindValue {
    fn from(clob: Clob) -> Self {
        BindValue::Clob(clob)
    }
}

/// A bound parameter together with its declared SQL type.
#[derive(Debug)]
pub enum Parameter {
    In(BindValue, SqlType),
    Out(SqlType),
    InOut(BindValue, SqlType),
}

impl Parameter {
    /// In parameter typed after its value.
    pub fn value(value: impl Into<BindValue>) -> Self {
        let value = value.into();
        let ty = value.inferred_type();
        Parameter::In(value, ty)
    }

    /// In parameter with an explicit SQL type.
    pub fn typed(value: impl Into<BindValue>, ty: SqlType) -> Self {
        Parameter::In(value.into(), ty)
    }

    #[must_use]
    pub fn out(ty: SqlType) -> Self {
        Parameter::Out(ty)
    }

    pub fn in_out(value: impl Into<BindValue>, ty: SqlType) -> Self {
        Parameter::InOut(value.into(), ty)
    }

    #[must_use]
    pub fn sql_type(&self) -> &SqlType {
        match self {
            Parameter::In(_, ty) | Parameter::Out(ty) | Parameter::InOut(_, ty) => ty,
        }
    }

    /// Whether the database produces a value for this parameter.
    #[must_use]
    pub fn is_out(&self) -> bool {
        matches!(self, Parameter::Out(_) | Parameter::InOut(..))
    }

    pub(crate) fn bind_value(&self) -> Option<&BindValue> {
        match self {
            Parameter::In(value, _) | Parameter::InOut(value, _) => Some(value),
            Parameter::Out(_) => None,
        }
    }

    pub(crate) fn into_parts(self) -> (Option<BindValue>, SqlType) {
        match self {
            Parameter::In(value, ty) | Parameter::InOut(value, ty) => (Some(value), ty),
            Parameter::Out(ty) => (None, ty),
        }
    }

    /// Check the declared type and the value against each other before anything is sent.
    pub(crate) fn validate(&self) -> Result<(), SqlBridgeError> {
        let ty = self.sql_type();
        if to_driver_type(ty).is_none() {
            return Err(SqlBridgeError::InvalidArgument(format!(
                "unsupported SQL type: {ty:?}"
            )));
        }
        match self.bind_value() {
            Some(value) => value.check_assignable(ty),
            None => Ok(()),
        }
    }

    pub(crate) fn has_null_value(&self) -> bool {
        matches!(self, Parameter::In(value, _) if value.is_null())
    }
}

impl From<BindValue> for Parameter {
    fn from(value: BindValue) -> Self {
        Parameter::value(value)
    }
}

impl From<SqlValue> for Parameter {
    fn from(value: SqlValue) -> Self {
        Parameter::value(value)
    }
}

impl From<Blob> for Parameter {
    fn from(blob: Blob) -> Self {
        Parameter::value(blob)
    }
}

impl From<Clob> for Parameter {
    fn from(clob: Clob) -> Self {
        Parameter::value(clob)
    }
}

macro_rules! impl_parameter_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Parameter {
                fn from(value: $ty) -> Self {
                    Parameter::value(SqlValue::from(value))
                }
            }
        )*
    };
}

impl_parameter_from!(
    bool,
    i8,
    i16,
    i32,
    i64,
    f32,
    f64,
    String,
    &str,
    Vec<u8>,
    &[u8],
    chrono::NaiveDate,
    chrono::NaiveTime,
    chrono::NaiveDateTime,
    chrono::DateTime<chrono::FixedOffset>,
    chrono::TimeDelta,
    serde_json::Value,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_chunks_respect_char_boundaries() {
        let text = "añb€c";
        let chunks = split_text(text, 2);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
        assert_eq!(split_text("€", 1), vec!["€"]);
    }

    #[test]
    fn named_types_are_rejected() {
        let param = Parameter::typed(SqlValue::Int(1), SqlType::Named("SDO_GEOMETRY".into()));
        assert!(matches!(
            param.validate(),
            Err(SqlBridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn values_must_fit_declared_type() {
        assert!(Parameter::typed(SqlValue::Bool(true), SqlType::Blob)
            .validate()
            .is_err());
        assert!(Parameter::typed(SqlValue::Int(7), SqlType::Numeric)
            .validate()
            .is_ok());
        assert!(Parameter::out(SqlType::Varchar).validate().is_ok());
    }

    #[test]
    fn discard_hook_runs_once() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let blob = Blob::from_bytes(vec![1, 2, 3], 2).on_discard(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        blob.discard();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
