use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde_json::Value as JsonValue;

/// Values that can be bound as statement parameters or read back from rows.
///
/// The same enum is used in both directions so helper code never has to branch on the
/// driver's own value types:
/// ```rust
/// use async_sql_bridge::prelude::*;
///
/// let values = vec![
///     SqlValue::BigInt(1),
///     SqlValue::Text("alice".into()),
///     SqlValue::Bool(true),
/// ];
/// # let _ = values;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    /// Exact numeric kept in its decimal text form
    Numeric(String),
    Text(String),
    /// Binary data
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    /// Day to second interval
    Interval(TimeDelta),
    /// Year to month interval, in months
    IntervalMonths(i32),
    /// JSON value
    Json(JsonValue),
}

impl SqlValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The SQL type a value of this kind maps to when bound without an explicit type.
    #[must_use]
    pub fn inferred_type(&self) -> SqlType {
        match self {
            SqlValue::Null => SqlType::Varchar,
            SqlValue::Bool(_) => SqlType::Boolean,
            SqlValue::TinyInt(_) => SqlType::TinyInt,
            SqlValue::SmallInt(_) => SqlType::SmallInt,
            SqlValue::Int(_) => SqlType::Integer,
            SqlValue::BigInt(_) => SqlType::BigInt,
            SqlValue::Real(_) => SqlType::Real,
            SqlValue::Double(_) => SqlType::Double,
            SqlValue::Numeric(_) => SqlType::Numeric,
            SqlValue::Text(_) => SqlType::Varchar,
            SqlValue::Bytes(_) => SqlType::VarBinary,
            SqlValue::Date(_) => SqlType::Date,
            SqlValue::Time(_) => SqlType::Time,
            SqlValue::Timestamp(_) => SqlType::Timestamp,
            SqlValue::TimestampTz(_) => SqlType::TimestampWithTimeZone,
            SqlValue::Interval(_) => SqlType::IntervalDayToSecond,
            SqlValue::IntervalMonths(_) => SqlType::IntervalYearToMonth,
            SqlValue::Json(_) => SqlType::Json,
        }
    }

    /// Whether this value can be bound to a parameter declared as `ty`.
    #[must_use]
    pub fn is_assignable_to(&self, ty: &SqlType) -> bool {
        let family = self.inferred_type().family();
        match self {
            SqlValue::Null => true,
            // Text is accepted by every character, numeric and temporal column; the database
            // performs the conversion.
            SqlValue::Text(_) => !matches!(
                ty.family(),
                TypeFamily::Binary | TypeFamily::Other
            ),
            _ => family == ty.family() || (family == TypeFamily::Numeric && ty.family() == TypeFamily::Character),
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::TinyInt(v) => Some(i64::from(*v)),
            SqlValue::SmallInt(v) => Some(i64::from(*v)),
            SqlValue::Int(v) => Some(i64::from(*v)),
            SqlValue::BigInt(v) => Some(*v),
            SqlValue::Numeric(text) => text.parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let SqlValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if let SqlValue::Bool(value) = self {
            return Some(*value);
        } else if let Some(i) = self.as_i64() {
            if i == 1 {
                return Some(true);
            } else if i == 0 {
                return Some(false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(v) => Some(f64::from(*v)),
            SqlValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let SqlValue::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let SqlValue::Bytes(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_value!(
    bool => Bool,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Real,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<FixedOffset> => TimestampTz,
    TimeDelta => Interval,
    JsonValue => Json,
);

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_owned())
    }
}

/// Byte slices are copied; the caller's buffer is never touched.
impl From<&[u8]> for SqlValue {
    fn from(value: &[u8]) -> Self {
        SqlValue::Bytes(value.to_vec())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Semantic SQL types a parameter can be declared with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlType {
    BigInt,
    Binary,
    BinaryDouble,
    BinaryFloat,
    Blob,
    Boolean,
    Char,
    Clob,
    Collection,
    Date,
    Decimal,
    Double,
    Float,
    Integer,
    IntervalDayToSecond,
    IntervalYearToMonth,
    Json,
    Long,
    LongRaw,
    NChar,
    NClob,
    Numeric,
    NVarchar,
    Real,
    RowId,
    SmallInt,
    Time,
    TimeWithTimeZone,
    Timestamp,
    TimestampWithLocalTimeZone,
    TimestampWithTimeZone,
    TinyInt,
    VarBinary,
    Varchar,
    /// A vendor type known to the caller but not to this crate.
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeFamily {
    Boolean,
    Numeric,
    Character,
    Binary,
    Temporal,
    Interval,
    Json,
    Other,
}

impl SqlType {
    pub(crate) fn family(&self) -> TypeFamily {
        match self {
            SqlType::Boolean => TypeFamily::Boolean,
            SqlType::BigInt
            | SqlType::BinaryDouble
            | SqlType::BinaryFloat
            | SqlType::Decimal
            | SqlType::Double
            | SqlType::Float
            | SqlType::Integer
            | SqlType::Numeric
            | SqlType::Real
            | SqlType::SmallInt
            | SqlType::TinyInt => TypeFamily::Numeric,
            SqlType::Char
            | SqlType::Clob
            | SqlType::Long
            | SqlType::NChar
            | SqlType::NClob
            | SqlType::NVarchar
            | SqlType::RowId
            | SqlType::Varchar => TypeFamily::Character,
            SqlType::Binary | SqlType::Blob | SqlType::LongRaw | SqlType::VarBinary => {
                TypeFamily::Binary
            }
            SqlType::Date
            | SqlType::Time
            | SqlType::TimeWithTimeZone
            | SqlType::Timestamp
            | SqlType::TimestampWithLocalTimeZone
            | SqlType::TimestampWithTimeZone => TypeFamily::Temporal,
            SqlType::IntervalDayToSecond | SqlType::IntervalYearToMonth => TypeFamily::Interval,
            SqlType::Json => TypeFamily::Json,
            SqlType::Collection | SqlType::Named(_) => TypeFamily::Other,
        }
    }

    /// Whether values of this type are large objects that must be streamed into a temporary
    /// server-side allocation.
    #[must_use]
    pub fn is_lob(&self) -> bool {
        matches!(self, SqlType::Blob | SqlType::Clob | SqlType::NClob)
    }
}
