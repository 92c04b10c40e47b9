use rusqlite::types::Value;

use crate::types::SqlValue;

/// Convert a bound value to the `SQLite` storage class it is written as.
#[must_use]
pub fn sql_value_to_sqlite(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Integer(i64::from(b)),
        SqlValue::TinyInt(i) => Value::Integer(i64::from(i)),
        SqlValue::SmallInt(i) => Value::Integer(i64::from(i)),
        SqlValue::Int(i) => Value::Integer(i64::from(i)),
        SqlValue::BigInt(i) => Value::Integer(i),
        SqlValue::Real(f) => Value::Real(f64::from(f)),
        SqlValue::Double(f) => Value::Real(f),
        SqlValue::Numeric(text) | SqlValue::Text(text) => Value::Text(text),
        SqlValue::Bytes(bytes) => Value::Blob(bytes),
        SqlValue::Date(d) => Value::Text(d.format("%F").to_string()),
        SqlValue::Time(t) => Value::Text(t.format("%T%.f").to_string()),
        SqlValue::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        SqlValue::TimestampTz(dt) => Value::Text(dt.to_rfc3339()),
        // ISO 8601 duration text
        SqlValue::Interval(delta) => Value::Text(delta.to_string()),
        SqlValue::IntervalMonths(months) => Value::Integer(i64::from(months)),
        SqlValue::Json(json) => Value::Text(json.to_string()),
    }
}

/// Convert a column value read from `SQLite`.
#[must_use]
pub fn sqlite_to_sql_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::BigInt(i),
        Value::Real(f) => SqlValue::Double(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Bytes(b),
    }
}
