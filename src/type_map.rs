//! Lookup between semantic [`SqlType`]s and the driver-level [`DriverType`]s that bind calls
//! are issued with. The tables are built once and never mutated.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::types::{SqlType, SqlValue};

/// Type codes understood by the blocking driver when binding or registering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverType {
    Array,
    BigInt,
    Binary,
    BinaryDouble,
    BinaryFloat,
    Blob,
    Boolean,
    Char,
    Clob,
    Date,
    Decimal,
    Double,
    Float,
    Integer,
    IntervalDayToSecond,
    IntervalYearToMonth,
    Json,
    LongVarBinary,
    LongVarChar,
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
    VarChar,
}

static DRIVER_TO_SQL: LazyLock<HashMap<DriverType, SqlType>> = LazyLock::new(|| {
    HashMap::from([
        (DriverType::BigInt, SqlType::BigInt),
        (DriverType::Binary, SqlType::Binary),
        (DriverType::BinaryDouble, SqlType::BinaryDouble),
        (DriverType::BinaryFloat, SqlType::BinaryFloat),
        (DriverType::Blob, SqlType::Blob),
        (DriverType::Boolean, SqlType::Boolean),
        (DriverType::Char, SqlType::Char),
        (DriverType::Clob, SqlType::Clob),
        (DriverType::Array, SqlType::Collection),
        (DriverType::Date, SqlType::Date),
        (DriverType::Decimal, SqlType::Decimal),
        (DriverType::Double, SqlType::Double),
        (DriverType::Float, SqlType::Float),
        (DriverType::Integer, SqlType::Integer),
        (DriverType::IntervalDayToSecond, SqlType::IntervalDayToSecond),
        (DriverType::IntervalYearToMonth, SqlType::IntervalYearToMonth),
        (DriverType::Json, SqlType::Json),
        (DriverType::LongVarBinary, SqlType::LongRaw),
        (DriverType::LongVarChar, SqlType::Long),
        (DriverType::NChar, SqlType::NChar),
        (DriverType::NClob, SqlType::NClob),
        (DriverType::Numeric, SqlType::Numeric),
        (DriverType::NVarchar, SqlType::NVarchar),
        (DriverType::Real, SqlType::Real),
        (DriverType::RowId, SqlType::RowId),
        (DriverType::SmallInt, SqlType::SmallInt),
        (DriverType::Time, SqlType::Time),
        (DriverType::TimeWithTimeZone, SqlType::TimeWithTimeZone),
        (DriverType::Timestamp, SqlType::Timestamp),
        (
            DriverType::TimestampWithLocalTimeZone,
            SqlType::TimestampWithLocalTimeZone,
        ),
        (DriverType::TimestampWithTimeZone, SqlType::TimestampWithTimeZone),
        (DriverType::TinyInt, SqlType::TinyInt),
        (DriverType::VarBinary, SqlType::VarBinary),
        (DriverType::VarChar, SqlType::Varchar),
    ])
});

// Inverse of DRIVER_TO_SQL
static SQL_TO_DRIVER: LazyLock<HashMap<SqlType, DriverType>> = LazyLock::new(|| {
    DRIVER_TO_SQL
        .iter()
        .map(|(driver, sql)| (sql.clone(), *driver))
        .collect()
});

/// Driver type used to bind or register a parameter declared as `sql_type`.
///
/// Returns `None` for types the driver cannot bind, such as [`SqlType::Named`].
#[must_use]
pub fn to_driver_type(sql_type: &SqlType) -> Option<DriverType> {
    SQL_TO_DRIVER.get(sql_type).copied()
}

/// Semantic type of a driver-reported column or parameter type.
#[must_use]
pub fn to_sql_type(driver_type: DriverType) -> Option<SqlType> {
    DRIVER_TO_SQL.get(&driver_type).cloned()
}

/// Driver type for a value bound without an explicit SQL type.
#[must_use]
pub fn infer_driver_type(value: &SqlValue) -> Option<DriverType> {
    to_driver_type(&value.inferred_type())
}
