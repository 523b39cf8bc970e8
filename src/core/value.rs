//! Database value types
//!
//! [`DatabaseValue`] is the provider-independent carrier for parameter values
//! and column values. [`ToValue`] turns Rust values into bindable values
//! (keeping a [`DbType`] tag even for nulls), [`FromValue`] converts column
//! values back with checked narrowing.

use super::error::{DatabaseError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Text layouts accepted when a date/time column comes back as text
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Database value that can hold different types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatabaseValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Unique identifier
    Guid(Uuid),
    /// Date and time without offset
    DateTime(NaiveDateTime),
}

/// Provider-independent type tag of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbType {
    Boolean,
    Int32,
    Int64,
    Single,
    Double,
    String,
    Binary,
    Guid,
    DateTime,
    /// Nothing is known about the type (untyped null)
    Unknown,
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DbType::Boolean => "boolean",
            DbType::Int32 => "int32",
            DbType::Int64 => "int64",
            DbType::Single => "single",
            DbType::Double => "double",
            DbType::String => "string",
            DbType::Binary => "binary",
            DbType::Guid => "guid",
            DbType::DateTime => "datetime",
            DbType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl DatabaseValue {
    /// Get the value as a string slice (zero-copy for String values)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get the value as bytes (zero-copy)
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DatabaseValue::Bytes(b) => Some(b),
            DatabaseValue::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Type tag inferred from the variant
    pub fn db_type(&self) -> DbType {
        match self {
            DatabaseValue::Null => DbType::Unknown,
            DatabaseValue::Bool(_) => DbType::Boolean,
            DatabaseValue::Int(_) => DbType::Int32,
            DatabaseValue::Long(_) => DbType::Int64,
            DatabaseValue::Float(_) => DbType::Single,
            DatabaseValue::Double(_) => DbType::Double,
            DatabaseValue::String(_) => DbType::String,
            DatabaseValue::Bytes(_) => DbType::Binary,
            DatabaseValue::Guid(_) => DbType::Guid,
            DatabaseValue::DateTime(_) => DbType::DateTime,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            DatabaseValue::Null => "null",
            DatabaseValue::Bool(_) => "bool",
            DatabaseValue::Int(_) => "int",
            DatabaseValue::Long(_) => "long",
            DatabaseValue::Float(_) => "float",
            DatabaseValue::Double(_) => "double",
            DatabaseValue::String(_) => "string",
            DatabaseValue::Bytes(_) => "bytes",
            DatabaseValue::Guid(_) => "guid",
            DatabaseValue::DateTime(_) => "datetime",
        }
    }

    /// Convert to `T`, naming `column` in any error
    ///
    /// Nulls become `T::from_null()`; a target without a null state fails
    /// with [`DatabaseError::NullMapping`].
    pub fn convert<T: FromValue>(&self, column: &str) -> Result<T> {
        if self.is_null() {
            return T::from_null()
                .ok_or_else(|| DatabaseError::null_mapping(column, std::any::type_name::<T>()));
        }
        T::from_value(self).ok_or_else(|| {
            DatabaseError::conversion(column, std::any::type_name::<T>(), self.type_name())
        })
    }

    fn to_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int(v) => Some(i64::from(*v)),
            DatabaseValue::Long(v) => Some(*v),
            DatabaseValue::Bool(v) => Some(i64::from(*v)),
            DatabaseValue::Double(v) => integral(*v),
            DatabaseValue::Float(v) => integral(f64::from(*v)),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn to_f64(&self) -> Option<f64> {
        match self {
            DatabaseValue::Double(v) => Some(*v),
            DatabaseValue::Float(v) => Some(f64::from(*v)),
            DatabaseValue::Int(v) => Some(f64::from(*v)),
            DatabaseValue::Long(v) => Some(*v as f64),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Float to integer only when nothing is lost
fn integral(v: f64) -> Option<i64> {
    if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseValue::Null => f.write_str("null"),
            DatabaseValue::Bool(v) => write!(f, "{}", v),
            DatabaseValue::Int(v) => write!(f, "{}", v),
            DatabaseValue::Long(v) => write!(f, "{}", v),
            DatabaseValue::Float(v) => write!(f, "{}", v),
            DatabaseValue::Double(v) => write!(f, "{}", v),
            DatabaseValue::String(s) => f.write_str(s),
            DatabaseValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            DatabaseValue::Guid(g) => write!(f, "{}", g),
            DatabaseValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

/// Conversion of a Rust value into a bindable [`DatabaseValue`]
pub trait ToValue {
    /// Type tag used when the value is null
    const DB_TYPE: DbType;

    /// Convert to a database value
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Binding`] if the value has no database
    /// representation (e.g. an unsigned integer above `i64::MAX`).
    fn to_value(&self) -> Result<DatabaseValue>;

    /// Type tag of this particular value
    fn db_type(&self) -> DbType {
        Self::DB_TYPE
    }
}

macro_rules! to_value_via {
    ($($ty:ty => $variant:ident($conv:ty), $tag:ident;)*) => {
        $(
            impl ToValue for $ty {
                const DB_TYPE: DbType = DbType::$tag;

                fn to_value(&self) -> Result<DatabaseValue> {
                    Ok(DatabaseValue::$variant(<$conv>::from(*self)))
                }
            }
        )*
    };
}

to_value_via! {
    bool => Bool(bool), Boolean;
    i8 => Int(i32), Int32;
    i16 => Int(i32), Int32;
    i32 => Int(i32), Int32;
    u8 => Int(i32), Int32;
    u16 => Int(i32), Int32;
    u32 => Long(i64), Int64;
    i64 => Long(i64), Int64;
    f32 => Float(f32), Single;
    f64 => Double(f64), Double;
}

impl ToValue for u64 {
    const DB_TYPE: DbType = DbType::Int64;

    fn to_value(&self) -> Result<DatabaseValue> {
        i64::try_from(*self)
            .map(DatabaseValue::Long)
            .map_err(|_| DatabaseError::binding(format!("{} does not fit in a 64-bit signed column", self)))
    }
}

impl ToValue for usize {
    const DB_TYPE: DbType = DbType::Int64;

    fn to_value(&self) -> Result<DatabaseValue> {
        (*self as u64).to_value()
    }
}

impl ToValue for str {
    const DB_TYPE: DbType = DbType::String;

    fn to_value(&self) -> Result<DatabaseValue> {
        Ok(DatabaseValue::String(self.to_string()))
    }
}

impl ToValue for String {
    const DB_TYPE: DbType = DbType::String;

    fn to_value(&self) -> Result<DatabaseValue> {
        Ok(DatabaseValue::String(self.clone()))
    }
}

impl ToValue for [u8] {
    const DB_TYPE: DbType = DbType::Binary;

    fn to_value(&self) -> Result<DatabaseValue> {
        Ok(DatabaseValue::Bytes(self.to_vec()))
    }
}

impl ToValue for Vec<u8> {
    const DB_TYPE: DbType = DbType::Binary;

    fn to_value(&self) -> Result<DatabaseValue> {
        Ok(DatabaseValue::Bytes(self.clone()))
    }
}

impl ToValue for Uuid {
    const DB_TYPE: DbType = DbType::Guid;

    fn to_value(&self) -> Result<DatabaseValue> {
        Ok(DatabaseValue::Guid(*self))
    }
}

impl ToValue for NaiveDateTime {
    const DB_TYPE: DbType = DbType::DateTime;

    fn to_value(&self) -> Result<DatabaseValue> {
        Ok(DatabaseValue::DateTime(*self))
    }
}

impl ToValue for NaiveDate {
    const DB_TYPE: DbType = DbType::DateTime;

    fn to_value(&self) -> Result<DatabaseValue> {
        Ok(DatabaseValue::DateTime(self.and_time(chrono::NaiveTime::MIN)))
    }
}

impl ToValue for DateTime<Utc> {
    const DB_TYPE: DbType = DbType::DateTime;

    fn to_value(&self) -> Result<DatabaseValue> {
        Ok(DatabaseValue::DateTime(self.naive_utc()))
    }
}

impl ToValue for DatabaseValue {
    const DB_TYPE: DbType = DbType::Unknown;

    fn to_value(&self) -> Result<DatabaseValue> {
        Ok(self.clone())
    }

    fn db_type(&self) -> DbType {
        DatabaseValue::db_type(self)
    }
}

impl<T: ToValue> ToValue for Option<T> {
    const DB_TYPE: DbType = T::DB_TYPE;

    fn to_value(&self) -> Result<DatabaseValue> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(DatabaseValue::Null),
        }
    }

    fn db_type(&self) -> DbType {
        match self {
            Some(v) => v.db_type(),
            None => T::DB_TYPE,
        }
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    const DB_TYPE: DbType = T::DB_TYPE;

    fn to_value(&self) -> Result<DatabaseValue> {
        (**self).to_value()
    }

    fn db_type(&self) -> DbType {
        (**self).db_type()
    }
}

/// Checked conversion of a non-null column value into a Rust type
pub trait FromValue: Sized {
    /// Convert a non-null value, `None` if the representation is incompatible
    fn from_value(value: &DatabaseValue) -> Option<Self>;

    /// The target's empty state, `None` if the target is not nullable
    fn from_null() -> Option<Self> {
        None
    }
}

macro_rules! from_value_integer {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &DatabaseValue) -> Option<Self> {
                    value.to_i64().and_then(|v| <$ty>::try_from(v).ok())
                }
            }
        )*
    };
}

from_value_integer!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        value.to_f64()
    }
}

impl FromValue for f32 {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Float(v) => Some(*v),
            other => other.to_f64().and_then(|v| {
                let narrowed = v as f32;
                (narrowed.is_finite() || !v.is_finite()).then_some(narrowed)
            }),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Bool(v) => Some(*v),
            DatabaseValue::Int(_) | DatabaseValue::Long(_) => match value.to_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            DatabaseValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Null => None,
            DatabaseValue::Bytes(b) => String::from_utf8(b.clone()).ok(),
            other => Some(other.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Bytes(b) => Some(b.clone()),
            DatabaseValue::String(s) => Some(s.as_bytes().to_vec()),
            DatabaseValue::Guid(g) => Some(g.as_bytes().to_vec()),
            _ => None,
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::Guid(g) => Some(*g),
            DatabaseValue::Bytes(b) => Uuid::from_slice(b).ok(),
            DatabaseValue::String(s) => Uuid::parse_str(s.trim()).ok(),
            _ => None,
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        match value {
            DatabaseValue::DateTime(dt) => Some(*dt),
            DatabaseValue::String(s) => parse_datetime(s),
            _ => None,
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        NaiveDateTime::from_value(value).map(|dt| dt.date())
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        NaiveDateTime::from_value(value).map(|dt| dt.and_utc())
    }
}

impl FromValue for DatabaseValue {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        Some(value.clone())
    }

    fn from_null() -> Option<Self> {
        Some(DatabaseValue::Null)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &DatabaseValue) -> Option<Self> {
        T::from_value(value).map(Some)
    }

    fn from_null() -> Option<Self> {
        Some(None)
    }
}

impl From<bool> for DatabaseValue {
    fn from(v: bool) -> Self {
        DatabaseValue::Bool(v)
    }
}

impl From<i32> for DatabaseValue {
    fn from(v: i32) -> Self {
        DatabaseValue::Int(v)
    }
}

impl From<i64> for DatabaseValue {
    fn from(v: i64) -> Self {
        DatabaseValue::Long(v)
    }
}

impl From<f64> for DatabaseValue {
    fn from(v: f64) -> Self {
        DatabaseValue::Double(v)
    }
}

impl From<String> for DatabaseValue {
    fn from(v: String) -> Self {
        DatabaseValue::String(v)
    }
}

impl From<&str> for DatabaseValue {
    fn from(v: &str) -> Self {
        DatabaseValue::String(v.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(v: Vec<u8>) -> Self {
        DatabaseValue::Bytes(v)
    }
}

impl From<Uuid> for DatabaseValue {
    fn from(v: Uuid) -> Self {
        DatabaseValue::Guid(v)
    }
}

impl From<NaiveDateTime> for DatabaseValue {
    fn from(v: NaiveDateTime) -> Self {
        DatabaseValue::DateTime(v)
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DatabaseValue::Null,
        }
    }
}
