//! Type-erased column values.
//!
//! A [`Datum`] is one cell of a record. The variant always matches the
//! [`DataType`] declared by the column it belongs to. Typed accessors never
//! coerce: asking an `Int64` datum for an `f64` is a [`TypeMismatch`].

use super::DataType;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Typed accessor used against an incompatible representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Type mismatch: expected {expected}, got {actual}")]
pub struct TypeMismatch {
    /// The representation the caller asked for
    pub expected: DataType,
    /// The datum's actual type
    pub actual: DataType,
}

/// A single type-erased value
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Boolean(bool),
    Int64(i64),
    /// 128-bit identifier, displayed as a UUID
    Uint128(u128),
    Float64(f64),
    /// UTF-8 string (reference counted for cheap retention)
    String(Arc<str>),
    /// Nanoseconds since the Unix epoch
    Time64Ns(i64),
}

impl Datum {
    /// Physical type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Datum::Boolean(_) => DataType::Boolean,
            Datum::Int64(_) => DataType::Int64,
            Datum::Uint128(_) => DataType::Uint128,
            Datum::Float64(_) => DataType::Float64,
            Datum::String(_) => DataType::String,
            Datum::Time64Ns(_) => DataType::Time64Ns,
        }
    }

    /// Create a string datum
    pub fn string(s: &str) -> Self {
        Datum::String(Arc::from(s))
    }

    /// Create a timestamp datum from nanoseconds since the epoch
    pub fn time_ns(nanos: i64) -> Self {
        Datum::Time64Ns(nanos)
    }

    fn mismatch(&self, expected: DataType) -> TypeMismatch {
        TypeMismatch {
            expected,
            actual: self.data_type(),
        }
    }

    pub fn as_bool(&self) -> Result<bool, TypeMismatch> {
        match self {
            Datum::Boolean(b) => Ok(*b),
            _ => Err(self.mismatch(DataType::Boolean)),
        }
    }

    pub fn as_i64(&self) -> Result<i64, TypeMismatch> {
        match self {
            Datum::Int64(v) => Ok(*v),
            _ => Err(self.mismatch(DataType::Int64)),
        }
    }

    pub fn as_u128(&self) -> Result<u128, TypeMismatch> {
        match self {
            Datum::Uint128(v) => Ok(*v),
            _ => Err(self.mismatch(DataType::Uint128)),
        }
    }

    /// Uint128 datum viewed as a UUID
    pub fn as_uuid(&self) -> Result<Uuid, TypeMismatch> {
        self.as_u128().map(Uuid::from_u128)
    }

    pub fn as_f64(&self) -> Result<f64, TypeMismatch> {
        match self {
            Datum::Float64(v) => Ok(*v),
            _ => Err(self.mismatch(DataType::Float64)),
        }
    }

    pub fn as_str(&self) -> Result<&str, TypeMismatch> {
        match self {
            Datum::String(s) => Ok(s),
            _ => Err(self.mismatch(DataType::String)),
        }
    }

    /// Raw nanoseconds of a Time64Ns datum
    pub fn as_time_ns(&self) -> Result<i64, TypeMismatch> {
        match self {
            Datum::Time64Ns(t) => Ok(*t),
            _ => Err(self.mismatch(DataType::Time64Ns)),
        }
    }

    /// Time64Ns datum as a UTC timestamp
    pub fn as_datetime(&self) -> Result<DateTime<Utc>, TypeMismatch> {
        self.as_time_ns().map(DateTime::from_timestamp_nanos)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Boolean(b) => write!(f, "{b}"),
            Datum::Int64(v) => write!(f, "{v}"),
            Datum::Uint128(v) => write!(f, "{}", Uuid::from_u128(*v).hyphenated()),
            Datum::Float64(v) => write!(f, "{v}"),
            Datum::String(s) => f.write_str(s),
            Datum::Time64Ns(t) => f.write_str(
                &DateTime::from_timestamp_nanos(*t).to_rfc3339_opts(SecondsFormat::Nanos, true),
            ),
        }
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Boolean(v)
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int64(v)
    }
}

impl From<u128> for Datum {
    fn from(v: u128) -> Self {
        Datum::Uint128(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Float64(v)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::string(s)
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(Arc::from(s))
    }
}
