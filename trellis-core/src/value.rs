//! Column values and result rows.
//!
//! [`Value`] is the bound-parameter and result-cell type shared by the
//! statement builder, the execution backends, and document row mapping.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use uuid::Uuid;

use crate::{TrellisError, TrellisResult};

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Text(String),
    Ascii(String),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Varint(i128),
    Counter(i64),
    Float(f32),
    Double(f64),
    /// Decimal kept in its canonical string form.
    Decimal(String),
    Boolean(bool),
    Blob(Vec<u8>),
    Uuid(Uuid),
    TimeUuid(Uuid),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Inet(IpAddr),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
    Vector(Vec<f32>),
}

impl Value {
    /// Short name of the variant, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Ascii(_) => "ascii",
            Value::TinyInt(_) => "tinyint",
            Value::SmallInt(_) => "smallint",
            Value::Int(_) => "int",
            Value::BigInt(_) => "bigint",
            Value::Varint(_) => "varint",
            Value::Counter(_) => "counter",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::Boolean(_) => "boolean",
            Value::Blob(_) => "blob",
            Value::Uuid(_) => "uuid",
            Value::TimeUuid(_) => "timeuuid",
            Value::Timestamp(_) => "timestamp",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Inet(_) => "inet",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Tuple(_) => "tuple",
            Value::Vector(_) => "vector",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text content of text-like values (text, ascii, decimal).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Ascii(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<IpAddr> for Value {
    fn from(v: IpAddr) -> Self {
        Value::Inet(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<Value>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(v: BTreeMap<K, V>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Conversion from a result cell into a Rust value.
pub trait FromValue: Sized {
    fn from_value(column: &str, value: &Value) -> TrellisResult<Self>;
}

fn mismatch(column: &str, expected: &str, found: &Value) -> TrellisError {
    TrellisError::ValueConversion {
        column: column.to_string(),
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

macro_rules! from_value_impl {
    ($ty:ty, $expected:literal, $($pat:pat => $out:expr),+ $(,)?) => {
        impl FromValue for $ty {
            fn from_value(column: &str, value: &Value) -> TrellisResult<Self> {
                match value {
                    $($pat => Ok($out),)+
                    other => Err(mismatch(column, $expected, other)),
                }
            }
        }
    };
}

from_value_impl!(String, "text",
    Value::Text(s) => s.clone(),
    Value::Ascii(s) => s.clone(),
    Value::Decimal(s) => s.clone(),
);
from_value_impl!(i8, "tinyint", Value::TinyInt(v) => *v);
from_value_impl!(i16, "smallint",
    Value::SmallInt(v) => *v,
    Value::TinyInt(v) => i16::from(*v),
);
from_value_impl!(i32, "int",
    Value::Int(v) => *v,
    Value::SmallInt(v) => i32::from(*v),
    Value::TinyInt(v) => i32::from(*v),
);
from_value_impl!(i64, "bigint",
    Value::BigInt(v) => *v,
    Value::Counter(v) => *v,
    Value::Int(v) => i64::from(*v),
);
from_value_impl!(i128, "varint",
    Value::Varint(v) => *v,
    Value::BigInt(v) => i128::from(*v),
    Value::Int(v) => i128::from(*v),
);
from_value_impl!(f32, "float", Value::Float(v) => *v);
from_value_impl!(f64, "double",
    Value::Double(v) => *v,
    Value::Float(v) => f64::from(*v),
);
from_value_impl!(bool, "boolean", Value::Boolean(v) => *v);
from_value_impl!(Uuid, "uuid",
    Value::Uuid(v) => *v,
    Value::TimeUuid(v) => *v,
);
from_value_impl!(DateTime<Utc>, "timestamp", Value::Timestamp(v) => *v);
from_value_impl!(NaiveDate, "date", Value::Date(v) => *v);
from_value_impl!(NaiveTime, "time", Value::Time(v) => *v);
from_value_impl!(IpAddr, "inet", Value::Inet(v) => *v);

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(column: &str, value: &Value) -> TrellisResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(column, other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(column: &str, value: &Value) -> TrellisResult<Self> {
        match value {
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => items
                .iter()
                .map(|item| T::from_value(column, item))
                .collect(),
            Value::Vector(items) => items
                .iter()
                .map(|item| T::from_value(column, &Value::Float(*item)))
                .collect(),
            // Empty collections come back as null.
            Value::Null => Ok(Vec::new()),
            other => Err(mismatch(column, "list", other)),
        }
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    fn from_value(column: &str, value: &Value) -> TrellisResult<Self> {
        match value {
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| Ok((K::from_value(column, k)?, V::from_value(column, v)?)))
                .collect(),
            Value::Null => Ok(BTreeMap::new()),
            other => Err(mismatch(column, "map", other)),
        }
    }
}

/// One result row: column names mapped to values, in result order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut row = Self::new();
        for (k, v) in pairs {
            row.insert(k, v);
        }
        row
    }

    /// Set a column, replacing any existing value under the same name.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Typed getter; a missing column reads as null.
    pub fn get_as<T: FromValue>(&self, column: &str) -> TrellisResult<T> {
        T::from_value(column, self.get(column).unwrap_or(&Value::Null))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_pairs(self) -> Vec<(String, Value)> {
        self.columns
    }
}
