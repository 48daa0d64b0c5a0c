//! Canonical value representation for element properties and statement
//! parameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{GraphError, Result};

/// Typed value tagged with explicit type information so the wire format
/// remains unambiguous across transports.
///
/// Element properties are restricted to the scalar variants (see
/// [`check_property_value`]); `Null`, `List` and `Map` exist for statement
/// parameters, where an explicit null marks a removed property and maps
/// carry the full property set of an element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Null literal, only valid as a statement parameter.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Point in time with UTC offset.
    DateTime(OffsetDateTime),
    /// Ordered list of values.
    List(Vec<Value>),
    /// String-keyed map of values.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

/// Validates a caller-supplied property value against the closed set of
/// scalar types the store supports.
///
/// Rejecting anything else is a contract, not an edge case: callers must
/// fail fast instead of silently coercing.
pub fn check_property_value(value: &Value) -> Result<()> {
    match value {
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) | Value::DateTime(_) => {
            Ok(())
        }
        other => Err(GraphError::UnsupportedType(other.type_name())),
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Value::DateTime(value)
    }
}
