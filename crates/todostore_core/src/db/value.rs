//! Dynamic property values and their SQLite encoding.
//!
//! # Responsibility
//! - Represent field values passed to and read from managed objects.
//! - Check values against declared property types.
//! - Convert between `Value` and SQLite storage values.
//!
//! # Invariants
//! - `bool` is stored as INTEGER 0/1, `date` as epoch milliseconds.
//! - `list<T>` is stored as a JSON array of object ids, never NULL.

use crate::db::{StoreError, StoreResult};
use crate::schema::{DefaultValue, ModelSchema, Property, PropertyKind};
use rusqlite::types::Value as SqlValue;
use std::collections::BTreeMap;

/// Internal identity of a managed object inside its collection.
pub type ObjectId = i64;

/// Field name to value mapping used by `create`.
pub type Fields = BTreeMap<String, Value>;

/// One property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    /// Unix epoch milliseconds.
    Date(i64),
    Object(ObjectId),
    List(Vec<ObjectId>),
}

impl Value {
    /// Short type tag used in type-mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Object(_) => "object",
            Self::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) | Self::Date(value) => Some(*value),
            _ => None,
        }
    }

    /// JSON rendering for debugging dumps.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(value) => serde_json::Value::Bool(*value),
            Self::Int(value) | Self::Date(value) | Self::Object(value) => {
                serde_json::Value::from(*value)
            }
            Self::Double(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(value) => serde_json::Value::String(value.clone()),
            Self::List(ids) => serde_json::Value::from(ids.clone()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Checks one value against its property declaration.
///
/// `int` values are accepted for `double` properties.
pub fn check_value(model: &ModelSchema, property: &'static Property, value: &Value) -> StoreResult<()> {
    let accepted = match (property.kind, value) {
        (_, Value::Null) => property.is_nullable(),
        (PropertyKind::String, Value::String(_))
        | (PropertyKind::Int, Value::Int(_))
        | (PropertyKind::Double, Value::Double(_) | Value::Int(_))
        | (PropertyKind::Bool, Value::Bool(_))
        | (PropertyKind::Date, Value::Date(_))
        | (PropertyKind::Object(_), Value::Object(_))
        | (PropertyKind::List(_), Value::List(_)) => true,
        _ => false,
    };

    if accepted {
        return Ok(());
    }

    let expected = if value.is_null() {
        format!("{} (non-null)", property.kind)
    } else {
        property.kind.to_string()
    };
    Err(StoreError::TypeMismatch {
        model: model.name,
        property: property.name,
        expected,
        found: value.type_name(),
    })
}

/// Value used when a create call omits `property`, if any.
pub(crate) fn implicit_value(property: &Property) -> Option<Value> {
    if let Some(default) = property.default {
        return Some(match (default, property.kind) {
            (DefaultValue::Bool(value), _) => Value::Bool(value),
            (DefaultValue::Int(value), PropertyKind::Date) => Value::Date(value),
            (DefaultValue::Int(value), _) => Value::Int(value),
            (DefaultValue::Double(value), _) => Value::Double(value),
            (DefaultValue::Str(value), _) => Value::String(value.to_string()),
        });
    }
    match property.kind {
        PropertyKind::List(_) => Some(Value::List(Vec::new())),
        _ if property.is_nullable() => Some(Value::Null),
        _ => None,
    }
}

/// Converts a checked value into its storage form.
pub(crate) fn encode(property: &Property, value: &Value) -> StoreResult<SqlValue> {
    Ok(match value {
        Value::Null if matches!(property.kind, PropertyKind::List(_)) => {
            SqlValue::Text("[]".to_string())
        }
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Int(number) if property.kind == PropertyKind::Double => {
            SqlValue::Real(*number as f64)
        }
        Value::Int(number) | Value::Date(number) | Value::Object(number) => {
            SqlValue::Integer(*number)
        }
        Value::Double(number) => SqlValue::Real(*number),
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::List(ids) => SqlValue::Text(serde_json::to_string(ids)?),
    })
}

/// Converts one stored column back into a `Value` of the declared kind.
pub(crate) fn decode(model: &ModelSchema, property: &Property, raw: SqlValue) -> StoreResult<Value> {
    let invalid = |raw: &SqlValue| {
        StoreError::InvalidData(format!(
            "unexpected {raw:?} in {}.{} ({})",
            model.name, property.name, property.kind
        ))
    };

    match (property.kind, raw) {
        (PropertyKind::List(_), SqlValue::Null) => Ok(Value::List(Vec::new())),
        (_, SqlValue::Null) => Ok(Value::Null),
        (PropertyKind::String, SqlValue::Text(text)) => Ok(Value::String(text)),
        (PropertyKind::Int, SqlValue::Integer(number)) => Ok(Value::Int(number)),
        (PropertyKind::Double, SqlValue::Real(number)) => Ok(Value::Double(number)),
        (PropertyKind::Double, SqlValue::Integer(number)) => Ok(Value::Double(number as f64)),
        (PropertyKind::Bool, SqlValue::Integer(0)) => Ok(Value::Bool(false)),
        (PropertyKind::Bool, SqlValue::Integer(1)) => Ok(Value::Bool(true)),
        (PropertyKind::Date, SqlValue::Integer(number)) => Ok(Value::Date(number)),
        (PropertyKind::Object(_), SqlValue::Integer(number)) => Ok(Value::Object(number)),
        (PropertyKind::List(_), SqlValue::Text(text)) => {
            let ids: Vec<ObjectId> = serde_json::from_str(&text)?;
            Ok(Value::List(ids))
        }
        (_, other) => Err(invalid(&other)),
    }
}
