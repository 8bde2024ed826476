//! Tagged values carried by records and entity fields.
//!
//! Upstream stages hand over loosely-typed data. Everything that flows through the
//! pipeline is normalised into [`Value`], so each stage states the shapes it
//! accepts in its signature instead of discovering them at runtime.

pub mod dates;
pub mod record;

pub use record::Record;

use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;

/// Date rendering used for text output and storage
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Timestamp rendering used for text output and storage
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit absence of a value
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Reference to another entity by identity
    Ref(EntityRef),
}

impl Value {
    /// Whether the value counts as "no value": null or empty text.
    ///
    /// `false` and `0` are real values and are not empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the value is a date or timestamp
    #[must_use]
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::Date(_) | Self::Timestamp(_))
    }

    /// Short name of the variant, used in conversion errors
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::Timestamp(_) => "timestamp",
            Self::Ref(_) => "reference",
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_entity_ref(&self) -> Option<&EntityRef> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Convert a JSON scalar into a value.
    ///
    /// Arrays and objects have no scalar representation and yield `None`.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::Text(s)),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Self::Ref(r) => write!(f, "{}", r.id),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<EntityRef> for Value {
    fn from(r: EntityRef) -> Self {
        Self::Ref(r)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

/// Stable identity of a persisted entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    Int(i64),
    Text(String),
}

impl Identity {
    /// Identity carried by a value, if the value can act as one
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Text(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            Value::Ref(r) => Some(r.id.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::Int(*i),
            Self::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Identity {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Lightweight reference to an entity: its type name and identity, nothing loaded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    /// Name of the referenced entity type
    pub entity: &'static str,
    /// Identity of the referenced entity
    pub id: Identity,
}

impl EntityRef {
    #[must_use]
    pub const fn new(entity: &'static str, id: Identity) -> Self {
        Self { entity, id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emptiness() {
        assert!(Value::Null.is_empty());
        assert!(Value::from("").is_empty());
        assert!(!Value::from(" ").is_empty());
        assert!(!Value::Int(0).is_empty());
        assert!(!Value::Bool(false).is_empty());
    }

    #[test]
    fn test_only_dates_and_timestamps_are_temporal() {
        let day = NaiveDate::from_ymd_opt(2023, 1, 15).unwrap();
        assert!(Value::Date(day).is_temporal());
        assert!(Value::Timestamp(day.and_hms_opt(8, 30, 0).unwrap()).is_temporal());
        assert!(!Value::from("2023-01-15").is_temporal());
        assert!(!Value::Int(20_230_115).is_temporal());
        assert!(!Value::Null.is_temporal());
    }

    #[test]
    fn test_json_scalars() {
        assert_eq!(Value::from_json(serde_json::json!(3)), Some(Value::Int(3)));
        assert_eq!(Value::from_json(serde_json::json!(1.5)), Some(Value::Float(1.5)));
        assert_eq!(Value::from_json(serde_json::json!([1])), None);
    }

    #[test]
    fn test_identity_from_value() {
        assert_eq!(Identity::from_value(&Value::Int(7)), Some(Identity::Int(7)));
        assert_eq!(Identity::from_value(&Value::from("")), None);
        assert_eq!(Identity::from_value(&Value::Float(1.0)), None);
    }
}
