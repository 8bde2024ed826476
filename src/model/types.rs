//! Scalar field types and coercion of record values into them.

use crate::config::DateFormatConfig;
use crate::error::{Error, Result};
use crate::value::dates::{parse_date_string, parse_timestamp_string};
use crate::value::{DATE_FORMAT, Identity, TIMESTAMP_FORMAT, Value};

/// Declared type of a scalar entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Int,
    Float,
    Text,
    Date,
    Timestamp,
}

impl ScalarType {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        }
    }

    /// Coerce a record value into this type.
    ///
    /// Null stays null. Empty text becomes null for every type except text.
    /// References contribute their identity.
    pub fn coerce(self, field: &str, value: Value, formats: &DateFormatConfig) -> Result<Value> {
        let value = match value {
            Value::Ref(r) => r.id.to_value(),
            Value::Text(s) if s.is_empty() && self != Self::Text => Value::Null,
            other => other,
        };
        if value.is_null() {
            return Ok(Value::Null);
        }

        let coerced = match (self, &value) {
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::Text, Value::Text(_))
            | (Self::Date, Value::Date(_))
            | (Self::Timestamp, Value::Timestamp(_)) => Some(value.clone()),

            (Self::Bool, Value::Int(i)) => match i {
                0 => Some(Value::Bool(false)),
                1 => Some(Value::Bool(true)),
                _ => None,
            },
            (Self::Bool, Value::Text(s)) => parse_bool(s).map(Value::Bool),

            (Self::Int, Value::Bool(b)) => Some(Value::Int(i64::from(*b))),
            #[allow(clippy::cast_possible_truncation)]
            (Self::Int, Value::Float(x)) if x.fract() == 0.0 => Some(Value::Int(*x as i64)),
            (Self::Int, Value::Text(s)) => s.trim().parse().ok().map(Value::Int),

            #[allow(clippy::cast_precision_loss)]
            (Self::Float, Value::Int(i)) => Some(Value::Float(*i as f64)),
            (Self::Float, Value::Text(s)) => s.trim().parse().ok().map(Value::Float),

            (Self::Text, Value::Bool(_) | Value::Int(_) | Value::Float(_)) => {
                Some(Value::Text(value.to_string()))
            }
            (Self::Text, Value::Date(d)) => Some(Value::Text(d.format(DATE_FORMAT).to_string())),
            (Self::Text, Value::Timestamp(ts)) => {
                Some(Value::Text(ts.format(TIMESTAMP_FORMAT).to_string()))
            }

            (Self::Date, Value::Timestamp(ts)) => Some(Value::Date(ts.date())),
            (Self::Date, Value::Text(s)) => parse_date_string(s.trim(), formats).map(Value::Date),

            (Self::Timestamp, Value::Date(d)) => d.and_hms_opt(0, 0, 0).map(Value::Timestamp),
            (Self::Timestamp, Value::Text(s)) => {
                parse_timestamp_string(s.trim(), formats).map(Value::Timestamp)
            }

            _ => None,
        };

        coerced.ok_or_else(|| Error::Conversion {
            field: field.to_string(),
            expected: self.name(),
            found: describe(&value),
        })
    }

    /// Coerce a value into an identity of this type
    pub fn identity(self, field: &str, value: Value, formats: &DateFormatConfig) -> Result<Option<Identity>> {
        let coerced = self.coerce(field, value, formats)?;
        Ok(Identity::from_value(&coerced))
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("text '{s}'"),
        other => format!("{} {other}", other.type_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn coerce(ty: ScalarType, value: impl Into<Value>) -> Result<Value> {
        ty.coerce("f", value.into(), &DateFormatConfig::default())
    }

    #[test]
    fn test_text_to_numbers() {
        assert_eq!(coerce(ScalarType::Int, " 42 ").unwrap(), Value::Int(42));
        assert_eq!(coerce(ScalarType::Float, "1.5").unwrap(), Value::Float(1.5));
        assert!(matches!(
            coerce(ScalarType::Int, "abc"),
            Err(Error::Conversion { expected: "int", .. })
        ));
    }

    #[test]
    fn test_empty_text_becomes_null() {
        assert_eq!(coerce(ScalarType::Date, "").unwrap(), Value::Null);
        assert_eq!(coerce(ScalarType::Text, "").unwrap(), Value::from(""));
    }

    #[test]
    fn test_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(coerce(ScalarType::Date, "29.02.2024").unwrap(), Value::Date(date));
        assert_eq!(
            coerce(ScalarType::Timestamp, date).unwrap(),
            Value::Timestamp(date.and_hms_opt(0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_bools() {
        assert_eq!(coerce(ScalarType::Bool, "Yes").unwrap(), Value::Bool(true));
        assert_eq!(coerce(ScalarType::Bool, 0).unwrap(), Value::Bool(false));
        assert!(coerce(ScalarType::Bool, 2).is_err());
    }
}
