//! Conversions between Rust field types and [`Value`].
//!
//! The derive macro builds getters and setters on top of these traits, so a
//! struct field of any type implementing [`FieldValue`] can take part in a
//! setter table.

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{Error, Result};
use crate::model::ScalarType;
use crate::value::{EntityRef, Value};

/// A Rust type that can be read from and written to a [`Value`]
pub trait FieldValue: Sized {
    /// Short type label used in conversion errors
    const LABEL: &'static str;

    /// Convert an already coerced value. `None` means the shape does not fit.
    fn from_value(value: Value) -> Option<Self>;

    fn to_value(&self) -> Value;

    /// What a null becomes in a slot that cannot hold null.
    /// `None` leaves the slot untouched.
    fn null_fallback() -> Option<Self> {
        None
    }
}

/// A Rust type with a declared scalar column type
pub trait Scalar {
    const TYPE: ScalarType;
}

/// Assign a value to a field slot, reporting a conversion error on mismatch.
///
/// Null assigned to a non-nullable slot falls back to the type's empty value,
/// or leaves the slot as it is when the type has none.
pub fn assign<T: FieldValue>(slot: &mut T, field: &str, value: Value) -> Result<()> {
    if value.is_null() {
        match T::from_value(Value::Null).or_else(T::null_fallback) {
            Some(v) => *slot = v,
            None => log::debug!("Null for non-nullable '{field}' ignored"),
        }
        return Ok(());
    }
    let found = value.type_name();
    match T::from_value(value) {
        Some(v) => {
            *slot = v;
            Ok(())
        }
        None => Err(Error::Conversion {
            field: field.to_string(),
            expected: T::LABEL,
            found: found.to_string(),
        }),
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    const LABEL: &'static str = T::LABEL;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, FieldValue::to_value)
    }
}

impl<T: Scalar> Scalar for Option<T> {
    const TYPE: ScalarType = T::TYPE;
}

impl FieldValue for Value {
    const LABEL: &'static str = "value";

    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }

    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FieldValue for EntityRef {
    const LABEL: &'static str = "reference";

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        Value::Ref(self.clone())
    }
}

impl FieldValue for i32 {
    const LABEL: &'static str = ScalarType::Int.name();

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(i) => Self::try_from(i).ok(),
            _ => None,
        }
    }

    fn null_fallback() -> Option<Self> {
        Some(0)
    }

    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }
}

impl Scalar for i32 {
    const TYPE: ScalarType = ScalarType::Int;
}

impl FieldValue for u32 {
    const LABEL: &'static str = ScalarType::Int.name();

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Int(i) => Self::try_from(i).ok(),
            _ => None,
        }
    }

    fn null_fallback() -> Option<Self> {
        Some(0)
    }

    fn to_value(&self) -> Value {
        Value::Int(i64::from(*self))
    }
}

impl Scalar for u32 {
    const TYPE: ScalarType = ScalarType::Int;
}

/// Implements both traits for types that map one-to-one onto a `Value` variant
macro_rules! direct_field_value {
    ($ty:ty, $variant:ident, $scalar:ident) => {
        impl FieldValue for $ty {
            const LABEL: &'static str = ScalarType::$scalar.name();

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn null_fallback() -> Option<Self> {
                Some(<$ty>::default())
            }

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }
        }

        impl Scalar for $ty {
            const TYPE: ScalarType = ScalarType::$scalar;
        }
    };
}

direct_field_value!(bool, Bool, Bool);
direct_field_value!(i64, Int, Int);
direct_field_value!(f64, Float, Float);
direct_field_value!(String, Text, Text);
direct_field_value!(NaiveDate, Date, Date);
direct_field_value!(NaiveDateTime, Timestamp, Timestamp);
