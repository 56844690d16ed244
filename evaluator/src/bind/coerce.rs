//! Conversions between evaluated values and Rust field types.

use std::collections::BTreeMap;

use crate::value::{Ref, Value};

/// Types an attribute value can be decoded into.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

/// Types that encode to an attribute value. `None` omits the attribute.
pub trait IntoValue {
    fn into_value(&self) -> Option<Value>;
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.to_string_value().map_err(str::to_string)
    }
}

impl IntoValue for String {
    fn into_value(&self) -> Option<Value> {
        Some(Value::String(self.clone()))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.to_bool().map_err(str::to_string)
    }
}

impl IntoValue for bool {
    fn into_value(&self) -> Option<Value> {
        Some(Value::Bool(*self))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        value.to_number().map_err(str::to_string)
    }
}

impl IntoValue for f64 {
    fn into_value(&self) -> Option<Value> {
        Some(Value::Number(*self))
    }
}

macro_rules! integer {
    ($($ty:ty),*) => {$(
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self, String> {
                let n = value.to_number().map_err(str::to_string)?;
                if n.fract() != 0.0 || n < <$ty>::MIN as f64 || n > <$ty>::MAX as f64 {
                    return Err(format!("a whole number that fits {} is required", stringify!($ty)));
                }
                Ok(n as $ty)
            }
        }

        impl IntoValue for $ty {
            fn into_value(&self) -> Option<Value> {
                Some(Value::Number(*self as f64))
            }
        }
    )*};
}

integer!(i32, i64, u16, u32, u64, usize);

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl IntoValue for Value {
    fn into_value(&self) -> Option<Value> {
        (!self.is_null()).then(|| self.clone())
    }
}

impl FromValue for Ref {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Ref(r) => Ok(r.clone()),
            other => Err(format!("a reference is required, got {}", other.type_name())),
        }
    }
}

impl IntoValue for Ref {
    fn into_value(&self) -> Option<Value> {
        Some(Value::Ref(self.clone()))
    }
}

impl<V: FromValue> FromValue for Option<V> {
    fn from_value(value: &Value) -> Result<Self, String> {
        if value.is_null() {
            return Ok(None);
        }
        V::from_value(value).map(Some)
    }
}

impl<V: IntoValue> IntoValue for Option<V> {
    fn into_value(&self) -> Option<Value> {
        self.as_ref().and_then(IntoValue::into_value)
    }
}

impl<V: FromValue> FromValue for Vec<V> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::List(items) => items.iter().map(V::from_value).collect(),
            other => Err(format!("a list is required, got {}", other.type_name())),
        }
    }
}

impl<V: IntoValue> IntoValue for Vec<V> {
    fn into_value(&self) -> Option<Value> {
        Some(Value::List(
            self.iter()
                .map(|v| v.into_value().unwrap_or(Value::Null))
                .collect(),
        ))
    }
}

impl<V: FromValue> FromValue for BTreeMap<String, V> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| V::from_value(v).map(|v| (k.clone(), v)))
                .collect(),
            other => Err(format!("a map is required, got {}", other.type_name())),
        }
    }
}

impl<V: IntoValue> IntoValue for BTreeMap<String, V> {
    fn into_value(&self) -> Option<Value> {
        Some(Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.into_value().unwrap_or(Value::Null)))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_reject_fractions() {
        assert_eq!(i64::from_value(&Value::from(100.0)), Ok(100));
        assert_eq!(u32::from_value(&Value::from("8080")), Ok(8080));
        assert!(i32::from_value(&Value::from(1.5)).is_err());
        assert!(u16::from_value(&Value::from(-1.0)).is_err());
    }

    #[test]
    fn lists_convert_elementwise() {
        let v: Vec<bool> = FromValue::from_value(&vec![true, false].into()).unwrap();
        assert_eq!(v, vec![true, false]);
        let err = Vec::<i64>::from_value(&vec!["a"].into()).unwrap_err();
        assert_eq!(err, "a number is required");
    }

    #[test]
    fn null_options() {
        assert_eq!(Option::<String>::from_value(&Value::Null), Ok(None));
        assert_eq!(Option::<String>::None.into_value(), None);
    }

    #[test]
    fn refs_require_references() {
        let r = Ref::new("$schema.public");
        assert_eq!(Ref::from_value(&Value::Ref(r.clone())), Ok(r));
        assert!(Ref::from_value(&Value::from("$schema.public")).is_err());
    }
}
