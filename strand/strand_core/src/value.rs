//! The dynamic value model.
//!
//! Deferred results, coroutine resumptions and message arguments all carry a
//! [`Value`]. The accessors in this module turn a value of the wrong shape
//! into an [`Error::Type`] so handlers can use `?` instead of matching.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// A dynamically typed value.
pub type Value = serde_json::Value;

/// Describe the JSON kind of a value for error messages.
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(expected: &str, value: &Value) -> Error {
    Error::Type(format!("expected {}, got {} ({})", expected, kind(value), value))
}

/// Read a value as a signed integer.
///
/// ```
/// use strand_core::value::{as_i64, Value};
///
/// assert_eq!(as_i64(&Value::from(3)).unwrap(), 3);
/// assert!(as_i64(&Value::from("bla")).is_err());
/// ```
pub fn as_i64(value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| type_error("integer", value))
}

/// Read a value as a float.
pub fn as_f64(value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| type_error("number", value))
}

/// Read a value as a string slice.
pub fn as_str(value: &Value) -> Result<&str> {
    value.as_str().ok_or_else(|| type_error("string", value))
}

/// Read a value as an array slice.
pub fn as_array(value: &Value) -> Result<&[Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| type_error("array", value))
}

/// Serialize any value into the dynamic model.
pub fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Deserialize a dynamic value into a typed one.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Fetch positional argument `index`, failing with a value error when absent.
pub fn arg(args: &[Value], index: usize) -> Result<&Value> {
    args.get(index)
        .ok_or_else(|| Error::Value(format!("missing argument {}", index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        assert_eq!(as_i64(&json!(41)).unwrap(), 41);
        assert_eq!(as_f64(&json!(1.5)).unwrap(), 1.5);
        assert_eq!(as_str(&json!("monitor")).unwrap(), "monitor");
        assert_eq!(as_array(&json!([1, 2])).unwrap().len(), 2);
    }

    #[test]
    fn test_type_errors() {
        let error = as_i64(&json!("bla")).unwrap_err();
        assert!(matches!(error, Error::Type(_)));
        assert!(error.to_string().contains("expected integer, got string"));

        assert!(matches!(as_str(&json!(1)), Err(Error::Type(_))));
        assert!(matches!(as_array(&Value::Null), Err(Error::Type(_))));
    }

    #[test]
    fn test_typed_round_trip() {
        let value = to_value((1u32, "two")).unwrap();
        let (one, two): (u32, String) = from_value(value).unwrap();
        assert_eq!(one, 1);
        assert_eq!(two, "two");

        let error = from_value::<u32>(json!("three")).unwrap_err();
        assert!(matches!(error, Error::Serialization(_)));
    }

    #[test]
    fn test_arg() {
        let args = vec![json!("tag")];
        assert_eq!(arg(&args, 0).unwrap(), &json!("tag"));
        assert!(matches!(arg(&args, 1), Err(Error::Value(_))));
    }
}
