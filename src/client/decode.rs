//! Tolerant field extraction from Keep API responses.
//!
//! The API is loosely typed: identifiers arrive as strings or floats, flags
//! as booleans or `"true"`/`"false"`. These helpers accept every shape seen
//! in practice and log (rather than fail on) anything else.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::error::ProviderError;

pub type Object = Map<String, Value>;

/// Parses a response body as JSON.
pub fn parse_body(resource: &'static str, bytes: &[u8]) -> Result<Value, ProviderError> {
    serde_json::from_slice(bytes).map_err(|err| ProviderError::decode(resource, err, bytes))
}

/// Parses a response body that must be a JSON object.
pub fn parse_object(resource: &'static str, bytes: &[u8]) -> Result<Object, ProviderError> {
    match parse_body(resource, bytes)? {
        Value::Object(object) => Ok(object),
        other => Err(ProviderError::decode(
            resource,
            format!("expected a JSON object, got {}", kind_of(&other)),
            bytes,
        )),
    }
}

/// Returns `object[key]` unwrapped when `object` is a single-key envelope
/// (`{"provider": {...}}`), otherwise the object itself.
pub fn unwrap_envelope(object: Object, key: &str) -> Object {
    if let Some(Value::Object(inner)) = object.get(key) {
        return inner.clone();
    }
    object
}

/// Renders a scalar the way Keep renders it in its UI: integral floats lose
/// their fractional part, strings are unquoted.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(number_to_string(n)),
        other => Some(other.to_string()),
    }
}

fn number_to_string(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Identifier as a string, whichever scalar type the server used.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(number_to_string(n)),
        _ => None,
    }
}

pub fn id_field(object: &Object, key: &str) -> Option<String> {
    object.get(key).and_then(id_string)
}

pub fn string_field(object: &Object, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        scalar @ (Value::Number(_) | Value::Bool(_)) => value_to_string(scalar),
        other => {
            unexpected(key, other);
            None
        }
    }
}

/// String field that must be present on a decoded object.
pub fn required_string(
    resource: &'static str,
    object: &Object,
    key: &str,
) -> Result<String, ProviderError> {
    string_field(object, key).ok_or_else(|| ProviderError::Decode {
        resource,
        detail: format!("response lacks field '{key}'"),
        body: Value::Object(object.clone()).to_string(),
    })
}

pub fn int_field(object: &Object, key: &str) -> Option<i64> {
    match object.get(key)? {
        Value::Null => None,
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) => Some(f as i64),
            Err(_) => {
                unexpected(key, &Value::String(s.clone()));
                None
            }
        },
        other => {
            unexpected(key, other);
            None
        }
    }
}

pub fn bool_field(object: &Object, key: &str) -> Option<bool> {
    match object.get(key)? {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        other => {
            unexpected(key, other);
            None
        }
    }
}

/// Object of scalars flattened to `String` values. Nested values are kept as
/// their JSON text.
pub fn string_map(object: &Object, key: &str) -> Option<BTreeMap<String, String>> {
    match object.get(key)? {
        Value::Null => None,
        Value::Object(map) => Some(
            map.iter()
                .filter_map(|(k, v)| value_to_string(v).map(|s| (k.clone(), s)))
                .collect(),
        ),
        other => {
            unexpected(key, other);
            None
        }
    }
}

/// List of strings; a lone string is treated as a one-element list.
pub fn string_list(object: &Object, key: &str) -> Option<Vec<String>> {
    match object.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => Some(items.iter().filter_map(value_to_string).collect()),
        other => {
            unexpected(key, other);
            None
        }
    }
}

fn unexpected(key: &str, value: &Value) {
    warn!(
        field = key,
        kind = kind_of(value),
        "ignoring field with unexpected shape in Keep API response"
    );
}

pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
