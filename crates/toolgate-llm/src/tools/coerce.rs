//! Argument validation against a function's parameter schema
//!
//! Values are coerced toward the declared type where the intent is
//! unambiguous (`"42"` for an integer, `"yes"` for a boolean, `"a, b"` for
//! an array). Anything else is rejected with the path of the offending field.

use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use super::error::ValidationError;
use crate::types::{ParameterSchema, PropertySchema, SchemaType};

/// Validate and coerce a top-level argument object
///
/// Undeclared keys pass through untouched. Optional arguments that are
/// explicitly `null` are dropped.
pub fn coerce_arguments(schema: &ParameterSchema, arguments: Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
    coerce_object("", &schema.properties, &schema.required, arguments)
}

fn coerce_object(
    prefix: &str,
    properties: &IndexMap<String, PropertySchema>,
    required: &[String],
    mut arguments: Map<String, Value>,
) -> Result<Map<String, Value>, ValidationError> {
    for name in required {
        if arguments.get(name).is_none_or(Value::is_null) {
            return Err(ValidationError::Missing {
                field: join_path(prefix, name),
            });
        }
    }

    arguments.retain(|name, value| !(value.is_null() && properties.contains_key(name)));

    for (name, property) in properties {
        if let Some(slot) = arguments.get_mut(name) {
            *slot = coerce_value(&join_path(prefix, name), property, slot.take())?;
        }
    }

    Ok(arguments)
}

/// Coerce one value to its property schema
pub fn coerce_value(field: &str, schema: &PropertySchema, value: Value) -> Result<Value, ValidationError> {
    let value = match schema.schema_type {
        SchemaType::String => to_string(field, value)?,
        SchemaType::Number => to_number(field, value)?,
        SchemaType::Integer => to_integer(field, value)?,
        SchemaType::Boolean => to_boolean(field, value)?,
        SchemaType::Array => to_array(field, schema, value)?,
        SchemaType::Object => to_object(field, schema, value)?,
    };

    match &schema.enum_values {
        Some(allowed) => check_enum(field, allowed, value),
        None => Ok(value),
    }
}

fn to_string(field: &str, value: Value) -> Result<Value, ValidationError> {
    match value {
        Value::String(_) => Ok(value),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(type_error(field, "a string", &other)),
    }
}

fn to_number(field: &str, value: Value) -> Result<Value, ValidationError> {
    match value {
        Value::Number(_) => Ok(value),
        Value::String(ref s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| type_error(field, "a number", &value)),
        other => Err(type_error(field, "a number", &other)),
    }
}

fn to_integer(field: &str, value: Value) -> Result<Value, ValidationError> {
    let parsed = match &value {
        Value::Number(n) if n.is_i64() || n.is_u64() => return Ok(value),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(n) => return Ok(Value::from(n)),
                Err(_) => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    };

    match parsed {
        Some(f) if f.is_finite() && f.fract().abs() <= 0.0 && f.abs() < 9.0e15 => {
            #[allow(clippy::cast_possible_truncation)]
            let n = f as i64;
            Ok(Value::from(n))
        }
        _ => Err(type_error(field, "an integer", &value)),
    }
}

fn to_boolean(field: &str, value: Value) -> Result<Value, ValidationError> {
    let parsed = match &value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };

    parsed
        .map(Value::Bool)
        .ok_or_else(|| type_error(field, "a boolean", &value))
}

fn to_array(field: &str, schema: &PropertySchema, value: Value) -> Result<Value, ValidationError> {
    let items = match value {
        Value::Array(items) => items,
        Value::String(ref s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(Value::Array(items)) => items,
                    _ => return Err(type_error(field, "an array", &value)),
                }
            } else {
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_owned()))
                    .collect()
            }
        }
        other => return Err(type_error(field, "an array", &other)),
    };

    let Some(item_schema) = &schema.items else {
        return Ok(Value::Array(items));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| coerce_value(&format!("{field}[{i}]"), item_schema, item))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn to_object(field: &str, schema: &PropertySchema, value: Value) -> Result<Value, ValidationError> {
    let map = match value {
        Value::Object(map) => map,
        Value::String(ref s) => match serde_json::from_str::<Value>(s.trim()) {
            Ok(Value::Object(map)) => map,
            _ => return Err(type_error(field, "an object", &value)),
        },
        other => return Err(type_error(field, "an object", &other)),
    };

    match &schema.properties {
        Some(properties) => coerce_object(field, properties, &schema.required, map).map(Value::Object),
        None => Ok(Value::Object(map)),
    }
}

/// Exact membership, falling back to a case-insensitive match on strings
fn check_enum(field: &str, allowed: &[Value], value: Value) -> Result<Value, ValidationError> {
    if allowed.contains(&value) {
        return Ok(value);
    }

    if let Value::String(s) = &value
        && let Some(found) = allowed
            .iter()
            .find(|a| a.as_str().is_some_and(|a| a.eq_ignore_ascii_case(s)))
    {
        return Ok(found.clone());
    }

    Err(ValidationError::NotInEnum {
        field: field.to_owned(),
        allowed: allowed.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
    })
}

fn type_error(field: &str, expected: &'static str, found: &Value) -> ValidationError {
    let found = match found {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Array(_) => "an array".to_owned(),
        Value::Object(_) => "an object".to_owned(),
    };

    ValidationError::Type {
        field: field.to_owned(),
        expected,
        found,
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}
