//! Input schema checks for registered tools
//!
//! Covers the JSON Schema subset tools declare: an `object` root with named
//! `properties`, a `required` list, optional `enum` values and
//! `additionalProperties: false`.

use serde_json::{json, Map, Value};

/// Checks the declared shape of a tool's input schema at registration.
pub fn check_schema_shape(schema: &Value) -> Result<(), String> {
    let Some(object) = schema.as_object() else {
        return Err("input schema must be a JSON object".to_string());
    };

    match object.get("type").and_then(Value::as_str) {
        Some("object") => {}
        _ => return Err("input schema type must be \"object\"".to_string()),
    }

    if let Some(properties) = object.get("properties") {
        let properties = properties
            .as_object()
            .ok_or_else(|| "properties must be an object".to_string())?;
        if let Some((name, _)) = properties.iter().find(|(_, property)| !property.is_object()) {
            return Err(format!("property '{name}' must be described by an object"));
        }
    }

    if let Some(required) = object.get("required") {
        let names = required
            .as_array()
            .ok_or_else(|| "required must be an array".to_string())?;
        if names.iter().any(|name| !name.is_string()) {
            return Err("required entries must be strings".to_string());
        }
    }

    Ok(())
}

/// Validates call arguments against a tool's input schema.
pub fn validate_arguments(schema: &Value, arguments: &Map<String, Value>) -> Result<(), String> {
    let properties = schema.get("properties").and_then(Value::as_object);

    for name in schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
    {
        if !arguments.contains_key(name) {
            return Err(format!("missing required argument '{name}'"));
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (name, value) in arguments {
        let Some(property) = properties.and_then(|props| props.get(name)) else {
            if closed {
                return Err(format!("unexpected argument '{name}'"));
            }
            continue;
        };

        if let Some(expected) = property.get("type") {
            if !matches_type(expected, value) {
                return Err(format!(
                    "argument '{name}' must be of type {}",
                    describe_type(expected)
                ));
            }
        }

        if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(format!("argument '{name}' is not one of the allowed values"));
            }
        }
    }

    Ok(())
}

fn matches_type(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_type_name(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(name, value)),
        _ => true,
    }
}

fn matches_type_name(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(name) => name.clone(),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

/// Schema for a tool taking a single required string argument.
pub fn single_string_argument(name: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            name: {
                "type": "string",
                "description": description
            }
        },
        "required": [name]
    })
}
