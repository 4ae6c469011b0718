//! Snapshot validation against stored schema definitions
//!
//! Supports the subset of JSON Schema that stored schemas use in practice:
//! `type` (single name or list), `required`, `properties` (recursive),
//! `additionalProperties: false`, `items` (recursive) and `enum`.
//! Unknown keywords are ignored.

use serde_json::{Map, Value};

use crate::errors::{Result, StateError};
use crate::model::StoredSchema;

/// Validate `content` against a stored schema
///
/// # Errors
/// `SchemaValidation` naming the first offending path.
pub fn validate_snapshot(schema: &StoredSchema, content: &Value) -> Result<()> {
    check(&schema.definition, content, "$").map_err(|reason| StateError::SchemaValidation {
        schema_key: schema.schema_key.clone(),
        schema_version: schema.schema_version.clone(),
        reason,
    })
}

/// Reject definitions that are not JSON objects or use malformed keywords
pub fn check_definition(definition: &Value) -> Result<()> {
    let obj = definition.as_object().ok_or_else(|| StateError::InvalidInput {
        reason: "schema definition must be a JSON object".to_string(),
    })?;
    if let Some(required) = obj.get("required") {
        let all_strings = required
            .as_array()
            .is_some_and(|r| r.iter().all(Value::is_string));
        if !all_strings {
            return Err(StateError::InvalidInput {
                reason: "`required` must be an array of strings".to_string(),
            });
        }
    }
    if let Some(props) = obj.get("properties") {
        let props = props.as_object().ok_or_else(|| StateError::InvalidInput {
            reason: "`properties` must be an object".to_string(),
        })?;
        for sub in props.values() {
            check_definition(sub)?;
        }
    }
    Ok(())
}

fn type_matches(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => false,
    }
}

fn check(schema: &Value, value: &Value, path: &str) -> std::result::Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    match schema.get("type") {
        Some(Value::String(name)) if !type_matches(name, value) => {
            return Err(format!("{} is not of type {}", path, name));
        }
        Some(Value::Array(names)) => {
            let any = names
                .iter()
                .filter_map(Value::as_str)
                .any(|n| type_matches(n, value));
            if !any {
                return Err(format!("{} matches none of the allowed types", path));
            }
        }
        _ => {}
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            return Err(format!("{} is not one of the allowed values", path));
        }
    }

    if let Value::Object(obj) = value {
        check_object(schema, obj, path)?;
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{}[{}]", path, i))?;
        }
    }

    Ok(())
}

fn check_object(
    schema: &Map<String, Value>,
    obj: &Map<String, Value>,
    path: &str,
) -> std::result::Result<(), String> {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                return Err(format!("{} is missing required property '{}'", path, name));
            }
        }
    }

    let props = schema.get("properties").and_then(Value::as_object);
    if let Some(props) = props {
        for (name, sub) in props {
            if let Some(v) = obj.get(name) {
                check(sub, v, &format!("{}.{}", path, name))?;
            }
        }
    }

    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
        let extra = obj
            .keys()
            .find(|k| props.map_or(true, |p| !p.contains_key(*k)));
        if let Some(extra) = extra {
            return Err(format!("{} has unexpected property '{}'", path, extra));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn todo_schema() -> StoredSchema {
        StoredSchema {
            schema_key: "todo".to_string(),
            schema_version: "1.0".to_string(),
            definition: json!({
                "type": "object",
                "required": ["title"],
                "properties": {
                    "title": { "type": "string" },
                    "done": { "type": "boolean" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                },
                "additionalProperties": false
            }),
        }
    }

    #[test]
    fn test_valid_snapshot() {
        let content = json!({ "title": "write docs", "done": false, "tags": ["a"] });
        assert!(validate_snapshot(&todo_schema(), &content).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = validate_snapshot(&todo_schema(), &json!({ "done": true })).unwrap_err();
        match err {
            StateError::SchemaValidation { reason, .. } => assert!(reason.contains("title")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_type_and_extra_property() {
        assert!(validate_snapshot(&todo_schema(), &json!({ "title": 3 })).is_err());
        assert!(validate_snapshot(&todo_schema(), &json!({ "title": "x", "owner": "me" })).is_err());
        assert!(validate_snapshot(&todo_schema(), &json!({ "title": "x", "tags": [1] })).is_err());
    }

    #[test]
    fn test_type_list_and_enum() {
        let schema = StoredSchema {
            schema_key: "k".to_string(),
            schema_version: "1".to_string(),
            definition: json!({ "type": ["string", "null"], "enum": ["a", null] }),
        };
        assert!(validate_snapshot(&schema, &json!("a")).is_ok());
        assert!(validate_snapshot(&schema, &Value::Null).is_ok());
        assert!(validate_snapshot(&schema, &json!("b")).is_err());
        assert!(validate_snapshot(&schema, &json!(1)).is_err());
    }

    #[test]
    fn test_check_definition() {
        assert!(check_definition(&todo_schema().definition).is_ok());
        assert!(check_definition(&json!("nope")).is_err());
        assert!(check_definition(&json!({ "required": [1] })).is_err());
    }
}
