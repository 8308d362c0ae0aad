//! OpenAPI schema node → `Schema` translation
//!
//! Schemas are only consulted to pick a flag kind and default, so the
//! translation is deliberately tolerant: anything malformed or absent
//! degrades to an untyped schema, which downstream code treats as a string.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type metadata for one parameter or body shape.
///
/// The input is assumed to be reference-resolved (a tree, not a graph); a
/// `$ref` that surfaces anyway translates as an untyped schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// "string", "integer", "number", "boolean", "array", "object", or ""
    /// when the node carried no usable type.
    #[serde(default)]
    pub schema_type: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub enum_values: Vec<Value>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub min_length: Option<u64>,
    #[serde(default)]
    pub max_length: Option<u64>,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default)]
    pub items: Option<Box<Schema>>,
    /// Required property names, for object schemas.
    #[serde(default)]
    pub required: Vec<String>,
}

/// Translate a raw schema node. Absent or non-object input yields the
/// untyped default.
pub fn translate_schema(node: &Value) -> Schema {
    let Some(obj) = node.as_object() else {
        return Schema::default();
    };

    let mut schema = Schema {
        schema_type: schema_type_of(node),
        format: str_field(obj, "format"),
        description: str_field(obj, "description"),
        default: obj.get("default").cloned(),
        pattern: str_field(obj, "pattern"),
        ..Schema::default()
    };

    if let Some(values) = obj.get("enum").and_then(Value::as_array) {
        schema.enum_values = values.clone();
    }

    schema.minimum = obj.get("minimum").and_then(Value::as_f64);
    schema.maximum = obj.get("maximum").and_then(Value::as_f64);
    schema.min_length = obj.get("minLength").and_then(Value::as_u64);
    schema.max_length = obj.get("maxLength").and_then(Value::as_u64);

    if let Some(props) = obj.get("properties").and_then(Value::as_object) {
        for (name, prop) in props {
            schema
                .properties
                .insert(name.clone(), translate_schema(prop));
        }
    }

    if let Some(items) = obj.get("items") {
        if items.is_object() {
            schema.items = Some(Box::new(translate_schema(items)));
        }
    }

    if let Some(required) = obj.get("required").and_then(Value::as_array) {
        schema.required = required
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }

    schema
}

/// Resolve the `type` field. OpenAPI 3.1 allows an array of types
/// (e.g. `["integer", "null"]`); the first non-"null" entry wins.
fn schema_type_of(node: &Value) -> String {
    match node.get("type") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    }
}

fn str_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn translate_schema_full_node() {
        let node = json!({
            "type": "string",
            "format": "date-time",
            "description": "A timestamp",
            "default": "now",
            "enum": ["now", "later"],
            "minLength": 1,
            "maxLength": 32,
            "pattern": "^[a-z]+$"
        });

        let schema = translate_schema(&node);
        assert_eq!(schema.schema_type, "string");
        assert_eq!(schema.format, "date-time");
        assert_eq!(schema.description, "A timestamp");
        assert_eq!(schema.default, Some(json!("now")));
        assert_eq!(schema.enum_values, vec![json!("now"), json!("later")]);
        assert_eq!(schema.min_length, Some(1));
        assert_eq!(schema.max_length, Some(32));
        assert_eq!(schema.pattern, "^[a-z]+$");
    }

    #[test]
    fn translate_schema_numeric_bounds() {
        let node = json!({
            "type": "integer",
            "minimum": 1,
            "maximum": 100,
            "default": 10
        });

        let schema = translate_schema(&node);
        assert_eq!(schema.schema_type, "integer");
        assert_eq!(schema.minimum, Some(1.0));
        assert_eq!(schema.maximum, Some(100.0));
        assert_eq!(schema.default, Some(json!(10)));
    }

    #[test]
    fn translate_schema_object_with_properties_and_required() {
        let node = json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": { "type": "string" },
                "count": { "type": "integer" }
            }
        });

        let schema = translate_schema(&node);
        assert_eq!(schema.schema_type, "object");
        assert_eq!(schema.required, vec!["name".to_string()]);
        assert_eq!(schema.properties.len(), 2);
        assert_eq!(schema.properties["name"].schema_type, "string");
        assert_eq!(schema.properties["count"].schema_type, "integer");
    }

    #[test]
    fn translate_schema_array_items() {
        let node = json!({
            "type": "array",
            "items": { "type": "string" }
        });

        let schema = translate_schema(&node);
        assert_eq!(schema.schema_type, "array");
        assert_eq!(schema.items.unwrap().schema_type, "string");
    }

    #[test]
    fn translate_schema_nullable_type_array() {
        let node = json!({ "type": ["integer", "null"] });
        assert_eq!(translate_schema(&node).schema_type, "integer");
    }

    #[test]
    fn translate_schema_absent_is_untyped() {
        assert_eq!(translate_schema(&Value::Null), Schema::default());
        assert_eq!(translate_schema(&json!("string")), Schema::default());
    }

    #[test]
    fn translate_schema_ref_node_is_untyped() {
        let node = json!({ "$ref": "#/components/schemas/Pet" });
        let schema = translate_schema(&node);
        assert_eq!(schema.schema_type, "");
    }
}
