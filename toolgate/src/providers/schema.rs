//! Translation of child-declared input schemas into the host representation.
//!
//! Child providers declare their tool inputs as JSON-Schema-ish objects. The
//! translation here is a pure function: object-typed schemas map field by
//! field into [`ParamType`], preserving required-ness and nesting; anything
//! unrecognized degrades to `Any`; an empty or non-object schema surfaces as
//! a tool taking no arguments. The host renders the result back to the JSON
//! schema advertised by `tools/list`.

use serde_json::{json, Map, Value};

/// Host-side parameter type.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Null,
    Array(Box<ParamType>),
    Object(Vec<ParamField>),
    Union(Vec<ParamType>),
    Any,
}

/// One named field of an object type.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamField {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub description: Option<String>,
}

/// Translate a child tool's declared input schema.
///
/// Total: every input produces a usable type. Non-object or empty schemas
/// become an object with no fields.
pub fn translate_input_schema(schema: &Value) -> ParamType {
    match translate_type(schema) {
        ParamType::Object(fields) => ParamType::Object(fields),
        _ => ParamType::Object(Vec::new()),
    }
}

/// Translate any JSON-Schema-ish node.
pub fn translate_type(schema: &Value) -> ParamType {
    let Some(obj) = schema.as_object() else {
        return ParamType::Any;
    };

    // Union spellings first: "anyOf"/"oneOf", or a type array.
    for key in ["anyOf", "oneOf"] {
        if let Some(variants) = obj.get(key).and_then(|v| v.as_array()) {
            let types: Vec<ParamType> = variants.iter().map(translate_type).collect();
            if !types.is_empty() {
                return ParamType::Union(types);
            }
        }
    }

    match obj.get("type") {
        Some(Value::String(ty)) => match ty.as_str() {
            "string" => ParamType::String,
            "number" => ParamType::Number,
            "integer" => ParamType::Integer,
            "boolean" => ParamType::Boolean,
            "null" => ParamType::Null,
            "array" => {
                let item = obj.get("items").map(translate_type).unwrap_or(ParamType::Any);
                ParamType::Array(Box::new(item))
            }
            "object" => ParamType::Object(translate_fields(obj)),
            _ => ParamType::Any,
        },
        Some(Value::Array(types)) => {
            let variants: Vec<ParamType> = types
                .iter()
                .map(|t| translate_type(&json!({ "type": t })))
                .collect();
            if variants.is_empty() {
                ParamType::Any
            } else {
                ParamType::Union(variants)
            }
        }
        _ => ParamType::Any,
    }
}

fn translate_fields(obj: &Map<String, Value>) -> Vec<ParamField> {
    let required: Vec<&str> = obj
        .get("required")
        .and_then(|v| v.as_array())
        .map(|list| list.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    let Some(properties) = obj.get("properties").and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let mut fields: Vec<ParamField> = properties
        .iter()
        .map(|(name, prop)| ParamField {
            name: name.clone(),
            ty: translate_type(prop),
            required: required.contains(&name.as_str()),
            description: prop
                .get("description")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
        .collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));
    fields
}

/// Render a host type back to the JSON schema form advertised by
/// `tools/list`.
pub fn render_json_schema(ty: &ParamType) -> Value {
    match ty {
        ParamType::String => json!({ "type": "string" }),
        ParamType::Number => json!({ "type": "number" }),
        ParamType::Integer => json!({ "type": "integer" }),
        ParamType::Boolean => json!({ "type": "boolean" }),
        ParamType::Null => json!({ "type": "null" }),
        ParamType::Any => json!({}),
        ParamType::Array(item) => json!({
            "type": "array",
            "items": render_json_schema(item)
        }),
        ParamType::Union(variants) => json!({
            "anyOf": variants.iter().map(render_json_schema).collect::<Vec<_>>()
        }),
        ParamType::Object(fields) => {
            let mut properties = Map::new();
            let mut required: Vec<Value> = Vec::new();
            for field in fields {
                let mut prop = render_json_schema(&field.ty);
                if let (Some(desc), Some(obj)) = (&field.description, prop.as_object_mut()) {
                    obj.insert("description".to_string(), json!(desc));
                }
                properties.insert(field.name.clone(), prop);
                if field.required {
                    required.push(json!(field.name));
                }
            }
            let mut schema = json!({
                "type": "object",
                "properties": properties
            });
            if !required.is_empty() {
                schema["required"] = Value::Array(required);
            }
            schema
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives() {
        assert_eq!(translate_type(&json!({"type": "string"})), ParamType::String);
        assert_eq!(translate_type(&json!({"type": "number"})), ParamType::Number);
        assert_eq!(translate_type(&json!({"type": "integer"})), ParamType::Integer);
        assert_eq!(translate_type(&json!({"type": "boolean"})), ParamType::Boolean);
        assert_eq!(translate_type(&json!({"type": "null"})), ParamType::Null);
    }

    #[test]
    fn test_array_of_strings() {
        let ty = translate_type(&json!({"type": "array", "items": {"type": "string"}}));
        assert_eq!(ty, ParamType::Array(Box::new(ParamType::String)));
    }

    #[test]
    fn test_array_without_items() {
        let ty = translate_type(&json!({"type": "array"}));
        assert_eq!(ty, ParamType::Array(Box::new(ParamType::Any)));
    }

    #[test]
    fn test_object_fields_and_required() {
        let ty = translate_input_schema(&json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "limit": { "type": "integer" }
            },
            "required": ["query"]
        }));

        let ParamType::Object(fields) = ty else {
            panic!("expected object");
        };
        assert_eq!(fields.len(), 2);
        let limit = &fields[0];
        let query = &fields[1];
        assert_eq!(limit.name, "limit");
        assert!(!limit.required);
        assert_eq!(query.name, "query");
        assert!(query.required);
        assert_eq!(query.ty, ParamType::String);
        assert_eq!(query.description.as_deref(), Some("Search query"));
    }

    #[test]
    fn test_nested_objects() {
        let ty = translate_type(&json!({
            "type": "object",
            "properties": {
                "filter": {
                    "type": "object",
                    "properties": { "tag": { "type": "string" } },
                    "required": ["tag"]
                }
            }
        }));
        let ParamType::Object(fields) = ty else {
            panic!("expected object");
        };
        let ParamType::Object(inner) = &fields[0].ty else {
            panic!("expected nested object");
        };
        assert_eq!(inner[0].name, "tag");
        assert!(inner[0].required);
    }

    #[test]
    fn test_union_spellings() {
        let any_of = translate_type(&json!({
            "anyOf": [{ "type": "string" }, { "type": "null" }]
        }));
        assert_eq!(
            any_of,
            ParamType::Union(vec![ParamType::String, ParamType::Null])
        );

        let type_array = translate_type(&json!({ "type": ["string", "integer"] }));
        assert_eq!(
            type_array,
            ParamType::Union(vec![ParamType::String, ParamType::Integer])
        );
    }

    #[test]
    fn test_unknown_degrades_to_any() {
        assert_eq!(translate_type(&json!({"type": "tuple"})), ParamType::Any);
        assert_eq!(translate_type(&json!("string")), ParamType::Any);
        assert_eq!(translate_type(&json!({"$ref": "#/defs/x"})), ParamType::Any);
    }

    #[test]
    fn test_non_object_input_schema_takes_no_arguments() {
        assert_eq!(translate_input_schema(&json!(null)), ParamType::Object(vec![]));
        assert_eq!(
            translate_input_schema(&json!({"type": "string"})),
            ParamType::Object(vec![])
        );
        assert_eq!(translate_input_schema(&json!({})), ParamType::Object(vec![]));
    }

    #[test]
    fn test_render_roundtrip_preserves_required() {
        let source = json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["name"]
        });
        let rendered = render_json_schema(&translate_input_schema(&source));
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["properties"]["name"]["type"], "string");
        assert_eq!(rendered["properties"]["tags"]["items"]["type"], "string");
        assert_eq!(rendered["required"], json!(["name"]));
    }

    #[test]
    fn test_render_empty_object() {
        let rendered = render_json_schema(&ParamType::Object(vec![]));
        assert_eq!(rendered["type"], "object");
        assert!(rendered["properties"].as_object().unwrap().is_empty());
        assert!(rendered.get("required").is_none());
    }
}
