//! OpenAPI 3 document derivation.
//!
//! One POST path per RPC method; request and response schemas are drawn
//! from the resolved message schemas, with `nullable` from optional
//! presence and `required` from legacy-required presence.

use std::collections::BTreeSet;

use causeway_codec::{FieldSchema, FieldType, SchemaPool};
use serde_json::{json, Map, Value};

/// A method surfaced in the document.
pub struct OpenApiMethod {
    pub path: String,
    pub service: String,
    pub method: String,
    pub input: String,
    pub output: String,
}

pub fn build_document(
    title: &str,
    version: &str,
    pool_entries: &[(std::sync::Arc<SchemaPool>, Vec<OpenApiMethod>)],
) -> Value {
    let mut paths = Map::new();
    let mut schemas = Map::new();

    for (pool, methods) in pool_entries {
        for method in methods {
            let input_ref = component_name(&method.input);
            let output_ref = component_name(&method.output);
            collect_schema(pool, &method.input, &mut schemas);
            collect_schema(pool, &method.output, &mut schemas);
            paths.insert(
                method.path.clone(),
                json!({
                    "post": {
                        "tags": [method.service],
                        "operationId": format!("{}_{}", method.service, method.method),
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": format!("#/components/schemas/{input_ref}") }
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "Successful response",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": format!("#/components/schemas/{output_ref}") }
                                    }
                                }
                            },
                            "default": {
                                "description": "Error",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/connect.error" }
                                    }
                                }
                            }
                        }
                    }
                }),
            );
        }
    }

    schemas.insert(
        "connect.error".to_owned(),
        json!({
            "type": "object",
            "properties": {
                "code": { "type": "string" },
                "message": { "type": "string" },
                "details": { "type": "array", "items": { "type": "object" } }
            }
        }),
    );

    json!({
        "openapi": "3.0.3",
        "info": { "title": title, "version": version },
        "paths": paths,
        "components": { "schemas": schemas }
    })
}

fn component_name(type_name: &str) -> String {
    type_name.trim_start_matches('.').to_owned()
}

/// Walk a message and everything it references into component schemas.
fn collect_schema(pool: &SchemaPool, type_name: &str, out: &mut Map<String, Value>) {
    let mut pending: Vec<String> = vec![type_name.to_owned()];
    let mut seen: BTreeSet<String> = BTreeSet::new();

    while let Some(name) = pending.pop() {
        let key = component_name(&name);
        if !seen.insert(key.clone()) {
            continue;
        }
        if let Some(special) = well_known_schema(&key) {
            out.insert(key, special);
            continue;
        }
        let Some(message) = pool.message(&name) else {
            continue;
        };
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &message.fields {
            properties.insert(
                field.json_name.clone(),
                field_schema(field, &mut pending),
            );
            if field.required {
                required.push(json!(field.json_name));
            }
        }
        let mut schema = json!({ "type": "object", "properties": properties });
        if !required.is_empty() {
            schema["required"] = Value::Array(required);
        }
        out.insert(key, schema);
    }
}

fn field_schema(field: &FieldSchema, pending: &mut Vec<String>) -> Value {
    if let Some(map) = &field.map {
        return json!({
            "type": "object",
            "additionalProperties": type_schema(&map.value, pending),
        });
    }
    let mut schema = if field.repeated {
        json!({ "type": "array", "items": type_schema(&field.ty, pending) })
    } else {
        type_schema(&field.ty, pending)
    };
    if field.optional && schema.is_object() && schema.get("$ref").is_none() {
        schema["nullable"] = json!(true);
    }
    schema
}

fn type_schema(ty: &FieldType, pending: &mut Vec<String>) -> Value {
    match ty {
        FieldType::Bool => json!({ "type": "boolean" }),
        FieldType::Int32 => json!({ "type": "integer", "format": "int32" }),
        FieldType::UInt32 => json!({ "type": "integer", "format": "int64", "minimum": 0 }),
        FieldType::Int64 => json!({ "type": "string", "format": "int64" }),
        FieldType::UInt64 => json!({ "type": "string", "format": "uint64" }),
        FieldType::Float => json!({ "type": "number", "format": "float" }),
        FieldType::Double => json!({ "type": "number", "format": "double" }),
        FieldType::String => json!({ "type": "string" }),
        FieldType::Bytes => json!({ "type": "string", "format": "byte" }),
        FieldType::Enum(_) => json!({ "type": "string" }),
        FieldType::Message(name) => {
            pending.push(name.clone());
            json!({ "$ref": format!("#/components/schemas/{}", component_name(name)) })
        }
    }
}

fn well_known_schema(name: &str) -> Option<Value> {
    Some(match name {
        "google.protobuf.Timestamp" => json!({ "type": "string", "format": "date-time" }),
        "google.protobuf.Duration" => json!({ "type": "string", "example": "1.5s" }),
        "google.protobuf.Empty" => json!({ "type": "object" }),
        "google.protobuf.Struct" => json!({ "type": "object", "additionalProperties": true }),
        "google.protobuf.Value" => json!({}),
        "google.protobuf.ListValue" => json!({ "type": "array", "items": {} }),
        "google.protobuf.FieldMask" => {
            json!({ "type": "array", "items": { "type": "string" } })
        }
        "google.protobuf.Any" => json!({
            "type": "object",
            "properties": {
                "@type": { "type": "string" },
                "value": { "type": "string", "format": "byte" }
            }
        }),
        _ => return None,
    })
}
