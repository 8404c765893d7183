//! Canonical Protobuf-JSON codec driven by resolved schemas.
//!
//! Field names are emitted in lowerCamel JSON form; decoding accepts the
//! original proto name as well. 64-bit integers travel as strings, bytes as
//! standard base64, and the well-known types use their canonical JSON
//! representations. Unknown object members are tolerated by default.

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use causeway::record::MapKeyKind;
use causeway::value::{MapKey, Value};
use serde_json::{json, Map as JsonMap};

use crate::error::CodecError;
use crate::schema_pool::{FieldSchema, FieldType, MessageSchema, SchemaPool};

/// Encode a dynamic message value as canonical JSON bytes.
pub fn encode(pool: &SchemaPool, message: &str, value: &Value) -> Result<Vec<u8>, CodecError> {
    let json = message_to_json(pool, message, value)?;
    serde_json::to_vec(&json).map_err(CodecError::encode)
}

/// Decode JSON bytes into the dynamic message form.
pub fn decode(pool: &SchemaPool, message: &str, data: &[u8]) -> Result<Value, CodecError> {
    let json: serde_json::Value = serde_json::from_slice(data).map_err(CodecError::decode)?;
    json_to_message(pool, message, json)
}

fn schema<'a>(
    pool: &'a SchemaPool,
    message: &str,
) -> Result<&'a std::sync::Arc<MessageSchema>, CodecError> {
    pool.message(message)
        .ok_or_else(|| CodecError::UnknownType(message.to_owned()))
}

pub(crate) fn message_to_json(
    pool: &SchemaPool,
    message: &str,
    value: &Value,
) -> Result<serde_json::Value, CodecError> {
    if let Some(special) = well_known_to_json(pool, message, value)? {
        return Ok(special);
    }
    let schema = schema(pool, message)?;
    let fields = match value {
        Value::Message(fields) => fields,
        Value::Unset => return Ok(serde_json::Value::Object(JsonMap::new())),
        other => {
            return Err(CodecError::encode(format!(
                "expected message for {message}, got {}",
                other.shape()
            )))
        }
    };

    let mut out = JsonMap::new();
    for field in &schema.fields {
        let field_value = match field.oneof {
            Some(group) => fields
                .get(&schema.oneofs[group].name)
                .and_then(Value::as_message)
                .and_then(|group_fields| group_fields.get(&field.name)),
            None => fields.get(&field.name),
        };
        let Some(field_value) = field_value else {
            continue;
        };
        if field_value.is_unset() {
            continue;
        }
        if !field.explicit_presence && field.oneof.is_none() && field_value.is_default() {
            continue;
        }
        out.insert(
            field.json_name.clone(),
            field_to_json(pool, field, field_value)?,
        );
    }
    Ok(serde_json::Value::Object(out))
}

fn field_to_json(
    pool: &SchemaPool,
    field: &FieldSchema,
    value: &Value,
) -> Result<serde_json::Value, CodecError> {
    if let Some(map) = &field.map {
        let Value::Map(entries) = value else {
            return Err(CodecError::encode(format!(
                "expected map for {}, got {}",
                field.name,
                value.shape()
            )));
        };
        let mut out = JsonMap::new();
        for (key, entry) in entries {
            out.insert(map_key_to_string(key), single_to_json(pool, &map.value, entry)?);
        }
        return Ok(serde_json::Value::Object(out));
    }
    if field.repeated {
        let Value::List(items) = value else {
            return Err(CodecError::encode(format!(
                "expected list for {}, got {}",
                field.name,
                value.shape()
            )));
        };
        let rendered: Result<Vec<_>, _> = items
            .iter()
            .map(|item| single_to_json(pool, &field.ty, item))
            .collect();
        return Ok(serde_json::Value::Array(rendered?));
    }
    single_to_json(pool, &field.ty, value)
}

fn single_to_json(
    pool: &SchemaPool,
    ty: &FieldType,
    value: &Value,
) -> Result<serde_json::Value, CodecError> {
    Ok(match (ty, value) {
        (FieldType::Bool, Value::Bool(b)) => json!(b),
        (FieldType::Int32, Value::Int(n)) => json!(*n as i32),
        (FieldType::Int32, Value::UInt(n)) => json!(*n as i32),
        (FieldType::Int64, Value::Int(n)) => json!(n.to_string()),
        (FieldType::Int64, Value::UInt(n)) => json!(n.to_string()),
        (FieldType::UInt32, Value::UInt(n)) => json!(*n as u32),
        (FieldType::UInt32, Value::Int(n)) => json!(*n as u32),
        (FieldType::UInt64, Value::UInt(n)) => json!(n.to_string()),
        (FieldType::UInt64, Value::Int(n)) => json!(n.to_string()),
        (FieldType::Float | FieldType::Double, Value::Double(n)) => float_to_json(*n),
        (FieldType::Float | FieldType::Double, Value::Int(n)) => json!(*n as f64),
        (FieldType::String, Value::String(s)) => json!(s),
        (FieldType::Bytes, Value::Bytes(b)) => json!(BASE64_STANDARD.encode(b)),
        (FieldType::Enum(name), Value::Int(n)) => {
            match pool.enum_schema(name).and_then(|e| {
                e.name_of(*n as i32).map(|s| json!(s))
            }) {
                Some(rendered) => rendered,
                // Open enums keep unknown numbers numeric.
                None => json!(*n as i32),
            }
        }
        (FieldType::Message(name), value) => message_to_json(pool, name, value)?,
        (ty, value) => {
            return Err(CodecError::encode(format!(
                "cannot render {} as {ty:?}",
                value.shape()
            )))
        }
    })
}

fn float_to_json(n: f64) -> serde_json::Value {
    if n.is_nan() {
        json!("NaN")
    } else if n.is_infinite() {
        json!(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        json!(n)
    }
}

fn map_key_to_string(key: &MapKey) -> String {
    match key {
        MapKey::Bool(b) => b.to_string(),
        MapKey::Int(n) => n.to_string(),
        MapKey::UInt(n) => n.to_string(),
        MapKey::String(s) => s.clone(),
    }
}

/// Canonical JSON for the well-known types, keyed by descriptor type name.
fn well_known_to_json(
    pool: &SchemaPool,
    message: &str,
    value: &Value,
) -> Result<Option<serde_json::Value>, CodecError> {
    let name = message.trim_start_matches('.');
    Ok(match name {
        "google.protobuf.Timestamp" => {
            let (seconds, nanos) = seconds_nanos(value)?;
            let ts = prost_types::Timestamp { seconds, nanos };
            Some(json!(ts.to_string()))
        }
        "google.protobuf.Duration" => {
            let (seconds, nanos) = seconds_nanos(value)?;
            let d = prost_types::Duration { seconds, nanos };
            Some(json!(d.to_string()))
        }
        "google.protobuf.Empty" => Some(json!({})),
        "google.protobuf.Struct" => match value {
            Value::Json(serde_json::Value::Object(map)) => {
                Some(serde_json::Value::Object(map.clone()))
            }
            Value::Json(other) => {
                return Err(CodecError::encode(format!(
                    "Struct payload must be a JSON object, got {other}"
                )))
            }
            Value::Unset => Some(json!({})),
            _ => None,
        },
        "google.protobuf.Value" => match value {
            Value::Json(v) => Some(v.clone()),
            Value::Unset => Some(serde_json::Value::Null),
            _ => None,
        },
        "google.protobuf.ListValue" => match value {
            Value::Json(serde_json::Value::Array(items)) => {
                Some(serde_json::Value::Array(items.clone()))
            }
            Value::Unset => Some(json!([])),
            _ => None,
        },
        // The canonical form is a `paths` array.
        "google.protobuf.FieldMask" => match value {
            Value::Message(fields) => {
                let paths = match fields.get("paths") {
                    Some(Value::List(items)) => items
                        .iter()
                        .map(|p| match p {
                            Value::String(s) => Ok(json!(s)),
                            other => Err(CodecError::encode(format!(
                                "field mask path must be a string, got {}",
                                other.shape()
                            ))),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => Vec::new(),
                };
                Some(serde_json::Value::Array(paths))
            }
            Value::Unset => Some(json!([])),
            _ => None,
        },
        "google.protobuf.Any" => match value {
            Value::Message(fields) => {
                let type_url = match fields.get("type_url") {
                    Some(Value::String(s)) => s.clone(),
                    _ => String::new(),
                };
                let payload = match fields.get("value") {
                    Some(Value::Bytes(b)) => BASE64_STANDARD.encode(b),
                    _ => String::new(),
                };
                Some(json!({ "@type": type_url, "value": payload }))
            }
            Value::Unset => Some(json!({})),
            _ => None,
        },
        _ => {
            let _ = pool;
            None
        }
    })
}

fn seconds_nanos(value: &Value) -> Result<(i64, i32), CodecError> {
    match value {
        Value::Message(fields) => {
            let seconds = match fields.get("seconds") {
                Some(Value::Int(n)) => *n,
                Some(Value::UInt(n)) => *n as i64,
                _ => 0,
            };
            let nanos = match fields.get("nanos") {
                Some(Value::Int(n)) => *n as i32,
                Some(Value::UInt(n)) => *n as i32,
                _ => 0,
            };
            Ok((seconds, nanos))
        }
        Value::Unset => Ok((0, 0)),
        other => Err(CodecError::encode(format!(
            "expected seconds/nanos message, got {}",
            other.shape()
        ))),
    }
}

pub(crate) fn json_to_message(
    pool: &SchemaPool,
    message: &str,
    json: serde_json::Value,
) -> Result<Value, CodecError> {
    if let Some(special) = json_to_well_known(message, &json)? {
        return Ok(special);
    }
    let schema = schema(pool, message)?;
    let object = match json {
        serde_json::Value::Object(object) => object,
        serde_json::Value::Null => return Ok(Value::Unset),
        other => {
            return Err(CodecError::decode(format!(
                "expected JSON object for {message}, got {other}"
            )))
        }
    };

    let mut fields: BTreeMap<String, Value> = BTreeMap::new();
    for (key, member) in object {
        let Some(index) = schema.field_by_json_key(&key) else {
            // Unknown members are tolerated.
            continue;
        };
        let field = &schema.fields[index];
        if member.is_null() && !matches!(field.ty, FieldType::Message(ref m) if is_json_value(m)) {
            continue;
        }
        let decoded = json_to_field(pool, field, member)?;
        match field.oneof {
            Some(group) => {
                let group_name = schema.oneofs[group].name.clone();
                let entry = fields
                    .entry(group_name)
                    .or_insert_with(|| Value::Message(BTreeMap::new()));
                if let Value::Message(group_fields) = entry {
                    group_fields.insert(field.name.clone(), decoded);
                }
            }
            None => {
                fields.insert(field.name.clone(), decoded);
            }
        }
    }
    Ok(Value::Message(fields))
}

fn is_json_value(message: &str) -> bool {
    message.trim_start_matches('.') == "google.protobuf.Value"
}

fn json_to_field(
    pool: &SchemaPool,
    field: &FieldSchema,
    json: serde_json::Value,
) -> Result<Value, CodecError> {
    if let Some(map) = &field.map {
        let serde_json::Value::Object(object) = json else {
            return Err(CodecError::decode(format!(
                "expected JSON object for map field {}",
                field.name
            )));
        };
        let mut entries = BTreeMap::new();
        for (key, member) in object {
            entries.insert(
                parse_map_key(map.key, &key)?,
                json_to_single(pool, &map.value, member)?,
            );
        }
        return Ok(Value::Map(entries));
    }
    if field.repeated {
        let serde_json::Value::Array(items) = json else {
            return Err(CodecError::decode(format!(
                "expected JSON array for repeated field {}",
                field.name
            )));
        };
        let decoded: Result<Vec<_>, _> = items
            .into_iter()
            .map(|item| json_to_single(pool, &field.ty, item))
            .collect();
        return Ok(Value::List(decoded?));
    }
    json_to_single(pool, &field.ty, json)
}

fn json_to_single(
    pool: &SchemaPool,
    ty: &FieldType,
    json: serde_json::Value,
) -> Result<Value, CodecError> {
    Ok(match ty {
        FieldType::Bool => match json {
            serde_json::Value::Bool(b) => Value::Bool(b),
            other => return Err(type_mismatch("bool", &other)),
        },
        FieldType::Int32 | FieldType::Int64 => Value::Int(parse_i64(&json)?),
        FieldType::UInt32 | FieldType::UInt64 => Value::UInt(parse_u64(&json)?),
        FieldType::Float | FieldType::Double => Value::Double(parse_f64(&json)?),
        FieldType::String => match json {
            serde_json::Value::String(s) => Value::String(s),
            other => return Err(type_mismatch("string", &other)),
        },
        FieldType::Bytes => match json {
            serde_json::Value::String(s) => Value::Bytes(
                BASE64_STANDARD
                    .decode(s.as_bytes())
                    .map_err(CodecError::decode)?,
            ),
            other => return Err(type_mismatch("base64 string", &other)),
        },
        FieldType::Enum(name) => match json {
            serde_json::Value::String(s) => {
                let schema = pool
                    .enum_schema(name)
                    .ok_or_else(|| CodecError::UnknownType(name.clone()))?;
                let number = schema.number_of(&s).ok_or_else(|| {
                    CodecError::decode(format!("unknown value {s:?} for enum {name}"))
                })?;
                Value::Int(number as i64)
            }
            serde_json::Value::Number(_) => Value::Int(parse_i64(&json)?),
            other => return Err(type_mismatch("enum", &other)),
        },
        FieldType::Message(name) => json_to_message(pool, name, json)?,
    })
}

fn json_to_well_known(
    message: &str,
    json: &serde_json::Value,
) -> Result<Option<Value>, CodecError> {
    let name = message.trim_start_matches('.');
    Ok(match name {
        "google.protobuf.Timestamp" => {
            let serde_json::Value::String(text) = json else {
                return Err(CodecError::decode("Timestamp must be an RFC 3339 string"));
            };
            let ts = prost_types::Timestamp::from_str(text).map_err(CodecError::decode)?;
            Some(Value::message([
                ("seconds", Value::Int(ts.seconds)),
                ("nanos", Value::Int(ts.nanos.into())),
            ]))
        }
        "google.protobuf.Duration" => {
            let serde_json::Value::String(text) = json else {
                return Err(CodecError::decode("Duration must be a seconds string"));
            };
            let d = prost_types::Duration::from_str(text).map_err(CodecError::decode)?;
            Some(Value::message([
                ("seconds", Value::Int(d.seconds)),
                ("nanos", Value::Int(d.nanos.into())),
            ]))
        }
        "google.protobuf.Empty" => Some(Value::Message(BTreeMap::new())),
        "google.protobuf.Struct" => match json {
            serde_json::Value::Object(_) => Some(Value::Json(json.clone())),
            other => {
                return Err(CodecError::decode(format!(
                    "Struct must be a JSON object, got {other}"
                )))
            }
        },
        "google.protobuf.Value" => Some(Value::Json(json.clone())),
        "google.protobuf.ListValue" => match json {
            serde_json::Value::Array(_) => Some(Value::Json(json.clone())),
            other => {
                return Err(CodecError::decode(format!(
                    "ListValue must be a JSON array, got {other}"
                )))
            }
        },
        "google.protobuf.FieldMask" => {
            let paths = match json {
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|p| match p {
                        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
                        other => Err(CodecError::decode(format!(
                            "field mask path must be a string, got {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                // Lenient: also accept the comma-joined string form.
                serde_json::Value::String(joined) => joined
                    .split(',')
                    .filter(|p| !p.is_empty())
                    .map(|p| Ok(Value::String(p.trim().to_owned())))
                    .collect::<Result<Vec<_>, CodecError>>()?,
                other => {
                    return Err(CodecError::decode(format!(
                        "FieldMask must be an array of paths, got {other}"
                    )))
                }
            };
            Some(Value::message([("paths", Value::List(paths))]))
        }
        "google.protobuf.Any" => {
            let serde_json::Value::Object(object) = json else {
                return Err(CodecError::decode("Any must be a JSON object"));
            };
            let type_url = object
                .get("@type")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_owned();
            let value = match object.get("value").and_then(|v| v.as_str()) {
                Some(encoded) => BASE64_STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(CodecError::decode)?,
                None => Vec::new(),
            };
            Some(Value::message([
                ("type_url", Value::String(type_url)),
                ("value", Value::Bytes(value)),
            ]))
        }
        _ => None,
    })
}

/// JSON object keys for map fields arrive as strings regardless of the
/// declared key type.
fn parse_map_key(kind: MapKeyKind, key: &str) -> Result<MapKey, CodecError> {
    let bad = |kind: &str| CodecError::decode(format!("map key {key:?} is not a valid {kind}"));
    Ok(match kind {
        MapKeyKind::Bool => match key {
            "true" => MapKey::Bool(true),
            "false" => MapKey::Bool(false),
            _ => return Err(bad("bool")),
        },
        MapKeyKind::Int32 | MapKeyKind::Int64 => {
            MapKey::Int(key.parse::<i64>().map_err(|_| bad("integer"))?)
        }
        MapKeyKind::UInt32 | MapKeyKind::UInt64 => {
            MapKey::UInt(key.parse::<u64>().map_err(|_| bad("unsigned integer"))?)
        }
        MapKeyKind::String => MapKey::String(key.to_owned()),
    })
}

fn type_mismatch(expected: &str, got: &serde_json::Value) -> CodecError {
    CodecError::decode(format!("expected {expected}, got {got}"))
}

fn parse_i64(json: &serde_json::Value) -> Result<i64, CodecError> {
    match json {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| type_mismatch("integer", json)),
        serde_json::Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| type_mismatch("integer string", json)),
        other => Err(type_mismatch("integer", other)),
    }
}

fn parse_u64(json: &serde_json::Value) -> Result<u64, CodecError> {
    match json {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| type_mismatch("unsigned integer", json)),
        serde_json::Value::String(s) => s
            .parse::<u64>()
            .map_err(|_| type_mismatch("unsigned integer string", json)),
        other => Err(type_mismatch("unsigned integer", other)),
    }
}

fn parse_f64(json: &serde_json::Value) -> Result<f64, CodecError> {
    match json {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| type_mismatch("number", json)),
        serde_json::Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => other
                .parse::<f64>()
                .map_err(|_| CodecError::decode(format!("expected number, got {other:?}"))),
        },
        other => Err(type_mismatch("number", other)),
    }
}
