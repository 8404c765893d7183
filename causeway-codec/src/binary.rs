//! Protobuf binary wire codec driven by resolved schemas.
//!
//! Encoding and decoding are built on `prost::encoding` primitives; maps
//! travel as repeated map entries, repeated scalars are packed or expanded
//! per the effective features, and unknown tags are skipped on decode.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut, Bytes};
use causeway::record::MapKeyKind;
use causeway::value::{MapKey, Value};
use prost::encoding::{
    decode_key, decode_varint, encode_key, encode_varint, skip_field, DecodeContext, WireType,
};

use crate::error::CodecError;
use crate::schema_pool::{FieldSchema, FieldType, MessageSchema, SchemaPool};

/// Encode a dynamic message value into the binary wire form.
pub fn encode(pool: &SchemaPool, message: &str, value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    encode_message(pool, message, value, &mut buf)?;
    Ok(buf)
}

/// Decode binary wire bytes into the dynamic message form.
pub fn decode(pool: &SchemaPool, message: &str, data: &[u8]) -> Result<Value, CodecError> {
    let mut buf = Bytes::copy_from_slice(data);
    decode_message(pool, message, &mut buf)
}

fn schema<'a>(
    pool: &'a SchemaPool,
    message: &str,
) -> Result<&'a std::sync::Arc<MessageSchema>, CodecError> {
    pool.message(message)
        .ok_or_else(|| CodecError::UnknownType(message.to_owned()))
}

fn encode_message(
    pool: &SchemaPool,
    message: &str,
    value: &Value,
    buf: &mut Vec<u8>,
) -> Result<(), CodecError> {
    if let Value::Json(json) = value {
        return encode_json_well_known(message, json, buf);
    }
    let schema = schema(pool, message)?;
    let fields = match value {
        Value::Message(fields) => fields,
        Value::Unset => return Ok(()),
        other => {
            return Err(CodecError::encode(format!(
                "expected message for {message}, got {}",
                other.shape()
            )))
        }
    };

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
        encode_field(pool, field, field_value, buf)?;
    }
    Ok(())
}

fn encode_field(
    pool: &SchemaPool,
    field: &FieldSchema,
    value: &Value,
    buf: &mut Vec<u8>,
) -> Result<(), CodecError> {
    if let Some(map) = &field.map {
        let Value::Map(entries) = value else {
            return Err(CodecError::encode(format!(
                "expected map for {}, got {}",
                field.name,
                value.shape()
            )));
        };
        for (key, entry_value) in entries {
            let mut entry = Vec::new();
            encode_map_key(map.key, key, &mut entry)?;
            encode_single(pool, &map.value, 2, entry_value, &mut entry)?;
            encode_key(field.number, WireType::LengthDelimited, buf);
            encode_varint(entry.len() as u64, buf);
            buf.extend_from_slice(&entry);
        }
        return Ok(());
    }

    if field.repeated {
        let Value::List(items) = value else {
            return Err(CodecError::encode(format!(
                "expected list for {}, got {}",
                field.name,
                value.shape()
            )));
        };
        if field.packed {
            if items.is_empty() {
                return Ok(());
            }
            let mut packed = Vec::new();
            for item in items {
                encode_scalar_raw(&field.ty, item, &mut packed)?;
            }
            encode_key(field.number, WireType::LengthDelimited, buf);
            encode_varint(packed.len() as u64, buf);
            buf.extend_from_slice(&packed);
        } else {
            for item in items {
                encode_single(pool, &field.ty, field.number, item, buf)?;
            }
        }
        return Ok(());
    }

    encode_single(pool, &field.ty, field.number, value, buf)
}

fn encode_single(
    pool: &SchemaPool,
    ty: &FieldType,
    number: u32,
    value: &Value,
    buf: &mut Vec<u8>,
) -> Result<(), CodecError> {
    match ty {
        FieldType::Message(name) => {
            let mut nested = Vec::new();
            encode_message(pool, name, value, &mut nested)?;
            encode_key(number, WireType::LengthDelimited, buf);
            encode_varint(nested.len() as u64, buf);
            buf.extend_from_slice(&nested);
        }
        FieldType::String => {
            let Value::String(s) = value else {
                return Err(encode_mismatch("string", value));
            };
            encode_key(number, WireType::LengthDelimited, buf);
            encode_varint(s.len() as u64, buf);
            buf.extend_from_slice(s.as_bytes());
        }
        FieldType::Bytes => {
            let Value::Bytes(b) = value else {
                return Err(encode_mismatch("bytes", value));
            };
            encode_key(number, WireType::LengthDelimited, buf);
            encode_varint(b.len() as u64, buf);
            buf.extend_from_slice(b);
        }
        FieldType::Float => {
            encode_key(number, WireType::ThirtyTwoBit, buf);
            buf.put_f32_le(as_f64(value)? as f32);
        }
        FieldType::Double => {
            encode_key(number, WireType::SixtyFourBit, buf);
            buf.put_f64_le(as_f64(value)?);
        }
        _ => {
            encode_key(number, WireType::Varint, buf);
            encode_scalar_raw(ty, value, buf)?;
        }
    }
    Ok(())
}

/// Encode a scalar without its key, as used inside packed runs.
fn encode_scalar_raw(ty: &FieldType, value: &Value, buf: &mut Vec<u8>) -> Result<(), CodecError> {
    match ty {
        FieldType::Bool => {
            let Value::Bool(b) = value else {
                return Err(encode_mismatch("bool", value));
            };
            encode_varint(u64::from(*b), buf);
        }
        FieldType::Int32 | FieldType::Int64 | FieldType::Enum(_) => {
            // Negative numbers sign-extend to ten bytes, per the wire spec.
            encode_varint(as_i64(value)? as u64, buf);
        }
        FieldType::UInt32 | FieldType::UInt64 => {
            encode_varint(as_u64(value)?, buf);
        }
        FieldType::Float => {
            buf.put_f32_le(as_f64(value)? as f32);
        }
        FieldType::Double => {
            buf.put_f64_le(as_f64(value)?);
        }
        other => {
            return Err(CodecError::encode(format!(
                "{other:?} cannot be packed"
            )))
        }
    }
    Ok(())
}

fn encode_mismatch(expected: &str, value: &Value) -> CodecError {
    CodecError::encode(format!("expected {expected}, got {}", value.shape()))
}

fn as_i64(value: &Value) -> Result<i64, CodecError> {
    match value {
        Value::Int(n) => Ok(*n),
        _ => Err(encode_mismatch("int", value)),
    }
}

fn as_u64(value: &Value) -> Result<u64, CodecError> {
    match value {
        Value::UInt(n) => Ok(*n),
        _ => Err(encode_mismatch("uint", value)),
    }
}

fn as_f64(value: &Value) -> Result<f64, CodecError> {
    match value {
        Value::Double(n) => Ok(*n),
        _ => Err(encode_mismatch("double", value)),
    }
}

fn encode_map_key(kind: MapKeyKind, key: &MapKey, buf: &mut Vec<u8>) -> Result<(), CodecError> {
    match (kind, key) {
        (MapKeyKind::Bool, MapKey::Bool(b)) => {
            encode_key(1, WireType::Varint, buf);
            encode_varint(u64::from(*b), buf);
        }
        (MapKeyKind::Int32 | MapKeyKind::Int64, MapKey::Int(n)) => {
            encode_key(1, WireType::Varint, buf);
            encode_varint(*n as u64, buf);
        }
        (MapKeyKind::UInt32 | MapKeyKind::UInt64, MapKey::UInt(n)) => {
            encode_key(1, WireType::Varint, buf);
            encode_varint(*n, buf);
        }
        (MapKeyKind::String, MapKey::String(s)) => {
            encode_key(1, WireType::LengthDelimited, buf);
            encode_varint(s.len() as u64, buf);
            buf.extend_from_slice(s.as_bytes());
        }
        (kind, key) => {
            return Err(CodecError::encode(format!(
                "map key {key:?} does not match declared kind {kind:?}"
            )))
        }
    }
    Ok(())
}

fn decode_message(
    pool: &SchemaPool,
    message: &str,
    buf: &mut Bytes,
) -> Result<Value, CodecError> {
    if let Some(json) = decode_json_well_known_entry(message, buf)? {
        return Ok(json);
    }
    let schema = schema(pool, message)?;
    let mut fields: BTreeMap<String, Value> = BTreeMap::new();

    while buf.has_remaining() {
        let (tag, wire_type) = decode_key(buf).map_err(CodecError::decode)?;
        let Some(field) = schema.field_by_number(tag) else {
            skip_field(wire_type, tag, buf, DecodeContext::default())
                .map_err(CodecError::decode)?;
            continue;
        };
        // field_by_number returns a borrow of schema; clone the slot info we
        // need so the fields map can be updated.
        let field = field.clone();
        let decoded = decode_field(pool, &field, wire_type, buf)?;

        let slot_name = field.name.clone();
        let target = match field.oneof {
            Some(group) => {
                let group_name = schema.oneofs[group].name.clone();
                let entry = fields
                    .entry(group_name)
                    .or_insert_with(|| Value::Message(BTreeMap::new()));
                match entry {
                    Value::Message(group_fields) => group_fields,
                    _ => unreachable!("oneof slot is always a message"),
                }
            }
            None => &mut fields,
        };

        match decoded {
            Decoded::Single(value) => {
                target.insert(slot_name, value);
            }
            Decoded::Repeated(mut items) => {
                match target.get_mut(&slot_name) {
                    Some(Value::List(existing)) => existing.append(&mut items),
                    _ => {
                        target.insert(slot_name, Value::List(items));
                    }
                }
            }
            Decoded::MapEntry(key, value) => match target.get_mut(&slot_name) {
                Some(Value::Map(existing)) => {
                    existing.insert(key, value);
                }
                _ => {
                    target.insert(slot_name, Value::Map(BTreeMap::from([(key, value)])));
                }
            },
        }
    }
    Ok(Value::Message(fields))
}

enum Decoded {
    Single(Value),
    Repeated(Vec<Value>),
    MapEntry(MapKey, Value),
}

fn decode_field(
    pool: &SchemaPool,
    field: &FieldSchema,
    wire_type: WireType,
    buf: &mut Bytes,
) -> Result<Decoded, CodecError> {
    if let Some(map) = &field.map {
        let mut entry = length_delimited(buf)?;
        let mut key = None;
        let mut value = None;
        while entry.has_remaining() {
            let (tag, wt) = decode_key(&mut entry).map_err(CodecError::decode)?;
            match tag {
                1 => key = Some(decode_map_key(map.key, wt, &mut entry)?),
                2 => value = Some(decode_single(pool, &map.value, wt, &mut entry)?),
                _ => skip_field(wt, tag, &mut entry, DecodeContext::default())
                    .map_err(CodecError::decode)?,
            }
        }
        let key = key.unwrap_or_else(|| default_map_key(map.key));
        let value = value.unwrap_or_else(|| default_value(&map.value));
        return Ok(Decoded::MapEntry(key, value));
    }

    if field.repeated {
        // Accept both packed and expanded encodings for packable scalars.
        if field.ty.packable() && wire_type == WireType::LengthDelimited {
            let mut run = length_delimited(buf)?;
            let mut items = Vec::new();
            while run.has_remaining() {
                items.push(decode_scalar_raw(&field.ty, &mut run)?);
            }
            return Ok(Decoded::Repeated(items));
        }
        let item = decode_single(pool, &field.ty, wire_type, buf)?;
        return Ok(Decoded::Repeated(vec![item]));
    }

    Ok(Decoded::Single(decode_single(
        pool, &field.ty, wire_type, buf,
    )?))
}

fn decode_single(
    pool: &SchemaPool,
    ty: &FieldType,
    wire_type: WireType,
    buf: &mut Bytes,
) -> Result<Value, CodecError> {
    Ok(match ty {
        FieldType::Message(name) => {
            expect_wire(wire_type, WireType::LengthDelimited)?;
            let mut nested = length_delimited(buf)?;
            decode_message(pool, name, &mut nested)?
        }
        FieldType::String => {
            expect_wire(wire_type, WireType::LengthDelimited)?;
            let bytes = length_delimited(buf)?;
            Value::String(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| CodecError::decode("string field is not valid UTF-8"))?,
            )
        }
        FieldType::Bytes => {
            expect_wire(wire_type, WireType::LengthDelimited)?;
            Value::Bytes(length_delimited(buf)?.to_vec())
        }
        FieldType::Float => {
            expect_wire(wire_type, WireType::ThirtyTwoBit)?;
            ensure_remaining(buf, 4)?;
            Value::Double(buf.get_f32_le().into())
        }
        FieldType::Double => {
            expect_wire(wire_type, WireType::SixtyFourBit)?;
            ensure_remaining(buf, 8)?;
            Value::Double(buf.get_f64_le())
        }
        _ => {
            expect_wire(wire_type, WireType::Varint)?;
            decode_scalar_raw(ty, buf)?
        }
    })
}

fn decode_scalar_raw(ty: &FieldType, buf: &mut Bytes) -> Result<Value, CodecError> {
    Ok(match ty {
        FieldType::Bool => Value::Bool(decode_varint(buf).map_err(CodecError::decode)? != 0),
        FieldType::Int32 | FieldType::Int64 | FieldType::Enum(_) => {
            Value::Int(decode_varint(buf).map_err(CodecError::decode)? as i64)
        }
        FieldType::UInt32 | FieldType::UInt64 => {
            Value::UInt(decode_varint(buf).map_err(CodecError::decode)?)
        }
        FieldType::Float => {
            ensure_remaining(buf, 4)?;
            Value::Double(buf.get_f32_le().into())
        }
        FieldType::Double => {
            ensure_remaining(buf, 8)?;
            Value::Double(buf.get_f64_le())
        }
        other => {
            return Err(CodecError::decode(format!(
                "{other:?} is not a packable scalar"
            )))
        }
    })
}

fn decode_map_key(
    kind: MapKeyKind,
    wire_type: WireType,
    buf: &mut Bytes,
) -> Result<MapKey, CodecError> {
    Ok(match kind {
        MapKeyKind::Bool => {
            expect_wire(wire_type, WireType::Varint)?;
            MapKey::Bool(decode_varint(buf).map_err(CodecError::decode)? != 0)
        }
        MapKeyKind::Int32 | MapKeyKind::Int64 => {
            expect_wire(wire_type, WireType::Varint)?;
            MapKey::Int(decode_varint(buf).map_err(CodecError::decode)? as i64)
        }
        MapKeyKind::UInt32 | MapKeyKind::UInt64 => {
            expect_wire(wire_type, WireType::Varint)?;
            MapKey::UInt(decode_varint(buf).map_err(CodecError::decode)?)
        }
        MapKeyKind::String => {
            expect_wire(wire_type, WireType::LengthDelimited)?;
            MapKey::String(
                String::from_utf8(length_delimited(buf)?.to_vec())
                    .map_err(|_| CodecError::decode("map key is not valid UTF-8"))?,
            )
        }
    })
}

fn default_map_key(kind: MapKeyKind) -> MapKey {
    match kind {
        MapKeyKind::Bool => MapKey::Bool(false),
        MapKeyKind::Int32 | MapKeyKind::Int64 => MapKey::Int(0),
        MapKeyKind::UInt32 | MapKeyKind::UInt64 => MapKey::UInt(0),
        MapKeyKind::String => MapKey::String(String::new()),
    }
}

fn default_value(ty: &FieldType) -> Value {
    match ty {
        FieldType::Bool => Value::Bool(false),
        FieldType::Int32 | FieldType::Int64 | FieldType::Enum(_) => Value::Int(0),
        FieldType::UInt32 | FieldType::UInt64 => Value::UInt(0),
        FieldType::Float | FieldType::Double => Value::Double(0.0),
        FieldType::String => Value::String(String::new()),
        FieldType::Bytes => Value::Bytes(Vec::new()),
        FieldType::Message(_) => Value::Message(BTreeMap::new()),
    }
}

fn expect_wire(got: WireType, want: WireType) -> Result<(), CodecError> {
    if got == want {
        Ok(())
    } else {
        Err(CodecError::decode(format!(
            "unexpected wire type {got:?}, wanted {want:?}"
        )))
    }
}

fn ensure_remaining(buf: &Bytes, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        Err(CodecError::decode("truncated fixed-width value"))
    } else {
        Ok(())
    }
}

fn length_delimited(buf: &mut Bytes) -> Result<Bytes, CodecError> {
    let len = decode_varint(buf).map_err(CodecError::decode)? as usize;
    if len > buf.remaining() {
        return Err(CodecError::decode("length prefix exceeds remaining bytes"));
    }
    Ok(buf.copy_to_bytes(len))
}

// google.protobuf.{Struct,Value,ListValue} carry free-form JSON in the
// dynamic form; their wire shape follows struct.proto field numbers.

fn encode_json_well_known(
    message: &str,
    json: &serde_json::Value,
    buf: &mut Vec<u8>,
) -> Result<(), CodecError> {
    match message.trim_start_matches('.') {
        "google.protobuf.Struct" => {
            let serde_json::Value::Object(map) = json else {
                return Err(CodecError::encode("Struct payload must be a JSON object"));
            };
            encode_struct(map, buf);
            Ok(())
        }
        "google.protobuf.Value" => {
            encode_json_value(json, buf);
            Ok(())
        }
        "google.protobuf.ListValue" => {
            let serde_json::Value::Array(items) = json else {
                return Err(CodecError::encode("ListValue payload must be a JSON array"));
            };
            encode_list_value(items, buf);
            Ok(())
        }
        other => Err(CodecError::encode(format!(
            "json payload cannot encode as {other}"
        ))),
    }
}

fn encode_struct(map: &serde_json::Map<String, serde_json::Value>, buf: &mut Vec<u8>) {
    for (key, value) in map {
        let mut entry = Vec::new();
        encode_key(1, WireType::LengthDelimited, &mut entry);
        encode_varint(key.len() as u64, &mut entry);
        entry.extend_from_slice(key.as_bytes());
        let mut nested = Vec::new();
        encode_json_value(value, &mut nested);
        encode_key(2, WireType::LengthDelimited, &mut entry);
        encode_varint(nested.len() as u64, &mut entry);
        entry.extend_from_slice(&nested);

        encode_key(1, WireType::LengthDelimited, buf);
        encode_varint(entry.len() as u64, buf);
        buf.extend_from_slice(&entry);
    }
}

fn encode_list_value(items: &[serde_json::Value], buf: &mut Vec<u8>) {
    for item in items {
        let mut nested = Vec::new();
        encode_json_value(item, &mut nested);
        encode_key(1, WireType::LengthDelimited, buf);
        encode_varint(nested.len() as u64, buf);
        buf.extend_from_slice(&nested);
    }
}

fn encode_json_value(json: &serde_json::Value, buf: &mut Vec<u8>) {
    match json {
        serde_json::Value::Null => {
            encode_key(1, WireType::Varint, buf);
            encode_varint(0, buf);
        }
        serde_json::Value::Number(n) => {
            encode_key(2, WireType::SixtyFourBit, buf);
            buf.put_f64_le(n.as_f64().unwrap_or(0.0));
        }
        serde_json::Value::String(s) => {
            encode_key(3, WireType::LengthDelimited, buf);
            encode_varint(s.len() as u64, buf);
            buf.extend_from_slice(s.as_bytes());
        }
        serde_json::Value::Bool(b) => {
            encode_key(4, WireType::Varint, buf);
            encode_varint(u64::from(*b), buf);
        }
        serde_json::Value::Object(map) => {
            let mut nested = Vec::new();
            encode_struct(map, &mut nested);
            encode_key(5, WireType::LengthDelimited, buf);
            encode_varint(nested.len() as u64, buf);
            buf.extend_from_slice(&nested);
        }
        serde_json::Value::Array(items) => {
            let mut nested = Vec::new();
            encode_list_value(items, &mut nested);
            encode_key(6, WireType::LengthDelimited, buf);
            encode_varint(nested.len() as u64, buf);
            buf.extend_from_slice(&nested);
        }
    }
}

fn decode_json_well_known_entry(
    message: &str,
    buf: &mut Bytes,
) -> Result<Option<Value>, CodecError> {
    match message.trim_start_matches('.') {
        "google.protobuf.Struct" => {
            let mut map = serde_json::Map::new();
            while buf.has_remaining() {
                let (tag, wt) = decode_key(buf).map_err(CodecError::decode)?;
                if tag == 1 && wt == WireType::LengthDelimited {
                    let mut entry = length_delimited(buf)?;
                    let (key, value) = decode_struct_entry(&mut entry)?;
                    map.insert(key, value);
                } else {
                    skip_field(wt, tag, buf, DecodeContext::default())
                        .map_err(CodecError::decode)?;
                }
            }
            Ok(Some(Value::Json(serde_json::Value::Object(map))))
        }
        "google.protobuf.Value" => Ok(Some(Value::Json(decode_json_value(buf)?))),
        "google.protobuf.ListValue" => {
            let mut items = Vec::new();
            while buf.has_remaining() {
                let (tag, wt) = decode_key(buf).map_err(CodecError::decode)?;
                if tag == 1 && wt == WireType::LengthDelimited {
                    let mut nested = length_delimited(buf)?;
                    items.push(decode_json_value(&mut nested)?);
                } else {
                    skip_field(wt, tag, buf, DecodeContext::default())
                        .map_err(CodecError::decode)?;
                }
            }
            Ok(Some(Value::Json(serde_json::Value::Array(items))))
        }
        _ => Ok(None),
    }
}

fn decode_struct_entry(buf: &mut Bytes) -> Result<(String, serde_json::Value), CodecError> {
    let mut key = String::new();
    let mut value = serde_json::Value::Null;
    while buf.has_remaining() {
        let (tag, wt) = decode_key(buf).map_err(CodecError::decode)?;
        match (tag, wt) {
            (1, WireType::LengthDelimited) => {
                key = String::from_utf8(length_delimited(buf)?.to_vec())
                    .map_err(|_| CodecError::decode("struct key is not valid UTF-8"))?;
            }
            (2, WireType::LengthDelimited) => {
                let mut nested = length_delimited(buf)?;
                value = decode_json_value(&mut nested)?;
            }
            _ => skip_field(wt, tag, buf, DecodeContext::default())
                .map_err(CodecError::decode)?,
        }
    }
    Ok((key, value))
}

fn decode_json_value(buf: &mut Bytes) -> Result<serde_json::Value, CodecError> {
    let mut out = serde_json::Value::Null;
    while buf.has_remaining() {
        let (tag, wt) = decode_key(buf).map_err(CodecError::decode)?;
        out = match (tag, wt) {
            (1, WireType::Varint) => {
                decode_varint(buf).map_err(CodecError::decode)?;
                serde_json::Value::Null
            }
            (2, WireType::SixtyFourBit) => {
                ensure_remaining(buf, 8)?;
                serde_json::Number::from_f64(buf.get_f64_le())
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
            (3, WireType::LengthDelimited) => serde_json::Value::String(
                String::from_utf8(length_delimited(buf)?.to_vec())
                    .map_err(|_| CodecError::decode("string value is not valid UTF-8"))?,
            ),
            (4, WireType::Varint) => {
                serde_json::Value::Bool(decode_varint(buf).map_err(CodecError::decode)? != 0)
            }
            (5, WireType::LengthDelimited) => {
                let mut nested = length_delimited(buf)?;
                let mut map = serde_json::Map::new();
                while nested.has_remaining() {
                    let (t, w) = decode_key(&mut nested).map_err(CodecError::decode)?;
                    if t == 1 && w == WireType::LengthDelimited {
                        let mut entry = length_delimited(&mut nested)?;
                        let (key, value) = decode_struct_entry(&mut entry)?;
                        map.insert(key, value);
                    } else {
                        skip_field(w, t, &mut nested, DecodeContext::default())
                            .map_err(CodecError::decode)?;
                    }
                }
                serde_json::Value::Object(map)
            }
            (6, WireType::LengthDelimited) => {
                let mut nested = length_delimited(buf)?;
                let mut items = Vec::new();
                while nested.has_remaining() {
                    let (t, w) = decode_key(&mut nested).map_err(CodecError::decode)?;
                    if t == 1 && w == WireType::LengthDelimited {
                        let mut item = length_delimited(&mut nested)?;
                        items.push(decode_json_value(&mut item)?);
                    } else {
                        skip_field(w, t, &mut nested, DecodeContext::default())
                            .map_err(CodecError::decode)?;
                    }
                }
                serde_json::Value::Array(items)
            }
            (tag, wt) => {
                skip_field(wt, tag, buf, DecodeContext::default())
                    .map_err(CodecError::decode)?;
                continue;
            }
        };
    }
    Ok(out)
}
