//! Dynamic message values.
//!
//! A [`Value`] is the wire-neutral form every record passes through on its
//! way to or from a codec: handlers see typed records, codecs see values
//! plus a synthesized descriptor. Messages are keyed by proto field name so
//! the codecs can line values up against field descriptors without touching
//! host types.

use std::collections::BTreeMap;

/// A dynamically typed field value.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// An absent optional field or unset oneof arm.
    #[default]
    Unset,
    Bool(bool),
    /// int32 and int64 payloads.
    Int(i64),
    /// uint32 and uint64 payloads.
    UInt(u64),
    /// float and double payloads.
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
    /// A message, keyed by proto field name.
    Message(BTreeMap<String, Value>),
    /// Free-form JSON, used for `Struct`, `Value`, and `ListValue` payloads.
    Json(serde_json::Value),
}

/// A map key; only the supported scalar key types are representable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    String(String),
}

impl Value {
    /// Build a message value from `(field name, value)` pairs.
    pub fn message<I, K>(entries: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Message(
            entries
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Unset)
    }

    /// Whether this value is the implicit-presence default for its shape.
    ///
    /// Used by codecs to decide which fields to omit on the wire.
    pub fn is_default(&self) -> bool {
        match self {
            Value::Unset => true,
            Value::Bool(b) => !b,
            Value::Int(n) => *n == 0,
            Value::UInt(n) => *n == 0,
            Value::Double(n) => *n == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            Value::Message(_) | Value::Json(_) => false,
        }
    }

    pub fn as_message(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Message(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn into_message(self) -> Option<BTreeMap<String, Value>> {
        match self {
            Value::Message(fields) => Some(fields),
            _ => None,
        }
    }

    /// A short name for the value's shape, used in error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            Value::Unset => "unset",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Message(_) => "message",
            Value::Json(_) => "json",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_detection() {
        assert!(Value::Unset.is_default());
        assert!(Value::Int(0).is_default());
        assert!(Value::String(String::new()).is_default());
        assert!(!Value::Int(3).is_default());
        assert!(!Value::message([("a", Value::Int(0))]).is_default());
    }

    #[test]
    fn message_builder_keys_by_name() {
        let msg = Value::message([("name", Value::from("a")), ("id", Value::Int(7))]);
        let fields = msg.as_message().unwrap();
        assert_eq!(fields.get("name"), Some(&Value::from("a")));
        assert_eq!(fields.get("id"), Some(&Value::Int(7)));
    }
}
