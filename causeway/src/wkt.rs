//! Host-side carriers for well-known Protobuf types that have no natural
//! standard-library representation.
//!
//! `SystemTime`, `Duration`, and the `serde_json` types map to their
//! well-known counterparts directly; the newtypes here cover the rest.

use crate::error::RecordError;
use crate::record::{FieldKind, ProtoField};
use crate::value::Value;

/// A set of field paths, mapped to `.google.protobuf.FieldMask`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldMask {
    pub paths: Vec<String>,
}

impl FieldMask {
    pub fn new<I, S>(paths: I) -> FieldMask
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldMask {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl ProtoField for FieldMask {
    fn field_kind() -> FieldKind {
        FieldKind::FieldMask
    }

    fn into_value(self) -> Value {
        Value::message([(
            "paths",
            Value::List(self.paths.into_iter().map(Value::String).collect()),
        )])
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(FieldMask::default()),
            Value::Message(mut fields) => {
                let paths = Vec::<String>::from_value(fields.remove("paths").unwrap_or_default())?;
                Ok(FieldMask { paths })
            }
            other => Err(RecordError::WrongShape {
                expected: "field mask",
                got: other.shape(),
            }),
        }
    }
}

/// A type-tagged payload, mapped to `.google.protobuf.Any`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Any {
    pub type_url: String,
    pub value: Vec<u8>,
}

impl Any {
    pub fn new(type_url: impl Into<String>, value: Vec<u8>) -> Any {
        Any {
            type_url: type_url.into(),
            value,
        }
    }
}

impl ProtoField for Any {
    fn field_kind() -> FieldKind {
        FieldKind::Any
    }

    fn into_value(self) -> Value {
        Value::message([
            ("type_url", Value::String(self.type_url)),
            ("value", Value::Bytes(self.value)),
        ])
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(Any::default()),
            Value::Message(mut fields) => Ok(Any {
                type_url: String::from_value(fields.remove("type_url").unwrap_or_default())?,
                value: Vec::<u8>::from_value(fields.remove("value").unwrap_or_default())?,
            }),
            other => Err(RecordError::WrongShape {
                expected: "any",
                got: other.shape(),
            }),
        }
    }
}

/// A dynamic JSON list, mapped to `.google.protobuf.ListValue`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JsonList(pub Vec<serde_json::Value>);

impl ProtoField for JsonList {
    fn field_kind() -> FieldKind {
        FieldKind::ListValue
    }

    fn into_value(self) -> Value {
        Value::Json(serde_json::Value::Array(self.0))
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(JsonList::default()),
            Value::Json(serde_json::Value::Array(items)) => Ok(JsonList(items)),
            Value::Json(_) => Err(RecordError::WrongShape {
                expected: "json array",
                got: "json",
            }),
            other => Err(RecordError::WrongShape {
                expected: "json array",
                got: other.shape(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_mask_round_trips() {
        let mask = FieldMask::new(["user.name", "user.email"]);
        let restored = FieldMask::from_value(mask.clone().into_value()).unwrap();
        assert_eq!(restored, mask);
    }

    #[test]
    fn any_round_trips() {
        let any = Any::new("type.googleapis.com/user.v1.User", vec![1, 2, 3]);
        let restored = Any::from_value(any.clone().into_value()).unwrap();
        assert_eq!(restored, any);
    }
}
