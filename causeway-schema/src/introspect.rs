//! The type introspector.
//!
//! Walks [`RecordType`] metadata and produces the abstract field list the
//! synthesizer consumes: well-known mappings resolved, optionality decided,
//! oneof groups promoted, invalid shapes rejected.

use causeway::record::{EnumType, FieldKind, FieldMeta, MapKeyKind, Modifiers, RecordType};

use crate::error::SchemaError;

/// A scalar proto type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
}

/// The fixed set of well-known message mappings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WellKnown {
    Timestamp,
    Duration,
    Empty,
    Struct,
    Value,
    ListValue,
    FieldMask,
    Any,
}

impl WellKnown {
    /// Fully qualified message name with leading dot.
    pub fn type_name(&self) -> &'static str {
        match self {
            WellKnown::Timestamp => ".google.protobuf.Timestamp",
            WellKnown::Duration => ".google.protobuf.Duration",
            WellKnown::Empty => ".google.protobuf.Empty",
            WellKnown::Struct => ".google.protobuf.Struct",
            WellKnown::Value => ".google.protobuf.Value",
            WellKnown::ListValue => ".google.protobuf.ListValue",
            WellKnown::FieldMask => ".google.protobuf.FieldMask",
            WellKnown::Any => ".google.protobuf.Any",
        }
    }

    /// The import carrying this type's definition.
    pub fn import_path(&self) -> &'static str {
        match self {
            WellKnown::Timestamp => "google/protobuf/timestamp.proto",
            WellKnown::Duration => "google/protobuf/duration.proto",
            WellKnown::Empty => "google/protobuf/empty.proto",
            WellKnown::Struct | WellKnown::Value | WellKnown::ListValue => {
                "google/protobuf/struct.proto"
            }
            WellKnown::FieldMask => "google/protobuf/field_mask.proto",
            WellKnown::Any => "google/protobuf/any.proto",
        }
    }
}

/// A field kind after well-known and oneof resolution.
#[derive(Clone, Debug)]
pub enum ResolvedKind {
    Scalar(Scalar),
    Enum(EnumType),
    /// A nested record to materialize as a message.
    Message(RecordType),
    WellKnown(WellKnown),
    Repeated(Box<ResolvedKind>),
    Map {
        key: MapKeyKind,
        value: Box<ResolvedKind>,
    },
    /// A promoted oneof group; sub-fields flatten into the parent message.
    Oneof(RecordType),
}

/// One introspected field, ready for descriptor emission.
#[derive(Clone, Debug)]
pub struct IntrospectedField {
    pub name: &'static str,
    pub validate: Option<&'static str>,
    pub default: Option<&'static str>,
    pub doc: Option<&'static str>,
    pub modifiers: Modifiers,
    /// Explicit presence: pointer-shaped field or `proto:"optional"`.
    pub optional: bool,
    pub kind: ResolvedKind,
}

/// Walk a record's fields into the abstract list the synthesizer consumes.
pub fn introspect(ty: &RecordType) -> Result<Vec<IntrospectedField>, SchemaError> {
    if ty.name.is_empty() {
        return Err(SchemaError::NotAStruct(format!("{ty:?}")));
    }
    ty.fields
        .iter()
        .map(|field| introspect_field(ty, field))
        .collect()
}

fn introspect_field(ty: &RecordType, field: &FieldMeta) -> Result<IntrospectedField, SchemaError> {
    check_modifiers(ty, field)?;

    let (kind, mut optional) = match &field.kind {
        FieldKind::Optional(inner) => (resolve(ty, field, inner, Position::Optional)?, true),
        other => (resolve(ty, field, other, Position::Top)?, false),
    };

    if field.modifiers.optional {
        optional = true;
    }
    // Repeated and map fields are never optional.
    if matches!(kind, ResolvedKind::Repeated(_) | ResolvedKind::Map { .. }) {
        optional = false;
    }

    Ok(IntrospectedField {
        name: field.name,
        validate: field.validate,
        default: field.default,
        doc: field.doc,
        modifiers: field.modifiers,
        optional,
        kind,
    })
}

fn check_modifiers(ty: &RecordType, field: &FieldMeta) -> Result<(), SchemaError> {
    let m = &field.modifiers;
    let conflict = |detail: &str| SchemaError::InvalidModifierCombination {
        message: ty.name.to_owned(),
        field: field.name.to_owned(),
        detail: detail.to_owned(),
    };
    if m.implicit && field.default.is_some() {
        return Err(conflict("implicit presence cannot carry a default value"));
    }
    if m.required && m.implicit {
        return Err(conflict("required and implicit are mutually exclusive"));
    }
    if m.required && m.optional {
        return Err(conflict("required and optional are mutually exclusive"));
    }
    if m.implicit && m.optional {
        return Err(conflict("implicit and optional are mutually exclusive"));
    }
    if m.unpacked && !matches!(field.kind, FieldKind::Repeated(_)) {
        return Err(conflict("unpacked only applies to repeated fields"));
    }
    if m.oneof && !matches!(field.kind, FieldKind::Message(_)) {
        return Err(conflict("oneof only applies to nested record fields"));
    }
    Ok(())
}

/// Where a kind sits while resolving, to reject invalid nesting.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    Top,
    Optional,
    Repeated,
    MapValue,
}

fn resolve(
    ty: &RecordType,
    field: &FieldMeta,
    kind: &FieldKind,
    position: Position,
) -> Result<ResolvedKind, SchemaError> {
    let unsupported = |detail: &str| SchemaError::UnsupportedFieldType {
        message: ty.name.to_owned(),
        field: field.name.to_owned(),
        detail: detail.to_owned(),
    };
    Ok(match kind {
        FieldKind::Bool => ResolvedKind::Scalar(Scalar::Bool),
        FieldKind::Int32 => ResolvedKind::Scalar(Scalar::Int32),
        FieldKind::Int64 => ResolvedKind::Scalar(Scalar::Int64),
        FieldKind::UInt32 => ResolvedKind::Scalar(Scalar::UInt32),
        FieldKind::UInt64 => ResolvedKind::Scalar(Scalar::UInt64),
        FieldKind::Float => ResolvedKind::Scalar(Scalar::Float),
        FieldKind::Double => ResolvedKind::Scalar(Scalar::Double),
        FieldKind::String => ResolvedKind::Scalar(Scalar::String),
        FieldKind::Bytes => ResolvedKind::Scalar(Scalar::Bytes),
        FieldKind::Enum(e) => ResolvedKind::Enum(e.enum_type()),
        FieldKind::Timestamp => ResolvedKind::WellKnown(WellKnown::Timestamp),
        FieldKind::DurationKind => ResolvedKind::WellKnown(WellKnown::Duration),
        FieldKind::Struct => ResolvedKind::WellKnown(WellKnown::Struct),
        FieldKind::JsonValue => ResolvedKind::WellKnown(WellKnown::Value),
        FieldKind::ListValue => ResolvedKind::WellKnown(WellKnown::ListValue),
        FieldKind::FieldMask => ResolvedKind::WellKnown(WellKnown::FieldMask),
        FieldKind::Any => ResolvedKind::WellKnown(WellKnown::Any),
        FieldKind::Message(target) => {
            let record = target.record();
            if field.modifiers.empty || record.fields.is_empty() {
                // Zero-field records collapse to google.protobuf.Empty.
                ResolvedKind::WellKnown(WellKnown::Empty)
            } else if field.modifiers.oneof && position == Position::Top {
                if record.fields.len() < 2 {
                    // Bare tagged records with fewer than two exported
                    // fields are ignored: plain message reference.
                    ResolvedKind::Message(record)
                } else {
                    ResolvedKind::Oneof(record)
                }
            } else {
                ResolvedKind::Message(record)
            }
        }
        FieldKind::Optional(_) => {
            return Err(unsupported(match position {
                Position::Repeated => "repeated elements cannot be optional",
                Position::MapValue => "map values cannot be optional",
                _ => "nested optional is not representable",
            }))
        }
        FieldKind::Repeated(inner) => {
            if position == Position::Repeated {
                return Err(unsupported("nested repeated fields are not representable"));
            }
            if position == Position::MapValue {
                return Err(unsupported("map values cannot be repeated"));
            }
            ResolvedKind::Repeated(Box::new(resolve(ty, field, inner, Position::Repeated)?))
        }
        FieldKind::Map { key, value } => {
            if position != Position::Top && position != Position::Optional {
                return Err(unsupported("maps cannot nest inside repeated or map fields"));
            }
            let key = map_key_kind(key).ok_or_else(|| SchemaError::UnsupportedMapKey {
                message: ty.name.to_owned(),
                field: field.name.to_owned(),
            })?;
            ResolvedKind::Map {
                key,
                value: Box::new(resolve(ty, field, value, Position::MapValue)?),
            }
        }
    })
}

fn map_key_kind(kind: &FieldKind) -> Option<MapKeyKind> {
    match kind {
        FieldKind::Bool => Some(MapKeyKind::Bool),
        FieldKind::Int32 => Some(MapKeyKind::Int32),
        FieldKind::Int64 => Some(MapKeyKind::Int64),
        FieldKind::UInt32 => Some(MapKeyKind::UInt32),
        FieldKind::UInt64 => Some(MapKeyKind::UInt64),
        FieldKind::String => Some(MapKeyKind::String),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway::record::{FieldMeta, MessageRef, Modifiers, RecordType};

    struct Inner;
    fn inner_type() -> RecordType {
        RecordType::new::<Inner>("Inner")
            .with_field(FieldMeta::new("a", FieldKind::String))
            .with_field(FieldMeta::new("b", FieldKind::Int32))
    }

    struct Empty;
    fn empty_type() -> RecordType {
        RecordType::new::<Empty>("Empty")
    }

    struct Outer;

    #[test]
    fn optional_is_detected_from_wrapper_and_modifier() {
        let ty = RecordType::new::<Outer>("Outer")
            .with_field(FieldMeta::new(
                "nick",
                FieldKind::Optional(Box::new(FieldKind::String)),
            ))
            .with_field(FieldMeta::new("tag", FieldKind::String).with_modifiers(Modifiers {
                optional: true,
                ..Modifiers::default()
            }))
            .with_field(FieldMeta::new(
                "items",
                FieldKind::Repeated(Box::new(FieldKind::String)),
            ));
        let fields = introspect(&ty).unwrap();
        assert!(fields[0].optional);
        assert!(fields[1].optional);
        assert!(!fields[2].optional);
    }

    #[test]
    fn zero_field_record_collapses_to_empty() {
        let ty = RecordType::new::<Outer>("Outer").with_field(FieldMeta::new(
            "nothing",
            FieldKind::Message(MessageRef::from_fn(empty_type)),
        ));
        let fields = introspect(&ty).unwrap();
        assert!(matches!(
            fields[0].kind,
            ResolvedKind::WellKnown(WellKnown::Empty)
        ));
    }

    #[test]
    fn oneof_promotion_is_strict() {
        // Tagged and two fields: promoted.
        let ty = RecordType::new::<Outer>("Outer").with_field(
            FieldMeta::new("identifier", FieldKind::Message(MessageRef::from_fn(inner_type)))
                .with_modifiers(Modifiers {
                    oneof: true,
                    ..Modifiers::default()
                }),
        );
        assert!(matches!(
            introspect(&ty).unwrap()[0].kind,
            ResolvedKind::Oneof(_)
        ));

        // Untagged: plain message, never inferred from naming.
        let ty = RecordType::new::<Outer>("Outer").with_field(FieldMeta::new(
            "identifier_oneof",
            FieldKind::Message(MessageRef::from_fn(inner_type)),
        ));
        assert!(matches!(
            introspect(&ty).unwrap()[0].kind,
            ResolvedKind::Message(_)
        ));
    }

    #[test]
    fn float_map_key_is_rejected() {
        let ty = RecordType::new::<Outer>("Outer").with_field(FieldMeta::new(
            "scores",
            FieldKind::Map {
                key: Box::new(FieldKind::Double),
                value: Box::new(FieldKind::String),
            },
        ));
        assert!(matches!(
            introspect(&ty).unwrap_err(),
            SchemaError::UnsupportedMapKey { .. }
        ));
    }

    #[test]
    fn implicit_with_default_is_rejected() {
        let ty = RecordType::new::<Outer>("Outer").with_field(
            FieldMeta::new("count", FieldKind::Int32)
                .with_default("3")
                .with_modifiers(Modifiers {
                    implicit: true,
                    ..Modifiers::default()
                }),
        );
        assert!(matches!(
            introspect(&ty).unwrap_err(),
            SchemaError::InvalidModifierCombination { .. }
        ));
    }
}
