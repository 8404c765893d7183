//! Resolved message schemas.
//!
//! The codecs never walk raw `FileDescriptorProto`s at request time; a
//! [`SchemaPool`] resolves a descriptor set once into flat message views
//! with field numbers, JSON names, map entries, oneof groups, and effective
//! presence/packing already decided.

use std::collections::HashMap;
use std::sync::Arc;

use causeway::record::MapKeyKind;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FeatureSet, FileDescriptorProto, FileDescriptorSet};

use crate::error::CodecError;

/// A resolved scalar or reference type.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
    /// Fully qualified enum name with leading dot.
    Enum(String),
    /// Fully qualified message name with leading dot.
    Message(String),
}

impl FieldType {
    /// Whether packed encoding is representable for this type.
    pub fn packable(&self) -> bool {
        matches!(
            self,
            FieldType::Bool
                | FieldType::Int32
                | FieldType::Int64
                | FieldType::UInt32
                | FieldType::UInt64
                | FieldType::Float
                | FieldType::Double
                | FieldType::Enum(_)
        )
    }
}

/// Map entry view: the synthesized `*Entry` message flattened back out.
#[derive(Clone, Debug)]
pub struct MapSchema {
    pub key: MapKeyKind,
    pub value: FieldType,
}

#[derive(Clone, Debug)]
pub struct FieldSchema {
    pub name: String,
    pub json_name: String,
    pub number: u32,
    pub repeated: bool,
    pub ty: FieldType,
    pub map: Option<MapSchema>,
    /// Index into [`MessageSchema::oneofs`] for real oneof members.
    pub oneof: Option<usize>,
    /// Emit-when-set rather than emit-when-non-default.
    pub explicit_presence: bool,
    /// Marked optional at declaration: proto3-optional, or an explicit
    /// field-level presence override in editions.
    pub optional: bool,
    /// Editions legacy-required presence.
    pub required: bool,
    /// Effective packed encoding for repeated scalars.
    pub packed: bool,
}

#[derive(Clone, Debug)]
pub struct OneofSchema {
    pub name: String,
    /// Indexes into [`MessageSchema::fields`].
    pub members: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct MessageSchema {
    /// Fully qualified name with leading dot.
    pub name: String,
    pub fields: Vec<FieldSchema>,
    /// Real oneof groups; synthetic proto3-optional oneofs are dropped.
    pub oneofs: Vec<OneofSchema>,
    pub map_entry: bool,
}

impl MessageSchema {
    pub fn field_by_number(&self, number: u32) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// Match a JSON object key against the canonical or original name.
    pub fn field_by_json_key(&self, key: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.json_name == key || f.name == key)
    }
}

#[derive(Clone, Debug)]
pub struct EnumSchema {
    pub name: String,
    pub values: Vec<(String, i32)>,
}

impl EnumSchema {
    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, v)| *v == number)
            .map(|(n, _)| n.as_str())
    }
}

/// All message and enum schemas of one descriptor set.
#[derive(Clone, Debug, Default)]
pub struct SchemaPool {
    messages: HashMap<String, Arc<MessageSchema>>,
    enums: HashMap<String, Arc<EnumSchema>>,
}

/// File-level context affecting field semantics.
#[derive(Clone, Copy)]
struct FileContext<'a> {
    proto3: bool,
    features: Option<&'a FeatureSet>,
}

impl SchemaPool {
    pub fn from_set(set: &FileDescriptorSet) -> Result<SchemaPool, CodecError> {
        // First pass: collect raw descriptors so map entries and cross-file
        // references resolve regardless of declaration order.
        let mut raw: HashMap<String, (&DescriptorProto, FileContext<'_>)> = HashMap::new();
        let mut pool = SchemaPool::default();

        for file in &set.file {
            let package = file.package.as_deref().unwrap_or("");
            let ctx = FileContext {
                proto3: file.syntax.as_deref() != Some("editions"),
                features: file.options.as_ref().and_then(|o| o.features.as_ref()),
            };
            for message in &file.message_type {
                collect_messages(package, message, ctx, &mut raw);
            }
            for enum_type in &file.enum_type {
                let name = format!(".{}.{}", package, enum_type.name.as_deref().unwrap_or(""));
                pool.enums.insert(
                    name.clone(),
                    Arc::new(EnumSchema {
                        name,
                        values: enum_type
                            .value
                            .iter()
                            .map(|v| {
                                (
                                    v.name.clone().unwrap_or_default(),
                                    v.number.unwrap_or_default(),
                                )
                            })
                            .collect(),
                    }),
                );
            }
        }

        for (name, (descriptor, ctx)) in &raw {
            let schema = resolve_message(name, descriptor, *ctx, &raw)?;
            pool.messages.insert(name.clone(), Arc::new(schema));
        }
        Ok(pool)
    }

    pub fn message(&self, name: &str) -> Option<&Arc<MessageSchema>> {
        let key = if name.starts_with('.') {
            name.to_owned()
        } else {
            format!(".{name}")
        };
        self.messages.get(&key)
    }

    pub fn enum_schema(&self, name: &str) -> Option<&Arc<EnumSchema>> {
        let key = if name.starts_with('.') {
            name.to_owned()
        } else {
            format!(".{name}")
        };
        self.enums.get(&key)
    }

    pub fn message_names(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }
}

fn collect_messages<'a>(
    scope: &str,
    message: &'a DescriptorProto,
    ctx: FileContext<'a>,
    raw: &mut HashMap<String, (&'a DescriptorProto, FileContext<'a>)>,
) {
    let name = format!(".{}.{}", scope, message.name.as_deref().unwrap_or(""));
    let nested_scope = name.trim_start_matches('.').to_owned();
    raw.insert(name, (message, ctx));
    for nested in &message.nested_type {
        collect_messages(&nested_scope, nested, ctx, raw);
    }
}

fn resolve_message(
    name: &str,
    descriptor: &DescriptorProto,
    ctx: FileContext<'_>,
    raw: &HashMap<String, (&DescriptorProto, FileContext<'_>)>,
) -> Result<MessageSchema, CodecError> {
    let mut fields = Vec::with_capacity(descriptor.field.len());
    // oneof declaration index -> member field indexes
    let mut oneof_members: HashMap<i32, Vec<usize>> = HashMap::new();

    for field in &descriptor.field {
        let field_name = field.name.clone().unwrap_or_default();
        let number = field.number.unwrap_or_default();
        if number <= 0 {
            return Err(CodecError::InvalidDescriptor(format!(
                "field {field_name} of {name} has no number"
            )));
        }
        let repeated = field.label == Some(Label::Repeated as i32);
        let ty = field_type(field, name)?;

        let map = if repeated {
            if let FieldType::Message(entry_name) = &ty {
                raw.get(entry_name.as_str())
                    .filter(|(entry, _)| {
                        entry
                            .options
                            .as_ref()
                            .and_then(|o| o.map_entry)
                            .unwrap_or(false)
                    })
                    .map(|(entry, _)| map_schema(entry, entry_name))
                    .transpose()?
            } else {
                None
            }
        } else {
            None
        };

        let synthetic_oneof = field.proto3_optional.unwrap_or(false);
        let real_oneof = field.oneof_index.filter(|_| !synthetic_oneof);

        let explicit_presence = if repeated {
            false
        } else if ctx.proto3 {
            synthetic_oneof || real_oneof.is_some() || matches!(ty, FieldType::Message(_))
        } else {
            // Editions: anything except implicit presence tracks emptiness
            // explicitly. Message fields always do.
            let presence = effective_presence(ctx.features, field.options.as_ref());
            presence != prost_types::feature_set::FieldPresence::Implicit as i32
                || matches!(ty, FieldType::Message(_))
        };

        let packed = repeated
            && ty.packable()
            && map.is_none()
            && if ctx.proto3 {
                field
                    .options
                    .as_ref()
                    .and_then(|o| o.packed)
                    .unwrap_or(true)
            } else {
                effective_encoding(ctx.features, field.options.as_ref())
                    != prost_types::feature_set::RepeatedFieldEncoding::Expanded as i32
            };

        let field_presence = field
            .options
            .as_ref()
            .and_then(|o| o.features.as_ref())
            .and_then(|f| f.field_presence);
        let optional = !repeated
            && (synthetic_oneof
                || (!ctx.proto3
                    && field_presence
                        == Some(prost_types::feature_set::FieldPresence::Explicit as i32)));
        let required = !ctx.proto3
            && effective_presence(ctx.features, field.options.as_ref())
                == prost_types::feature_set::FieldPresence::LegacyRequired as i32;

        let index = fields.len();
        if let Some(oneof) = real_oneof {
            oneof_members.entry(oneof).or_default().push(index);
        }
        fields.push(FieldSchema {
            json_name: field
                .json_name
                .clone()
                .unwrap_or_else(|| field_name.clone()),
            name: field_name,
            number: number as u32,
            repeated,
            ty,
            map,
            oneof: None,
            explicit_presence,
            optional,
            required,
            packed,
        });
    }

    // Keep only declared (non-synthetic) oneofs that retained members.
    let mut oneofs = Vec::new();
    for (index, decl) in descriptor.oneof_decl.iter().enumerate() {
        if let Some(members) = oneof_members.remove(&(index as i32)) {
            let slot = oneofs.len();
            for member in &members {
                fields[*member].oneof = Some(slot);
            }
            oneofs.push(OneofSchema {
                name: decl.name.clone().unwrap_or_default(),
                members,
            });
        }
    }

    Ok(MessageSchema {
        name: name.to_owned(),
        fields,
        oneofs,
        map_entry: descriptor
            .options
            .as_ref()
            .and_then(|o| o.map_entry)
            .unwrap_or(false),
    })
}

fn effective_presence(
    file: Option<&FeatureSet>,
    options: Option<&prost_types::FieldOptions>,
) -> i32 {
    options
        .and_then(|o| o.features.as_ref())
        .and_then(|f| f.field_presence)
        .or_else(|| file.and_then(|f| f.field_presence))
        .unwrap_or(prost_types::feature_set::FieldPresence::Explicit as i32)
}

fn effective_encoding(
    file: Option<&FeatureSet>,
    options: Option<&prost_types::FieldOptions>,
) -> i32 {
    options
        .and_then(|o| o.features.as_ref())
        .and_then(|f| f.repeated_field_encoding)
        .or_else(|| file.and_then(|f| f.repeated_field_encoding))
        .unwrap_or(prost_types::feature_set::RepeatedFieldEncoding::Packed as i32)
}

fn map_schema(entry: &DescriptorProto, entry_name: &str) -> Result<MapSchema, CodecError> {
    let key_field = entry
        .field
        .iter()
        .find(|f| f.number == Some(1))
        .ok_or_else(|| {
            CodecError::InvalidDescriptor(format!("map entry {entry_name} lacks a key field"))
        })?;
    let value_field = entry
        .field
        .iter()
        .find(|f| f.number == Some(2))
        .ok_or_else(|| {
            CodecError::InvalidDescriptor(format!("map entry {entry_name} lacks a value field"))
        })?;
    let key = match key_field.r#type.and_then(|t| Type::try_from(t).ok()) {
        Some(Type::Bool) => MapKeyKind::Bool,
        Some(Type::Int32) | Some(Type::Sint32) | Some(Type::Sfixed32) => MapKeyKind::Int32,
        Some(Type::Int64) | Some(Type::Sint64) | Some(Type::Sfixed64) => MapKeyKind::Int64,
        Some(Type::Uint32) | Some(Type::Fixed32) => MapKeyKind::UInt32,
        Some(Type::Uint64) | Some(Type::Fixed64) => MapKeyKind::UInt64,
        Some(Type::String) => MapKeyKind::String,
        other => {
            return Err(CodecError::InvalidDescriptor(format!(
                "map entry {entry_name} has unsupported key type {other:?}"
            )))
        }
    };
    Ok(MapSchema {
        key,
        value: field_type(value_field, entry_name)?,
    })
}

fn field_type(
    field: &prost_types::FieldDescriptorProto,
    message: &str,
) -> Result<FieldType, CodecError> {
    let ty = field.r#type.and_then(|t| Type::try_from(t).ok());
    Ok(match ty {
        Some(Type::Bool) => FieldType::Bool,
        Some(Type::Int32) | Some(Type::Sint32) | Some(Type::Sfixed32) => FieldType::Int32,
        Some(Type::Int64) | Some(Type::Sint64) | Some(Type::Sfixed64) => FieldType::Int64,
        Some(Type::Uint32) | Some(Type::Fixed32) => FieldType::UInt32,
        Some(Type::Uint64) | Some(Type::Fixed64) => FieldType::UInt64,
        Some(Type::Float) => FieldType::Float,
        Some(Type::Double) => FieldType::Double,
        Some(Type::String) => FieldType::String,
        Some(Type::Bytes) => FieldType::Bytes,
        Some(Type::Enum) => FieldType::Enum(required_type_name(field, message)?),
        Some(Type::Message) | None => FieldType::Message(required_type_name(field, message)?),
        Some(other) => {
            return Err(CodecError::InvalidDescriptor(format!(
                "field {} of {message} has unsupported type {other:?}",
                field.name.as_deref().unwrap_or("")
            )))
        }
    })
}

fn required_type_name(
    field: &prost_types::FieldDescriptorProto,
    message: &str,
) -> Result<String, CodecError> {
    field.type_name.clone().ok_or_else(|| {
        CodecError::InvalidDescriptor(format!(
            "field {} of {message} lacks a type name",
            field.name.as_deref().unwrap_or("")
        ))
    })
}
