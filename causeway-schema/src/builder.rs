//! Descriptor synthesis.
//!
//! Converts introspected record types into `FileDescriptorProto`s: one file
//! per requested top-level type, named `<package>/<lowercased-type>.proto`,
//! plus a service file when building a whole service. A pending-types queue
//! drains every reachable record into a top-level message exactly once;
//! types that already materialized in an earlier file of the same set are
//! referenced through an import instead.

use std::any::TypeId;
use std::collections::{BTreeSet, HashMap, VecDeque};

use causeway::config::{Edition, Features, Syntax};
use causeway::record::{MapKeyKind, RecordType};
use causeway::service::Service;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::source_code_info::Location;
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FieldOptions, FileDescriptorProto, FileDescriptorSet, FileOptions, MessageOptions,
    MethodDescriptorProto, OneofDescriptorProto, ServiceDescriptorProto, SourceCodeInfo,
};
use tracing::debug;

use crate::error::SchemaError;
use crate::introspect::{introspect, IntrospectedField, ResolvedKind, Scalar};
use crate::well_known;

/// Schema-affecting configuration, one per service.
#[derive(Clone, Debug)]
pub struct SchemaConfig {
    pub package: String,
    pub syntax: Syntax,
    pub edition: Edition,
    pub features: Features,
}

impl SchemaConfig {
    pub fn proto3(package: impl Into<String>) -> SchemaConfig {
        SchemaConfig {
            package: package.into(),
            syntax: Syntax::Proto3,
            edition: Edition::Edition2023,
            features: Features::default(),
        }
    }

    pub fn editions(package: impl Into<String>) -> SchemaConfig {
        SchemaConfig {
            syntax: Syntax::Editions,
            ..SchemaConfig::proto3(package)
        }
    }

    pub fn for_service(service: &Service) -> SchemaConfig {
        let config = service.config();
        SchemaConfig {
            package: config.package.clone(),
            syntax: config.syntax,
            edition: config.edition,
            features: config.features,
        }
    }
}

/// Where a record or enum materialized within a set build.
#[derive(Clone, Debug)]
struct Placement {
    file: String,
    symbol: String,
}

/// Set-wide bookkeeping so each type materializes exactly once.
#[derive(Default)]
struct SetState {
    messages: HashMap<TypeId, Placement>,
    enums: HashMap<TypeId, Placement>,
    /// file -> files it imports, for cyclic-import detection.
    file_deps: HashMap<String, BTreeSet<String>>,
}

/// Synthesizes descriptors for one schema configuration.
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    config: SchemaConfig,
}

impl SchemaBuilder {
    pub fn new(config: SchemaConfig) -> SchemaBuilder {
        SchemaBuilder { config }
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    /// Build a self-contained file for one top-level record type.
    pub fn build_file(&self, root: &RecordType) -> Result<FileDescriptorProto, SchemaError> {
        self.build_file_with(root, &mut SetState::default())
    }

    /// Build one file per root, deduplicating shared types across files.
    pub fn build_set(&self, roots: &[&RecordType]) -> Result<FileDescriptorSet, SchemaError> {
        let mut state = SetState::default();
        let files = self.build_roots(roots, &mut state)?;
        Ok(FileDescriptorSet {
            file: with_well_known(files),
        })
    }

    /// Build the full descriptor set for a registered service: message
    /// files in method declaration order, the service file, then any
    /// referenced well-known files so the set is self-sufficient.
    pub fn build_service_set(&self, service: &Service) -> Result<FileDescriptorSet, SchemaError> {
        let mut state = SetState::default();
        let roots: Vec<&RecordType> = service
            .methods()
            .iter()
            .flat_map(|m| [m.input(), m.output()])
            .collect();
        let mut files = self.build_roots(&roots, &mut state)?;

        let mut name = format!(
            "{}/{}.proto",
            self.config.package,
            service.name().to_lowercase()
        );
        if files.iter().any(|f| f.name.as_deref() == Some(name.as_str())) {
            // A message type shares the lowercased service name.
            name = format!(
                "{}/{}_service.proto",
                self.config.package,
                service.name().to_lowercase()
            );
        }

        let mut dependency = BTreeSet::new();
        let mut methods = Vec::with_capacity(service.methods().len());
        for method in service.methods() {
            let mut type_ref = |root: &RecordType| -> Result<String, SchemaError> {
                let placement = state.messages.get(&root.type_id).ok_or_else(|| {
                    SchemaError::DescriptorConstructionFailure(format!(
                        "method type {} was never materialized",
                        root.name
                    ))
                })?;
                dependency.insert(placement.file.clone());
                Ok(format!(".{}.{}", self.config.package, placement.symbol))
            };
            methods.push(MethodDescriptorProto {
                name: Some(method.name().to_owned()),
                input_type: Some(type_ref(method.input())?),
                output_type: Some(type_ref(method.output())?),
                ..MethodDescriptorProto::default()
            });
        }

        let mut service_file = self.empty_file(&name);
        service_file.dependency = dependency.into_iter().collect();
        service_file.service = vec![ServiceDescriptorProto {
            name: Some(service.name().to_owned()),
            method: methods,
            ..ServiceDescriptorProto::default()
        }];
        files.push(service_file);

        debug!(
            service = service.name(),
            files = files.len(),
            "synthesized service descriptor set"
        );
        Ok(FileDescriptorSet {
            file: with_well_known(files),
        })
    }

    fn build_roots(
        &self,
        roots: &[&RecordType],
        state: &mut SetState,
    ) -> Result<Vec<FileDescriptorProto>, SchemaError> {
        let mut files = Vec::new();
        for root in roots {
            if state.messages.contains_key(&root.type_id) {
                continue;
            }
            files.push(self.build_file_with(root, state)?);
        }
        Ok(files)
    }

    fn empty_file(&self, name: &str) -> FileDescriptorProto {
        let mut file = FileDescriptorProto {
            name: Some(name.to_owned()),
            package: Some(self.config.package.clone()),
            ..FileDescriptorProto::default()
        };
        match self.config.syntax {
            Syntax::Proto3 => {
                file.syntax = Some("proto3".to_owned());
            }
            Syntax::Editions => {
                file.syntax = Some("editions".to_owned());
                file.edition = Some(edition_number(self.config.edition));
                file.options = Some(FileOptions {
                    features: Some(crate::features::file_features(&self.config.features)),
                    ..FileOptions::default()
                });
            }
        }
        file
    }

    fn build_file_with(
        &self,
        root: &RecordType,
        state: &mut SetState,
    ) -> Result<FileDescriptorProto, SchemaError> {
        let file_name = format!("{}/{}.proto", self.config.package, root.name.to_lowercase());
        let mut file = self.empty_file(&file_name);
        let mut deps: BTreeSet<String> = BTreeSet::new();
        let mut comments: Vec<(Vec<i32>, String)> = Vec::new();
        let mut pending: VecDeque<RecordType> = VecDeque::from([root.clone()]);

        while let Some(ty) = pending.pop_front() {
            if let Some(placement) = state.messages.get(&ty.type_id) {
                if placement.file != file_name {
                    self.add_dependency(&file_name, &placement.file, &mut deps, state)?;
                }
                continue;
            }
            let message_index = file.message_type.len() as i32;
            state.messages.insert(
                ty.type_id,
                Placement {
                    file: file_name.clone(),
                    symbol: ty.name.to_owned(),
                },
            );
            if let Some(doc) = ty.doc {
                comments.push((vec![4, message_index], doc.to_owned()));
            }
            let message = self.build_message(
                &ty,
                message_index,
                &file_name,
                state,
                &mut pending,
                &mut deps,
                &mut file.enum_type,
                &mut comments,
            )?;
            file.message_type.push(message);
        }

        file.dependency = deps.into_iter().collect();
        state
            .file_deps
            .insert(file_name.clone(), file.dependency.iter().cloned().collect());
        if !comments.is_empty() {
            file.source_code_info = Some(SourceCodeInfo {
                location: comments
                    .into_iter()
                    .map(|(path, text)| Location {
                        path,
                        leading_comments: Some(text),
                        ..Location::default()
                    })
                    .collect(),
            });
        }
        Ok(file)
    }

    fn add_dependency(
        &self,
        from: &str,
        to: &str,
        deps: &mut BTreeSet<String>,
        state: &SetState,
    ) -> Result<(), SchemaError> {
        if state
            .file_deps
            .get(to)
            .is_some_and(|to_deps| to_deps.contains(from))
        {
            return Err(SchemaError::CyclicImportResolution {
                file: from.to_owned(),
                symbol: to.to_owned(),
            });
        }
        deps.insert(to.to_owned());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_message(
        &self,
        ty: &RecordType,
        message_index: i32,
        file_name: &str,
        state: &mut SetState,
        pending: &mut VecDeque<RecordType>,
        deps: &mut BTreeSet<String>,
        file_enums: &mut Vec<EnumDescriptorProto>,
        comments: &mut Vec<(Vec<i32>, String)>,
    ) -> Result<DescriptorProto, SchemaError> {
        let fields = introspect(ty)?;
        let mut message = DescriptorProto {
            name: Some(ty.name.to_owned()),
            ..DescriptorProto::default()
        };
        // Field numbers are assigned in declaration order starting at 1;
        // oneof members draw from the parent counter, map entries do not.
        let mut number = 1i32;
        // (field index, field name) pairs needing a synthetic proto3 oneof.
        let mut synthetic: Vec<(usize, String)> = Vec::new();

        let mut emit = |message: &mut DescriptorProto,
                        comments: &mut Vec<(Vec<i32>, String)>,
                        descriptor: FieldDescriptorProto,
                        doc: Option<&'static str>| {
            let field_index = message.field.len() as i32;
            if let Some(doc) = doc {
                comments.push((vec![4, message_index, 2, field_index], doc.to_owned()));
            }
            message.field.push(descriptor);
        };

        for field in &fields {
            match &field.kind {
                ResolvedKind::Oneof(group) => {
                    let oneof_index = message.oneof_decl.len() as i32;
                    message.oneof_decl.push(OneofDescriptorProto {
                        name: Some(field.name.to_owned()),
                        ..OneofDescriptorProto::default()
                    });
                    let arms = introspect(group)?;
                    for arm in &arms {
                        if matches!(
                            arm.kind,
                            ResolvedKind::Repeated(_)
                                | ResolvedKind::Map { .. }
                                | ResolvedKind::Oneof(_)
                        ) {
                            return Err(SchemaError::UnsupportedFieldType {
                                message: ty.name.to_owned(),
                                field: arm.name.to_owned(),
                                detail: "oneof members must be scalar or message fields".to_owned(),
                            });
                        }
                        let mut descriptor =
                            self.field_descriptor(ty, arm, number, state, pending, deps, file_enums, file_name)?;
                        descriptor.oneof_index = Some(oneof_index);
                        emit(&mut message, comments, descriptor, arm.doc);
                        number += 1;
                    }
                }
                ResolvedKind::Map { key, value } => {
                    let entry_name = format!("{}Entry", pascal_case(field.name));
                    let mut entry = DescriptorProto {
                        name: Some(entry_name.clone()),
                        options: Some(MessageOptions {
                            map_entry: Some(true),
                            ..MessageOptions::default()
                        }),
                        ..DescriptorProto::default()
                    };
                    entry.field.push(map_key_field(*key));
                    let value_field = IntrospectedField {
                        name: "value",
                        validate: None,
                        default: None,
                        doc: None,
                        modifiers: Default::default(),
                        optional: false,
                        kind: (**value).clone(),
                    };
                    let mut value_descriptor = self.field_descriptor(
                        ty,
                        &value_field,
                        2,
                        state,
                        pending,
                        deps,
                        file_enums,
                        file_name,
                    )?;
                    value_descriptor.number = Some(2);
                    entry.field.push(value_descriptor);
                    let entry_type =
                        format!(".{}.{}.{}", self.config.package, ty.name, entry_name);
                    message.nested_type.push(entry);

                    let descriptor = FieldDescriptorProto {
                        name: Some(field.name.to_owned()),
                        number: Some(number),
                        label: Some(Label::Repeated as i32),
                        r#type: Some(Type::Message as i32),
                        type_name: Some(entry_type),
                        json_name: Some(lower_camel_case(field.name)),
                        ..FieldDescriptorProto::default()
                    };
                    emit(&mut message, comments, descriptor, field.doc);
                    number += 1;
                }
                _ => {
                    let mut descriptor =
                        self.field_descriptor(ty, field, number, state, pending, deps, file_enums, file_name)?;
                    if self.config.syntax == Syntax::Proto3 && field.optional {
                        descriptor.proto3_optional = Some(true);
                        synthetic.push((message.field.len(), field.name.to_owned()));
                    }
                    emit(&mut message, comments, descriptor, field.doc);
                    number += 1;
                }
            }
        }

        // Synthetic oneofs for proto3 optional fields come after any real
        // oneof declarations, one per field, named `_<field>`.
        for (field_index, field_name) in synthetic {
            let oneof_index = message.oneof_decl.len() as i32;
            message.oneof_decl.push(OneofDescriptorProto {
                name: Some(format!("_{field_name}")),
                ..OneofDescriptorProto::default()
            });
            message.field[field_index].oneof_index = Some(oneof_index);
        }

        Ok(message)
    }

    #[allow(clippy::too_many_arguments)]
    fn field_descriptor(
        &self,
        ty: &RecordType,
        field: &IntrospectedField,
        number: i32,
        state: &mut SetState,
        pending: &mut VecDeque<RecordType>,
        deps: &mut BTreeSet<String>,
        file_enums: &mut Vec<EnumDescriptorProto>,
        file_name: &str,
    ) -> Result<FieldDescriptorProto, SchemaError> {
        let mut descriptor = FieldDescriptorProto {
            name: Some(field.name.to_owned()),
            number: Some(number),
            label: Some(Label::Optional as i32),
            json_name: Some(lower_camel_case(field.name)),
            ..FieldDescriptorProto::default()
        };

        let kind = match &field.kind {
            ResolvedKind::Repeated(inner) => {
                descriptor.label = Some(Label::Repeated as i32);
                inner.as_ref()
            }
            other => other,
        };

        match kind {
            ResolvedKind::Scalar(scalar) => {
                descriptor.r#type = Some(scalar_type(*scalar) as i32);
            }
            ResolvedKind::Enum(enum_type) => {
                descriptor.r#type = Some(Type::Enum as i32);
                descriptor.type_name =
                    Some(format!(".{}.{}", self.config.package, enum_type.name));
                match state.enums.get(&enum_type.type_id) {
                    Some(placement) => {
                        if placement.file != file_name {
                            self.add_dependency(file_name, &placement.file.clone(), deps, state)?;
                        }
                    }
                    None => {
                        state.enums.insert(
                            enum_type.type_id,
                            Placement {
                                file: file_name.to_owned(),
                                symbol: enum_type.name.to_owned(),
                            },
                        );
                        file_enums.push(EnumDescriptorProto {
                            name: Some(enum_type.name.to_owned()),
                            value: enum_type
                                .values
                                .iter()
                                .map(|(name, num)| EnumValueDescriptorProto {
                                    name: Some((*name).to_owned()),
                                    number: Some(*num),
                                    ..EnumValueDescriptorProto::default()
                                })
                                .collect(),
                            ..EnumDescriptorProto::default()
                        });
                    }
                }
            }
            ResolvedKind::Message(target) => {
                descriptor.r#type = Some(Type::Message as i32);
                descriptor.type_name = Some(format!(".{}.{}", self.config.package, target.name));
                pending.push_back(target.clone());
            }
            ResolvedKind::WellKnown(wk) => {
                descriptor.r#type = Some(Type::Message as i32);
                descriptor.type_name = Some(wk.type_name().to_owned());
                deps.insert(wk.import_path().to_owned());
            }
            ResolvedKind::Repeated(_) | ResolvedKind::Map { .. } | ResolvedKind::Oneof(_) => {
                return Err(SchemaError::UnsupportedFieldType {
                    message: ty.name.to_owned(),
                    field: field.name.to_owned(),
                    detail: "unexpected nested composite".to_owned(),
                });
            }
        }

        match self.config.syntax {
            Syntax::Proto3 => {
                if field.default.is_some() {
                    return Err(SchemaError::InvalidModifierCombination {
                        message: ty.name.to_owned(),
                        field: field.name.to_owned(),
                        detail: "default values require editions syntax".to_owned(),
                    });
                }
                if field.modifiers.unpacked {
                    descriptor.options = Some(FieldOptions {
                        packed: Some(false),
                        ..FieldOptions::default()
                    });
                }
            }
            Syntax::Editions => {
                if let Some(default) = field.default {
                    descriptor.default_value = Some(default.to_owned());
                }
                // An `Option<T>` wrapper asks for explicit presence just
                // like the `optional` modifier does.
                let mut modifiers = field.modifiers;
                modifiers.optional |= field.optional;
                if let Some(overrides) =
                    crate::features::field_overrides(&self.config.features, &modifiers)
                {
                    descriptor.options = Some(FieldOptions {
                        features: Some(overrides),
                        ..FieldOptions::default()
                    });
                }
            }
        }

        Ok(descriptor)
    }
}

/// Append referenced well-known descriptors so the set is self-sufficient.
fn with_well_known(mut files: Vec<FileDescriptorProto>) -> Vec<FileDescriptorProto> {
    let needed: BTreeSet<String> = files
        .iter()
        .flat_map(|f| f.dependency.iter())
        .filter(|d| d.starts_with("google/protobuf/"))
        .cloned()
        .collect();
    for path in needed {
        if files.iter().any(|f| f.name.as_deref() == Some(path.as_str())) {
            continue;
        }
        if let Some(fd) = well_known::well_known_file(&path) {
            files.push(fd.clone());
        }
    }
    files
}

fn edition_number(edition: Edition) -> i32 {
    match edition {
        Edition::Edition2023 => prost_types::Edition::Edition2023 as i32,
        Edition::Edition2024 => prost_types::Edition::Edition2024 as i32,
    }
}

fn scalar_type(scalar: Scalar) -> Type {
    match scalar {
        Scalar::Bool => Type::Bool,
        Scalar::Int32 => Type::Int32,
        Scalar::Int64 => Type::Int64,
        Scalar::UInt32 => Type::Uint32,
        Scalar::UInt64 => Type::Uint64,
        Scalar::Float => Type::Float,
        Scalar::Double => Type::Double,
        Scalar::String => Type::String,
        Scalar::Bytes => Type::Bytes,
    }
}

fn map_key_field(kind: MapKeyKind) -> FieldDescriptorProto {
    let ty = match kind {
        MapKeyKind::Bool => Type::Bool,
        MapKeyKind::Int32 => Type::Int32,
        MapKeyKind::Int64 => Type::Int64,
        MapKeyKind::UInt32 => Type::Uint32,
        MapKeyKind::UInt64 => Type::Uint64,
        MapKeyKind::String => Type::String,
    };
    FieldDescriptorProto {
        name: Some("key".to_owned()),
        number: Some(1),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        json_name: Some("key".to_owned()),
        ..FieldDescriptorProto::default()
    }
}

/// `user_id` -> `userId`, the canonical JSON name mapping.
pub(crate) fn lower_camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = false;
    for ch in snake.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// `session_tokens` -> `SessionTokens`, for map entry message names.
fn pascal_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper_next = true;
    for ch in snake.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
