//! Process-wide registry of well-known type descriptors.
//!
//! The synthesized descriptor sets import well-known files by path; this
//! module materializes those files once so every exported set is
//! self-sufficient without a bundled descriptor database.

use std::collections::HashMap;
use std::sync::OnceLock;

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, MessageOptions, OneofDescriptorProto,
};

/// Look up a well-known file descriptor by import path.
pub fn well_known_file(path: &str) -> Option<&'static FileDescriptorProto> {
    registry().get(path)
}

/// All registered well-known import paths, sorted.
pub fn well_known_paths() -> Vec<&'static str> {
    let mut paths: Vec<&'static str> = registry().keys().copied().collect();
    paths.sort_unstable();
    paths
}

fn registry() -> &'static HashMap<&'static str, FileDescriptorProto> {
    static REGISTRY: OnceLock<HashMap<&'static str, FileDescriptorProto>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        HashMap::from([
            ("google/protobuf/timestamp.proto", timestamp_file()),
            ("google/protobuf/duration.proto", duration_file()),
            ("google/protobuf/empty.proto", empty_file()),
            ("google/protobuf/struct.proto", struct_file()),
            ("google/protobuf/field_mask.proto", field_mask_file()),
            ("google/protobuf/any.proto", any_file()),
        ])
    })
}

fn file(name: &str, messages: Vec<DescriptorProto>) -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(name.to_owned()),
        package: Some("google.protobuf".to_owned()),
        message_type: messages,
        syntax: Some("proto3".to_owned()),
        ..FileDescriptorProto::default()
    }
}

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_owned()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        json_name: Some(json_name(name)),
        ..FieldDescriptorProto::default()
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_owned()),
        ..field(name, number, Type::Message)
    }
}

fn repeated(mut f: FieldDescriptorProto) -> FieldDescriptorProto {
    f.label = Some(Label::Repeated as i32);
    f
}

fn in_oneof(mut f: FieldDescriptorProto, index: i32) -> FieldDescriptorProto {
    f.oneof_index = Some(index);
    f
}

fn json_name(snake: &str) -> String {
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

fn timestamp_file() -> FileDescriptorProto {
    file(
        "google/protobuf/timestamp.proto",
        vec![DescriptorProto {
            name: Some("Timestamp".to_owned()),
            field: vec![
                field("seconds", 1, Type::Int64),
                field("nanos", 2, Type::Int32),
            ],
            ..DescriptorProto::default()
        }],
    )
}

fn duration_file() -> FileDescriptorProto {
    file(
        "google/protobuf/duration.proto",
        vec![DescriptorProto {
            name: Some("Duration".to_owned()),
            field: vec![
                field("seconds", 1, Type::Int64),
                field("nanos", 2, Type::Int32),
            ],
            ..DescriptorProto::default()
        }],
    )
}

fn empty_file() -> FileDescriptorProto {
    file(
        "google/protobuf/empty.proto",
        vec![DescriptorProto {
            name: Some("Empty".to_owned()),
            ..DescriptorProto::default()
        }],
    )
}

fn field_mask_file() -> FileDescriptorProto {
    file(
        "google/protobuf/field_mask.proto",
        vec![DescriptorProto {
            name: Some("FieldMask".to_owned()),
            field: vec![repeated(field("paths", 1, Type::String))],
            ..DescriptorProto::default()
        }],
    )
}

fn any_file() -> FileDescriptorProto {
    file(
        "google/protobuf/any.proto",
        vec![DescriptorProto {
            name: Some("Any".to_owned()),
            field: vec![
                field("type_url", 1, Type::String),
                field("value", 2, Type::Bytes),
            ],
            ..DescriptorProto::default()
        }],
    )
}

fn struct_file() -> FileDescriptorProto {
    let fields_entry = DescriptorProto {
        name: Some("FieldsEntry".to_owned()),
        field: vec![
            field("key", 1, Type::String),
            message_field("value", 2, ".google.protobuf.Value"),
        ],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..MessageOptions::default()
        }),
        ..DescriptorProto::default()
    };

    let struct_message = DescriptorProto {
        name: Some("Struct".to_owned()),
        field: vec![repeated(message_field(
            "fields",
            1,
            ".google.protobuf.Struct.FieldsEntry",
        ))],
        nested_type: vec![fields_entry],
        ..DescriptorProto::default()
    };

    let value_message = DescriptorProto {
        name: Some("Value".to_owned()),
        field: vec![
            in_oneof(
                FieldDescriptorProto {
                    type_name: Some(".google.protobuf.NullValue".to_owned()),
                    ..field("null_value", 1, Type::Enum)
                },
                0,
            ),
            in_oneof(field("number_value", 2, Type::Double), 0),
            in_oneof(field("string_value", 3, Type::String), 0),
            in_oneof(field("bool_value", 4, Type::Bool), 0),
            in_oneof(
                message_field("struct_value", 5, ".google.protobuf.Struct"),
                0,
            ),
            in_oneof(
                message_field("list_value", 6, ".google.protobuf.ListValue"),
                0,
            ),
        ],
        oneof_decl: vec![OneofDescriptorProto {
            name: Some("kind".to_owned()),
            ..OneofDescriptorProto::default()
        }],
        ..DescriptorProto::default()
    };

    let list_value = DescriptorProto {
        name: Some("ListValue".to_owned()),
        field: vec![repeated(message_field(
            "values",
            1,
            ".google.protobuf.Value",
        ))],
        ..DescriptorProto::default()
    };

    let null_value = EnumDescriptorProto {
        name: Some("NullValue".to_owned()),
        value: vec![EnumValueDescriptorProto {
            name: Some("NULL_VALUE".to_owned()),
            number: Some(0),
            ..EnumValueDescriptorProto::default()
        }],
        ..EnumDescriptorProto::default()
    };

    FileDescriptorProto {
        enum_type: vec![null_value],
        ..file(
            "google/protobuf/struct.proto",
            vec![struct_message, value_message, list_value],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_all_well_known_imports() {
        for path in [
            "google/protobuf/timestamp.proto",
            "google/protobuf/duration.proto",
            "google/protobuf/empty.proto",
            "google/protobuf/struct.proto",
            "google/protobuf/field_mask.proto",
            "google/protobuf/any.proto",
        ] {
            let fd = well_known_file(path).unwrap();
            assert_eq!(fd.name.as_deref(), Some(path));
            assert_eq!(fd.package.as_deref(), Some("google.protobuf"));
        }
        assert!(well_known_file("google/protobuf/api.proto").is_none());
    }

    #[test]
    fn struct_file_links_value_oneof() {
        let fd = well_known_file("google/protobuf/struct.proto").unwrap();
        let value = fd
            .message_type
            .iter()
            .find(|m| m.name.as_deref() == Some("Value"))
            .unwrap();
        assert_eq!(value.oneof_decl.len(), 1);
        assert!(value.field.iter().all(|f| f.oneof_index == Some(0)));
    }
}
