//! Descriptor-to-source printing.
//!
//! Produces `.proto` text equivalent to the synthesized descriptors, with
//! two fixups a stock printer gets wrong for this descriptor shape: the
//! Editions syntax line (`syntax = "editions";` becomes
//! `edition = "<year>";` for known years) and the leading `optional`
//! keyword on proto3-optional fields, applied recursively through nested
//! messages.

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    OneofDescriptorProto, ServiceDescriptorProto,
};

use crate::error::ExportError;

/// Controls which files are printed and which option lines ride along.
#[derive(Clone, Debug, Default)]
pub struct ExportOptions {
    /// Also print the `google/protobuf/*` files present in the set.
    pub include_well_known: bool,
    /// Opaque `option <name> = "<value>";` lines placed immediately after
    /// the `package` line, preserved in insertion order.
    pub language_packages: Vec<(String, String)>,
}

/// One printed source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtoFile {
    pub name: String,
    pub content: String,
}

/// Print every file of the set.
pub fn export_set(
    set: &prost_types::FileDescriptorSet,
    options: &ExportOptions,
) -> Result<Vec<ProtoFile>, ExportError> {
    let mut files = Vec::with_capacity(set.file.len());
    for file in &set.file {
        let name = file
            .name
            .clone()
            .ok_or_else(|| ExportError::Print("file descriptor has no name".to_owned()))?;
        if !options.include_well_known && name.starts_with("google/protobuf/") {
            continue;
        }
        files.push(ProtoFile {
            content: print_file(file, options)?,
            name,
        });
    }
    Ok(files)
}

fn print_file(
    file: &FileDescriptorProto,
    options: &ExportOptions,
) -> Result<String, ExportError> {
    let mut out = String::new();

    out.push_str(&syntax_line(file));
    out.push('\n');

    let package = file.package.as_deref().unwrap_or("");
    if !package.is_empty() {
        out.push('\n');
        out.push_str(&format!("package {package};\n"));
    }

    let option_lines = language_option_lines(file, options);
    if !option_lines.is_empty() {
        out.push('\n');
        for line in &option_lines {
            out.push_str(line);
            out.push('\n');
        }
    }

    if !file.dependency.is_empty() {
        out.push('\n');
        for dep in &file.dependency {
            out.push_str(&format!("import \"{dep}\";\n"));
        }
    }

    for message in &file.message_type {
        out.push('\n');
        out.push_str(&print_message(message, package, 0)?);
        out.push('\n');
    }

    for enum_type in &file.enum_type {
        out.push('\n');
        out.push_str(&print_enum(enum_type, 0));
        out.push('\n');
    }

    for service in &file.service {
        out.push('\n');
        out.push_str(&print_service(service, package));
        out.push('\n');
    }

    Ok(out)
}

/// The Editions syntax fixup: a populated edition with a known year prints
/// as an `edition` line; unknown or test editions keep the raw syntax line.
fn syntax_line(file: &FileDescriptorProto) -> String {
    if let Some(edition) = file.edition {
        let year = match prost_types::Edition::try_from(edition) {
            Ok(prost_types::Edition::Edition2023) => Some("2023"),
            Ok(prost_types::Edition::Edition2024) => Some("2024"),
            _ => None,
        };
        if let Some(year) = year {
            return format!("edition = \"{year}\";");
        }
    }
    format!(
        "syntax = \"{}\";",
        file.syntax.as_deref().unwrap_or("proto3")
    )
}

fn language_option_lines(file: &FileDescriptorProto, options: &ExportOptions) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(opts) = &file.options {
        if let Some(v) = &opts.go_package {
            lines.push(format!("option go_package = \"{v}\";"));
        }
        if let Some(v) = &opts.java_package {
            lines.push(format!("option java_package = \"{v}\";"));
        }
        if let Some(v) = &opts.csharp_namespace {
            lines.push(format!("option csharp_namespace = \"{v}\";"));
        }
        if let Some(v) = &opts.php_namespace {
            lines.push(format!("option php_namespace = \"{v}\";"));
        }
        if let Some(v) = &opts.ruby_package {
            lines.push(format!("option ruby_package = \"{v}\";"));
        }
        if let Some(v) = &opts.objc_class_prefix {
            lines.push(format!("option objc_class_prefix = \"{v}\";"));
        }
    }
    for (name, value) in &options.language_packages {
        lines.push(format!("option {name} = \"{value}\";"));
    }
    lines
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn print_message(
    message: &DescriptorProto,
    package: &str,
    depth: usize,
) -> Result<String, ExportError> {
    let mut out = String::new();
    indent(&mut out, depth);
    out.push_str(&format!(
        "message {} {{\n",
        message.name.as_deref().unwrap_or("")
    ));

    let synthetic: Vec<bool> = message
        .oneof_decl
        .iter()
        .enumerate()
        .map(|(index, _)| is_synthetic_oneof(message, index as i32))
        .collect();

    // Plain fields and proto3-optional fields, in declaration order.
    for field in &message.field {
        let in_real_oneof = field
            .oneof_index
            .is_some_and(|i| !synthetic.get(i as usize).copied().unwrap_or(false));
        if in_real_oneof {
            continue;
        }
        indent(&mut out, depth + 1);
        out.push_str(&print_field(field, message, package)?);
        out.push('\n');
    }

    // Real oneof blocks.
    for (index, decl) in message.oneof_decl.iter().enumerate() {
        if synthetic[index] {
            continue;
        }
        out.push_str(&print_oneof(decl, index as i32, message, package, depth + 1)?);
    }

    // Nested messages, skipping synthesized map entries.
    for nested in &message.nested_type {
        if nested
            .options
            .as_ref()
            .and_then(|o| o.map_entry)
            .unwrap_or(false)
        {
            continue;
        }
        out.push_str(&print_message(nested, package, depth + 1)?);
    }

    for nested_enum in &message.enum_type {
        out.push_str(&print_enum(nested_enum, depth + 1));
    }

    indent(&mut out, depth);
    out.push_str("}\n");
    Ok(out)
}

fn print_oneof(
    decl: &OneofDescriptorProto,
    index: i32,
    message: &DescriptorProto,
    package: &str,
    depth: usize,
) -> Result<String, ExportError> {
    let mut out = String::new();
    indent(&mut out, depth);
    out.push_str(&format!("oneof {} {{\n", decl.name.as_deref().unwrap_or("")));
    for field in &message.field {
        if field.oneof_index == Some(index) {
            indent(&mut out, depth + 1);
            out.push_str(&print_field(field, message, package)?);
            out.push('\n');
        }
    }
    indent(&mut out, depth);
    out.push_str("}\n");
    Ok(out)
}

fn print_field(
    field: &FieldDescriptorProto,
    message: &DescriptorProto,
    package: &str,
) -> Result<String, ExportError> {
    // Map fields print with map<,> syntax drawn from their entry message.
    if let Some(entry) = map_entry_for(field, message) {
        let key = entry
            .field
            .iter()
            .find(|f| f.number == Some(1))
            .map(|f| type_text(f, package))
            .transpose()?
            .unwrap_or_default();
        let value = entry
            .field
            .iter()
            .find(|f| f.number == Some(2))
            .map(|f| type_text(f, package))
            .transpose()?
            .unwrap_or_default();
        return Ok(format!(
            "map<{key}, {value}> {} = {}{};",
            field.name.as_deref().unwrap_or(""),
            field.number.unwrap_or_default(),
            field_options_text(field),
        ));
    }

    let mut prefix = String::new();
    if field.label == Some(Label::Repeated as i32) {
        prefix.push_str("repeated ");
    } else if field.proto3_optional.unwrap_or(false) {
        // The proto3-optional fixup: the textual form leads with the
        // keyword even though the descriptor models a synthetic oneof.
        prefix.push_str("optional ");
    }

    Ok(format!(
        "{prefix}{} {} = {}{};",
        type_text(field, package)?,
        field.name.as_deref().unwrap_or(""),
        field.number.unwrap_or_default(),
        field_options_text(field),
    ))
}

fn field_options_text(field: &FieldDescriptorProto) -> String {
    let mut entries = Vec::new();
    if let Some(default) = &field.default_value {
        entries.push(format!("default = {default}"));
    }
    if let Some(options) = &field.options {
        if options.packed == Some(false) {
            entries.push("packed = false".to_owned());
        }
        if let Some(features) = &options.features {
            if let Some(presence) = features.field_presence {
                let name = match prost_types::feature_set::FieldPresence::try_from(presence) {
                    Ok(p) => format!("{p:?}"),
                    Err(_) => presence.to_string(),
                };
                entries.push(format!("features.field_presence = {}", screaming(&name)));
            }
            if let Some(encoding) = features.repeated_field_encoding {
                let name = match prost_types::feature_set::RepeatedFieldEncoding::try_from(encoding)
                {
                    Ok(e) => format!("{e:?}"),
                    Err(_) => encoding.to_string(),
                };
                entries.push(format!(
                    "features.repeated_field_encoding = {}",
                    screaming(&name)
                ));
            }
        }
    }
    if entries.is_empty() {
        String::new()
    } else {
        format!(" [{}]", entries.join(", "))
    }
}

/// `LegacyRequired` -> `LEGACY_REQUIRED`.
fn screaming(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(ch.to_uppercase());
    }
    out
}

fn map_entry_for<'a>(
    field: &FieldDescriptorProto,
    message: &'a DescriptorProto,
) -> Option<&'a DescriptorProto> {
    if field.label != Some(Label::Repeated as i32) {
        return None;
    }
    let type_name = field.type_name.as_deref()?;
    let simple = type_name.rsplit('.').next()?;
    message.nested_type.iter().find(|nested| {
        nested.name.as_deref() == Some(simple)
            && nested
                .options
                .as_ref()
                .and_then(|o| o.map_entry)
                .unwrap_or(false)
    })
}

fn type_text(field: &FieldDescriptorProto, package: &str) -> Result<String, ExportError> {
    let ty = field
        .r#type
        .and_then(|t| Type::try_from(t).ok())
        .ok_or_else(|| {
            ExportError::Print(format!(
                "field {} has no type",
                field.name.as_deref().unwrap_or("")
            ))
        })?;
    Ok(match ty {
        Type::Double => "double".to_owned(),
        Type::Float => "float".to_owned(),
        Type::Int64 => "int64".to_owned(),
        Type::Uint64 => "uint64".to_owned(),
        Type::Int32 => "int32".to_owned(),
        Type::Fixed64 => "fixed64".to_owned(),
        Type::Fixed32 => "fixed32".to_owned(),
        Type::Bool => "bool".to_owned(),
        Type::String => "string".to_owned(),
        Type::Bytes => "bytes".to_owned(),
        Type::Uint32 => "uint32".to_owned(),
        Type::Sfixed32 => "sfixed32".to_owned(),
        Type::Sfixed64 => "sfixed64".to_owned(),
        Type::Sint32 => "sint32".to_owned(),
        Type::Sint64 => "sint64".to_owned(),
        Type::Group => {
            return Err(ExportError::Print("groups are not supported".to_owned()))
        }
        Type::Message | Type::Enum => {
            short_name(field.type_name.as_deref().unwrap_or(""), package)
        }
    })
}

/// Same-package references drop the package prefix; foreign references keep
/// the fully qualified form without the leading dot.
fn short_name(full: &str, package: &str) -> String {
    let full = full.trim_start_matches('.');
    if package.is_empty() {
        return full.to_owned();
    }
    match full.strip_prefix(&format!("{package}.")) {
        Some(short) => short.to_owned(),
        None => full.to_owned(),
    }
}

fn print_enum(enum_type: &EnumDescriptorProto, depth: usize) -> String {
    let mut out = String::new();
    indent(&mut out, depth);
    out.push_str(&format!(
        "enum {} {{\n",
        enum_type.name.as_deref().unwrap_or("")
    ));
    for value in &enum_type.value {
        indent(&mut out, depth + 1);
        out.push_str(&format!(
            "{} = {};\n",
            value.name.as_deref().unwrap_or(""),
            value.number.unwrap_or_default()
        ));
    }
    indent(&mut out, depth);
    out.push_str("}\n");
    out
}

fn print_service(service: &ServiceDescriptorProto, package: &str) -> String {
    let mut out = format!("service {} {{\n", service.name.as_deref().unwrap_or(""));
    for method in &service.method {
        out.push_str(&format!(
            "  rpc {}({}) returns ({});\n",
            method.name.as_deref().unwrap_or(""),
            short_name(method.input_type.as_deref().unwrap_or(""), package),
            short_name(method.output_type.as_deref().unwrap_or(""), package),
        ));
    }
    out.push_str("}\n");
    out
}

/// A synthetic oneof backs exactly one proto3-optional field.
fn is_synthetic_oneof(message: &DescriptorProto, index: i32) -> bool {
    let members: Vec<&FieldDescriptorProto> = message
        .field
        .iter()
        .filter(|f| f.oneof_index == Some(index))
        .collect();
    members.len() == 1 && members[0].proto3_optional.unwrap_or(false)
}
