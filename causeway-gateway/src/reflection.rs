//! gRPC server reflection v1, backed by the synthesized descriptor sets.
//!
//! Only the unary exchanges a reflection client needs for schema export
//! are served: `list_services`, `file_containing_symbol`, and
//! `file_by_filename`. The wire messages are hand-encoded against the
//! published `grpc.reflection.v1` field numbers; the framework cannot
//! describe them with its own synthesizer because their field numbers are
//! not sequential.

use std::collections::HashMap;

use bytes::{Buf, Bytes};
use prost::encoding::{decode_key, decode_varint, encode_key, encode_varint, skip_field, DecodeContext, WireType};
use prost::Message as _;
use prost_types::FileDescriptorSet;

/// The fixed reflection method path.
pub const REFLECTION_PATH: &str = "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo";

// ServerReflectionRequest field numbers.
const REQ_FILE_BY_FILENAME: u32 = 3;
const REQ_FILE_CONTAINING_SYMBOL: u32 = 4;
const REQ_FILE_CONTAINING_EXTENSION: u32 = 5;
const REQ_ALL_EXTENSION_NUMBERS: u32 = 6;
const REQ_LIST_SERVICES: u32 = 7;

// ServerReflectionResponse field numbers.
const RESP_VALID_HOST: u32 = 1;
const RESP_ORIGINAL_REQUEST: u32 = 2;
const RESP_FILE_DESCRIPTOR: u32 = 4;
const RESP_LIST_SERVICES: u32 = 6;
const RESP_ERROR: u32 = 7;

#[derive(Debug)]
enum ReflectionRequest {
    FileByFilename(String),
    FileContainingSymbol(String),
    ListServices,
    Unsupported(&'static str),
}

/// Immutable reflection state shared by all requests.
#[derive(Debug, Default)]
pub struct ReflectionService {
    /// Fully qualified service names, registration order.
    services: Vec<String>,
    /// File name -> (encoded FileDescriptorProto, dependency names).
    files: HashMap<String, (Vec<u8>, Vec<String>)>,
    /// Symbol -> file name.
    symbols: HashMap<String, String>,
}

impl ReflectionService {
    pub fn new() -> ReflectionService {
        ReflectionService::default()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Index one service's descriptor set.
    pub fn add_service(&mut self, service_name: &str, set: &FileDescriptorSet) {
        self.services.push(service_name.to_owned());
        for file in &set.file {
            let Some(file_name) = file.name.clone() else {
                continue;
            };
            self.files
                .entry(file_name.clone())
                .or_insert_with(|| (file.encode_to_vec(), file.dependency.clone()));

            let package = file.package.as_deref().unwrap_or("");
            for message in &file.message_type {
                index_message(package, message, &file_name, &mut self.symbols);
            }
            for enum_type in &file.enum_type {
                if let Some(name) = &enum_type.name {
                    self.symbols
                        .insert(qualified(package, name), file_name.clone());
                }
            }
            for service in &file.service {
                let Some(name) = &service.name else { continue };
                let service_symbol = qualified(package, name);
                for method in &service.method {
                    if let Some(method_name) = &method.name {
                        self.symbols.insert(
                            format!("{service_symbol}.{method_name}"),
                            file_name.clone(),
                        );
                    }
                }
                self.symbols.insert(service_symbol, file_name.clone());
            }
        }
    }

    /// Handle one unframed request message; returns the response message.
    pub fn handle(&self, request: &[u8]) -> Vec<u8> {
        let parsed = parse_request(request);
        let mut response = Vec::new();
        encode_string(RESP_VALID_HOST, "", &mut response);
        // The original request is echoed back verbatim.
        encode_key(RESP_ORIGINAL_REQUEST, WireType::LengthDelimited, &mut response);
        encode_varint(request.len() as u64, &mut response);
        response.extend_from_slice(request);

        match parsed {
            Ok(ReflectionRequest::ListServices) => {
                let mut list = Vec::new();
                for service in &self.services {
                    let mut entry = Vec::new();
                    encode_string(1, service, &mut entry);
                    encode_key(1, WireType::LengthDelimited, &mut list);
                    encode_varint(entry.len() as u64, &mut list);
                    list.extend_from_slice(&entry);
                }
                encode_key(RESP_LIST_SERVICES, WireType::LengthDelimited, &mut response);
                encode_varint(list.len() as u64, &mut response);
                response.extend_from_slice(&list);
            }
            Ok(ReflectionRequest::FileContainingSymbol(symbol)) => {
                match self.symbols.get(&symbol) {
                    Some(file) => self.encode_file_response(file, &mut response),
                    None => encode_error(
                        causeway::Code::NotFound,
                        &format!("symbol {symbol} not found"),
                        &mut response,
                    ),
                }
            }
            Ok(ReflectionRequest::FileByFilename(name)) => {
                if self.files.contains_key(&name) {
                    self.encode_file_response(&name, &mut response);
                } else {
                    encode_error(
                        causeway::Code::NotFound,
                        &format!("file {name} not found"),
                        &mut response,
                    );
                }
            }
            Ok(ReflectionRequest::Unsupported(what)) => encode_error(
                causeway::Code::Unimplemented,
                &format!("{what} is not supported"),
                &mut response,
            ),
            Err(detail) => encode_error(causeway::Code::InvalidArgument, &detail, &mut response),
        }
        response
    }

    /// FileDescriptorResponse: the named file plus its transitive
    /// dependencies, each as encoded FileDescriptorProto bytes.
    fn encode_file_response(&self, file_name: &str, out: &mut Vec<u8>) {
        let mut ordered = Vec::new();
        let mut pending = vec![file_name.to_owned()];
        let mut seen = std::collections::HashSet::new();
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some((encoded, deps)) = self.files.get(&name) {
                ordered.push(encoded);
                pending.extend(deps.iter().cloned());
            }
        }

        let mut payload = Vec::new();
        for encoded in ordered {
            encode_key(1, WireType::LengthDelimited, &mut payload);
            encode_varint(encoded.len() as u64, &mut payload);
            payload.extend_from_slice(encoded);
        }
        encode_key(RESP_FILE_DESCRIPTOR, WireType::LengthDelimited, out);
        encode_varint(payload.len() as u64, out);
        out.extend_from_slice(&payload);
    }
}

fn index_message(
    scope: &str,
    message: &prost_types::DescriptorProto,
    file_name: &str,
    symbols: &mut HashMap<String, String>,
) {
    let Some(name) = &message.name else { return };
    let symbol = qualified(scope, name);
    for nested in &message.nested_type {
        index_message(&symbol, nested, file_name, symbols);
    }
    symbols.insert(symbol, file_name.to_owned());
}

fn qualified(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{scope}.{name}")
    }
}

fn parse_request(request: &[u8]) -> Result<ReflectionRequest, String> {
    let mut buf = Bytes::copy_from_slice(request);
    let mut parsed = None;
    while buf.has_remaining() {
        let (tag, wire_type) = decode_key(&mut buf).map_err(|e| e.to_string())?;
        match (tag, wire_type) {
            (REQ_FILE_BY_FILENAME, WireType::LengthDelimited) => {
                parsed = Some(ReflectionRequest::FileByFilename(read_string(&mut buf)?));
            }
            (REQ_FILE_CONTAINING_SYMBOL, WireType::LengthDelimited) => {
                parsed = Some(ReflectionRequest::FileContainingSymbol(read_string(
                    &mut buf,
                )?));
            }
            (REQ_LIST_SERVICES, WireType::LengthDelimited) => {
                read_string(&mut buf)?;
                parsed = Some(ReflectionRequest::ListServices);
            }
            (REQ_FILE_CONTAINING_EXTENSION, _) => {
                skip_field(wire_type, tag, &mut buf, DecodeContext::default())
                    .map_err(|e| e.to_string())?;
                parsed = Some(ReflectionRequest::Unsupported("file_containing_extension"));
            }
            (REQ_ALL_EXTENSION_NUMBERS, _) => {
                skip_field(wire_type, tag, &mut buf, DecodeContext::default())
                    .map_err(|e| e.to_string())?;
                parsed = Some(ReflectionRequest::Unsupported(
                    "all_extension_numbers_of_type",
                ));
            }
            _ => {
                skip_field(wire_type, tag, &mut buf, DecodeContext::default())
                    .map_err(|e| e.to_string())?;
            }
        }
    }
    parsed.ok_or_else(|| "request carries no message_request".to_owned())
}

fn read_string(buf: &mut Bytes) -> Result<String, String> {
    let len = decode_varint(buf).map_err(|e| e.to_string())? as usize;
    if len > buf.remaining() {
        return Err("truncated string".to_owned());
    }
    String::from_utf8(buf.copy_to_bytes(len).to_vec()).map_err(|e| e.to_string())
}

fn encode_string(tag: u32, value: &str, out: &mut Vec<u8>) {
    encode_key(tag, WireType::LengthDelimited, out);
    encode_varint(value.len() as u64, out);
    out.extend_from_slice(value.as_bytes());
}

fn encode_error(code: causeway::Code, message: &str, out: &mut Vec<u8>) {
    let mut payload = Vec::new();
    encode_key(1, WireType::Varint, &mut payload);
    encode_varint(code.value() as u64, &mut payload);
    encode_string(2, message, &mut payload);
    encode_key(RESP_ERROR, WireType::LengthDelimited, out);
    encode_varint(payload.len() as u64, out);
    out.extend_from_slice(&payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> FileDescriptorSet {
        FileDescriptorSet {
            file: vec![prost_types::FileDescriptorProto {
                name: Some("echo.v1/echo.proto".to_owned()),
                package: Some("echo.v1".to_owned()),
                message_type: vec![prost_types::DescriptorProto {
                    name: Some("Echo".to_owned()),
                    ..prost_types::DescriptorProto::default()
                }],
                service: vec![prost_types::ServiceDescriptorProto {
                    name: Some("EchoService".to_owned()),
                    ..prost_types::ServiceDescriptorProto::default()
                }],
                syntax: Some("proto3".to_owned()),
                ..prost_types::FileDescriptorProto::default()
            }],
        }
    }

    fn service() -> ReflectionService {
        let mut svc = ReflectionService::new();
        svc.add_service("echo.v1.EchoService", &sample_set());
        svc
    }

    fn request(tag: u32, value: &str) -> Vec<u8> {
        let mut out = Vec::new();
        encode_string(tag, value, &mut out);
        out
    }

    #[test]
    fn list_services_returns_registered_names() {
        let response = service().handle(&request(REQ_LIST_SERVICES, ""));
        let text = String::from_utf8_lossy(&response);
        assert!(text.contains("echo.v1.EchoService"));
    }

    #[test]
    fn file_containing_symbol_finds_messages_and_services() {
        let svc = service();
        for symbol in ["echo.v1.Echo", "echo.v1.EchoService"] {
            let response = svc.handle(&request(REQ_FILE_CONTAINING_SYMBOL, symbol));
            let text = String::from_utf8_lossy(&response);
            assert!(
                text.contains("echo.v1/echo.proto"),
                "symbol {symbol} should resolve"
            );
        }
    }

    #[test]
    fn unknown_symbol_yields_not_found() {
        let response = service().handle(&request(REQ_FILE_CONTAINING_SYMBOL, "nope.Nope"));
        let text = String::from_utf8_lossy(&response);
        assert!(text.contains("not found"));
    }
}
