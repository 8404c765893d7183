//! Error rendering per protocol.
//!
//! gRPC carries status in HTTP/2 trailers, gRPC-Web in a trailer frame,
//! Connect and plain HTTP in the response status plus a JSON body.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use causeway::{Metadata, RpcError};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::json;

/// Bytes percent-encoded inside `grpc-message`: controls, `%`, and DEL;
/// non-ASCII encodes by construction.
const GRPC_MESSAGE_SET: &AsciiSet = &CONTROLS.add(b'%').add(0x7f);

/// Encode a status message for the `grpc-message` trailer.
pub fn encode_grpc_message(message: &str) -> String {
    utf8_percent_encode(message, GRPC_MESSAGE_SET).to_string()
}

/// The `grpc-status`/`grpc-message` pairs for a reply, plus staged
/// application trailers.
pub fn grpc_trailers(
    result: Result<(), &RpcError>,
    staged: &Metadata,
) -> Vec<(String, String)> {
    let mut trailers = Vec::new();
    match result {
        Ok(()) => trailers.push(("grpc-status".to_owned(), "0".to_owned())),
        Err(err) => {
            trailers.push(("grpc-status".to_owned(), err.code.value().to_string()));
            if !err.message.is_empty() {
                trailers.push((
                    "grpc-message".to_owned(),
                    encode_grpc_message(&err.message),
                ));
            }
        }
    }
    for (key, value) in staged.iter() {
        trailers.push((key.to_owned(), value.to_owned()));
    }
    trailers
}

/// The Connect / plain-HTTP error body:
/// `{ "code": "...", "message": "...", "details": [...] }`.
pub fn error_body(err: &RpcError) -> Vec<u8> {
    let mut body = json!({
        "code": err.code.name(),
        "message": err.message,
    });
    if !err.details.is_empty() {
        let details: Vec<serde_json::Value> = err
            .details
            .iter()
            .map(|detail| {
                let mut entry = json!({
                    "type": detail.type_url,
                    "value": BASE64_STANDARD.encode(&detail.value),
                });
                if let Some(debug) = &detail.debug {
                    entry["debug"] = debug.clone();
                }
                entry
            })
            .collect();
        body["details"] = serde_json::Value::Array(details);
    }
    serde_json::to_vec(&body).unwrap_or_else(|_| b"{\"code\":\"internal\"}".to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway::{Code, ErrorDetail};

    #[test]
    fn grpc_message_is_percent_encoded() {
        assert_eq!(encode_grpc_message("plain"), "plain");
        assert_eq!(encode_grpc_message("a b"), "a b");
        assert_eq!(encode_grpc_message("50%"), "50%25");
        assert_eq!(encode_grpc_message("line\nbreak"), "line%0Abreak");
    }

    #[test]
    fn success_trailers_carry_status_zero() {
        let trailers = grpc_trailers(Ok(()), &Metadata::new());
        assert_eq!(trailers, vec![("grpc-status".to_owned(), "0".to_owned())]);
    }

    #[test]
    fn error_trailers_carry_code_and_message() {
        let err = RpcError::new(Code::NotFound, "no such user");
        let trailers = grpc_trailers(Err(&err), &Metadata::new());
        assert!(trailers.contains(&("grpc-status".to_owned(), "5".to_owned())));
        assert!(trailers.contains(&("grpc-message".to_owned(), "no such user".to_owned())));
    }

    #[test]
    fn connect_body_includes_details() {
        let err = RpcError::new(Code::InvalidArgument, "bad email").with_detail(ErrorDetail {
            type_url: "type.googleapis.com/example.Violation".to_owned(),
            value: vec![1, 2],
            debug: Some(json!({"field": "email"})),
        });
        let body: serde_json::Value = serde_json::from_slice(&error_body(&err)).unwrap();
        assert_eq!(body["code"], "invalid_argument");
        assert_eq!(body["message"], "bad email");
        assert_eq!(body["details"][0]["debug"]["field"], "email");
    }
}
