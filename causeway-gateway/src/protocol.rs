//! Protocol classification.
//!
//! One endpoint serves four protocols; the classifier is deterministic and
//! runs in the priority order the dispatch table documents: gRPC first
//! (HTTP/2 prior knowledge plus a `application/grpc*` content type that is
//! not gRPC-Web), then gRPC-Web, then Connect, then plain HTTP/JSON.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, Version};

/// The wire protocol a request speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Grpc,
    GrpcWeb,
    Connect,
    Plain,
}

impl Protocol {
    /// Whether payloads travel inside 5-byte prefixed frames.
    pub fn framed(&self) -> bool {
        matches!(self, Protocol::Grpc | Protocol::GrpcWeb)
    }

    /// Whether the HTTP status is pinned to 200 and errors ride elsewhere.
    pub fn always_ok(&self) -> bool {
        self.framed()
    }
}

/// Classify a request from its HTTP version and headers.
pub fn classify(version: Version, headers: &HeaderMap) -> Protocol {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if version == Version::HTTP_2
        && content_type.starts_with("application/grpc")
        && !content_type.starts_with("application/grpc-web")
    {
        return Protocol::Grpc;
    }
    if content_type.starts_with("application/grpc-web") {
        return Protocol::GrpcWeb;
    }
    if headers
        .get("connect-protocol-version")
        .and_then(|v| v.to_str().ok())
        == Some("1")
        || content_type == "application/proto"
        || content_type == "application/protobuf"
    {
        return Protocol::Connect;
    }
    Protocol::Plain
}

/// The content type a response mirrors back for this protocol.
pub fn response_content_type(protocol: Protocol, request_content_type: &str) -> String {
    let essence = request_content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match protocol {
        Protocol::Grpc => {
            if essence.is_empty() || essence == "application/grpc" {
                "application/grpc".to_owned()
            } else {
                essence
            }
        }
        Protocol::GrpcWeb => {
            if essence.is_empty() {
                "application/grpc-web+proto".to_owned()
            } else {
                essence
            }
        }
        Protocol::Connect | Protocol::Plain => {
            if essence == "application/proto" || essence == "application/protobuf" {
                essence
            } else {
                "application/json".to_owned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(content_type: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        if !content_type.is_empty() {
            map.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        }
        map
    }

    #[test]
    fn grpc_requires_http2_prior_knowledge() {
        assert_eq!(
            classify(Version::HTTP_2, &headers("application/grpc")),
            Protocol::Grpc
        );
        assert_eq!(
            classify(Version::HTTP_2, &headers("application/grpc+proto")),
            Protocol::Grpc
        );
        // Same content type over HTTP/1.1 cannot be gRPC.
        assert_eq!(
            classify(Version::HTTP_11, &headers("application/grpc")),
            Protocol::Plain
        );
    }

    #[test]
    fn grpc_web_wins_on_any_http_version() {
        assert_eq!(
            classify(Version::HTTP_11, &headers("application/grpc-web+proto")),
            Protocol::GrpcWeb
        );
        assert_eq!(
            classify(Version::HTTP_2, &headers("application/grpc-web+json")),
            Protocol::GrpcWeb
        );
    }

    #[test]
    fn connect_is_detected_by_header_or_proto_body() {
        let mut with_header = headers("application/json");
        with_header.insert(
            "connect-protocol-version",
            HeaderValue::from_static("1"),
        );
        assert_eq!(classify(Version::HTTP_11, &with_header), Protocol::Connect);
        assert_eq!(
            classify(Version::HTTP_11, &headers("application/proto")),
            Protocol::Connect
        );
    }

    #[test]
    fn bare_json_falls_back_to_plain() {
        assert_eq!(
            classify(Version::HTTP_11, &headers("application/json")),
            Protocol::Plain
        );
        assert_eq!(classify(Version::HTTP_11, &headers("")), Protocol::Plain);
    }

    #[test]
    fn responses_mirror_the_request_content_type() {
        assert_eq!(
            response_content_type(Protocol::Grpc, "application/grpc+proto"),
            "application/grpc+proto"
        );
        assert_eq!(
            response_content_type(Protocol::GrpcWeb, "application/grpc-web+json"),
            "application/grpc-web+json"
        );
        assert_eq!(
            response_content_type(Protocol::Connect, "application/json; charset=utf-8"),
            "application/json"
        );
        assert_eq!(
            response_content_type(Protocol::Connect, "application/proto"),
            "application/proto"
        );
    }
}
