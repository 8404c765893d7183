//! Request routing and the per-method dispatch state machine.
//!
//! One handler is mounted per fully qualified method path. Every request
//! walks the same transitions: classify protocol, select codec, read and
//! unframe the body, decode, validate, invoke with a derived context,
//! encode, reframe, and finish headers/trailers. Each transition is pure;
//! failures short-circuit onto the protocol's error surface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use causeway::service::ValueHandler;
use causeway::{
    cancellation, Cancellation, CancellationHandle, Code, Context, Metadata, RpcError, Service,
};
use causeway_codec::{wire_format_for, MethodCodecs, SchemaPool, Validator, WireFormat};
use causeway_schema::{SchemaBuilder, SchemaConfig};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Limited};
use tracing::{debug, warn};

use crate::body::GatewayBody;
use crate::error::{GatewayBuildError, ProtocolError};
use crate::framing;
use crate::openapi::{self, OpenApiMethod};
use crate::protocol::{classify, response_content_type, Protocol};
use crate::reflection::{ReflectionService, REFLECTION_PATH};
use crate::status::{error_body, grpc_trailers};
use crate::timeout::{parse_connect_timeout, parse_grpc_timeout};

const DEFAULT_MAX_BODY: usize = 4 * 1024 * 1024;

/// Everything one method needs at request time.
struct MethodHandler {
    service: String,
    method: String,
    codecs: MethodCodecs,
    handler: ValueHandler,
    validation: bool,
}

/// Cancels the request context when dropped. hyper drops in-flight service
/// futures when a connection dies, so the guard is what guarantees context
/// clones held by handler-spawned tasks observe a broken transport.
struct CancelGuard {
    handle: CancellationHandle,
}

impl CancelGuard {
    fn cancel(&self) {
        self.handle.cancel();
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

struct RouterInner {
    methods: HashMap<String, MethodHandler>,
    reflection: Option<ReflectionService>,
    openapi: Option<Bytes>,
    max_body: usize,
}

/// The mounted gateway: a cheaply clonable HTTP handler.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

/// Assembles a [`Router`] from registered services.
pub struct GatewayBuilder {
    services: Vec<Service>,
    openapi: bool,
    max_body: usize,
    title: String,
    version: String,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        GatewayBuilder {
            services: Vec::new(),
            openapi: false,
            max_body: DEFAULT_MAX_BODY,
            title: "causeway".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

impl GatewayBuilder {
    pub fn new() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    pub fn add_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    /// Serve `GET /openapi.json` derived from the descriptor sets.
    pub fn with_openapi(mut self, enabled: bool) -> Self {
        self.openapi = enabled;
        self
    }

    /// Title and version for the OpenAPI `info` block.
    pub fn with_openapi_info(
        mut self,
        title: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.title = title.into();
        self.version = version.into();
        self
    }

    /// Cap on request body size; larger bodies get `resource_exhausted`.
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body = limit.max(1);
        self
    }

    /// Synthesize descriptors and codecs for every method and seal the
    /// routing table. Schema errors abort here and never reach the wire.
    pub fn build(self) -> Result<Router, GatewayBuildError> {
        let mut methods: HashMap<String, MethodHandler> = HashMap::new();
        let mut reflection = ReflectionService::new();
        let mut openapi_entries: Vec<(Arc<SchemaPool>, Vec<OpenApiMethod>)> = Vec::new();

        for service in &self.services {
            let schema_builder = SchemaBuilder::new(SchemaConfig::for_service(service));
            let set = schema_builder.build_service_set(service)?;
            let pool = Arc::new(SchemaPool::from_set(&set)?);
            let service_symbol = format!("{}.{}", service.package(), service.name());
            let mut api_methods = Vec::new();

            for method in service.methods() {
                let path = service.method_path(method.name());
                let input = format!(".{}.{}", service.package(), method.input().name);
                let output = format!(".{}.{}", service.package(), method.output().name);
                let entry = MethodHandler {
                    service: service_symbol.clone(),
                    method: method.name().to_owned(),
                    codecs: MethodCodecs::new(
                        pool.clone(),
                        input.clone(),
                        output.clone(),
                        Validator::for_record(method.input()),
                    ),
                    handler: method.handler(),
                    validation: service.config().validation,
                };
                if methods.insert(path.clone(), entry).is_some() {
                    return Err(GatewayBuildError::DuplicatePath(path));
                }
                api_methods.push(OpenApiMethod {
                    path,
                    service: service_symbol.clone(),
                    method: method.name().to_owned(),
                    input,
                    output,
                });
            }

            if service.config().reflection {
                reflection.add_service(&service_symbol, &set);
            }
            openapi_entries.push((pool, api_methods));
            debug!(service = %service_symbol, "mounted service");
        }

        let openapi = if self.openapi {
            let document =
                openapi::build_document(&self.title, &self.version, &openapi_entries);
            Some(Bytes::from(serde_json::to_vec(&document).unwrap_or_default()))
        } else {
            None
        };

        Ok(Router {
            inner: Arc::new(RouterInner {
                methods,
                reflection: (!reflection.is_empty()).then_some(reflection),
                openapi,
                max_body: self.max_body,
            }),
        })
    }
}

impl Router {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Serve one request without a transport cancellation source; used by
    /// tests and embedders that manage cancellation themselves.
    pub async fn call<B>(&self, req: Request<B>) -> Response<GatewayBody>
    where
        B: http_body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.call_with_cancellation(req, None).await
    }

    /// Serve one request. Infallible: every failure is rendered onto the
    /// protocol's error surface. When `transport` fires (the server feeds
    /// it from connection teardown), the handler's context is cancelled
    /// while the handler is still running.
    pub async fn call_with_cancellation<B>(
        &self,
        req: Request<B>,
        transport: Option<Cancellation>,
    ) -> Response<GatewayBody>
    where
        B: http_body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_owned();

        if path == "/openapi.json" {
            return match (&self.inner.openapi, parts.method == Method::GET) {
                (Some(document), true) => json_response(StatusCode::OK, document.clone()),
                (Some(_), false) => plain_error(
                    StatusCode::METHOD_NOT_ALLOWED,
                    Code::Unimplemented,
                    "openapi document is GET only",
                ),
                (None, _) => not_found(&path),
            };
        }

        let protocol = classify(parts.version, &parts.headers);
        let content_type = header_str(&parts.headers, CONTENT_TYPE).unwrap_or("").to_owned();
        let response_ct = response_content_type(protocol, &content_type);

        let body = match self.read_body(body).await {
            Ok(body) => body,
            Err(err) => {
                return error_response(protocol, &response_ct, &parts.headers, &err.into())
            }
        };

        if path == REFLECTION_PATH {
            if let Some(reflection) = &self.inner.reflection {
                return self.serve_reflection(reflection, protocol, &response_ct, &parts.headers, &body);
            }
            return not_found(&path);
        }

        let Some(handler) = self.inner.methods.get(&path) else {
            return not_found(&path);
        };
        if parts.method != Method::POST {
            return plain_error(
                StatusCode::METHOD_NOT_ALLOWED,
                Code::Unimplemented,
                "unary methods are POST only",
            );
        }

        self.dispatch(
            handler,
            protocol,
            &content_type,
            &response_ct,
            &parts,
            body,
            transport,
        )
        .await
    }

    async fn read_body<B>(&self, body: B) -> Result<Bytes, ProtocolError>
    where
        B: http_body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match Limited::new(body, self.inner.max_body).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(err) => {
                if err.downcast_ref::<http_body_util::LengthLimitError>().is_some() {
                    Err(ProtocolError::BodyTooLarge {
                        limit: self.inner.max_body,
                    })
                } else {
                    Err(ProtocolError::MalformedFrame(format!(
                        "body read failed: {err}"
                    )))
                }
            }
        }
    }

    /// The Detect-to-Finish state machine for one method request.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch(
        &self,
        handler: &MethodHandler,
        protocol: Protocol,
        content_type: &str,
        response_ct: &str,
        parts: &http::request::Parts,
        body: Bytes,
        transport: Option<Cancellation>,
    ) -> Response<GatewayBody> {
        // [Select]
        let Some(format) = wire_format_for(content_type) else {
            let err = ProtocolError::UnsupportedContentType(content_type.to_owned());
            if protocol == Protocol::Plain {
                return plain_error(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    err.code(),
                    &err.to_string(),
                );
            }
            return error_response(protocol, response_ct, &parts.headers, &err.into());
        };

        // [Unframe]
        let payload = if protocol.framed() {
            let frame = match framing::decode_frame(&body) {
                Ok(frame) => frame,
                Err(err) => {
                    return error_response(protocol, response_ct, &parts.headers, &err.into())
                }
            };
            let encoding = header_str(&parts.headers, HeaderName::from_static("grpc-encoding"));
            match framing::decompress(&frame, encoding) {
                Ok(payload) => payload,
                Err(err) => {
                    return error_response(protocol, response_ct, &parts.headers, &err.into())
                }
            }
        } else {
            body
        };

        // [Decode]
        let input = match handler.codecs.decode_input(format, &payload) {
            Ok(input) => input,
            Err(err) => {
                let err = RpcError::new(Code::InvalidArgument, err.to_string());
                return error_response(protocol, response_ct, &parts.headers, &err);
            }
        };

        // [Validate] Oneof constraints hold unconditionally; declared
        // rules only when the service opted in.
        let validator = handler.codecs.validator();
        let validation = validator
            .check_oneofs(&input)
            .and_then(|()| {
                if handler.validation {
                    validator.check(&input)
                } else {
                    Ok(())
                }
            });
        if let Err(violation) = validation {
            let err = RpcError::new(Code::InvalidArgument, violation.to_string());
            return error_response(protocol, response_ct, &parts.headers, &err);
        }

        // [Invoke] The handler races against the deadline and the
        // transport's cancellation signal; both cancel the context while
        // the handler is still running, so cooperative waits inside it
        // wake up. The guard also fires if this whole future is dropped
        // with the connection, and again on normal teardown so lingering
        // context clones always observe the end of the request.
        let timeout = request_timeout(protocol, &parts.headers);
        let deadline = timeout.map(|t| Instant::now() + t);
        let (cancel_handle, cancel_signal) = cancellation();
        let guard = CancelGuard {
            handle: cancel_handle,
        };
        let ctx = Context::new(
            deadline,
            request_metadata(&parts.headers),
            Some(cancel_signal),
        );
        let mut invocation = (handler.handler)(ctx.clone(), input);
        let result = {
            let deadline_expired = async {
                match timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending().await,
                }
            };
            tokio::pin!(deadline_expired);
            let transport_closed = async {
                match &transport {
                    Some(signal) => signal.cancelled().await,
                    None => std::future::pending().await,
                }
            };
            tokio::pin!(transport_closed);

            tokio::select! {
                result = &mut invocation => result,
                () = &mut deadline_expired => {
                    guard.cancel();
                    Err(RpcError::new(
                        Code::DeadlineExceeded,
                        "handler did not complete before the deadline",
                    ))
                }
                () = &mut transport_closed => {
                    guard.cancel();
                    // The peer is gone. Let the handler observe the
                    // cancellation and unwind; its reply is discarded
                    // regardless, bounded by the deadline if one was set.
                    tokio::select! {
                        _ = &mut invocation => {}
                        () = &mut deadline_expired => {}
                    }
                    Err(RpcError::new(
                        Code::Canceled,
                        "request canceled: client disconnected",
                    ))
                }
            }
        };

        if let Err(err) = &result {
            debug!(
                service = %handler.service,
                method = %handler.method,
                code = %err.code,
                "handler returned error"
            );
        }

        // [Encode]
        let encoded = match result {
            Ok(value) => match handler.codecs.encode_output(format, &value) {
                Ok(bytes) => Ok(Bytes::from(bytes)),
                Err(err) => {
                    warn!(method = %handler.method, error = %err, "reply encoding failed");
                    Err(RpcError::new(Code::Internal, err.to_string()))
                }
            },
            Err(err) => Err(err),
        };

        // [Frame] and [Finish]
        let (staged_headers, staged_trailers) = ctx.take_response_metadata();
        match encoded {
            Ok(payload) => {
                success_response(protocol, response_ct, payload, &staged_headers, &staged_trailers)
            }
            Err(err) => {
                let mut response =
                    error_response(protocol, response_ct, &parts.headers, &err);
                apply_metadata(response.headers_mut(), &staged_headers);
                response
            }
        }
    }

    fn serve_reflection(
        &self,
        reflection: &ReflectionService,
        protocol: Protocol,
        response_ct: &str,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Response<GatewayBody> {
        let payload = if protocol.framed() {
            let frame = match framing::decode_frame(body) {
                Ok(frame) => frame,
                Err(err) => return error_response(protocol, response_ct, headers, &err.into()),
            };
            let encoding = header_str(headers, HeaderName::from_static("grpc-encoding"));
            match framing::decompress(&frame, encoding) {
                Ok(payload) => payload,
                Err(err) => return error_response(protocol, response_ct, headers, &err.into()),
            }
        } else {
            body.clone()
        };
        let reply = reflection.handle(&payload);
        success_response(
            protocol,
            response_ct,
            Bytes::from(reply),
            &Metadata::new(),
            &Metadata::new(),
        )
    }
}

fn request_timeout(protocol: Protocol, headers: &HeaderMap) -> Option<Duration> {
    match protocol {
        Protocol::Grpc | Protocol::GrpcWeb => {
            header_str(headers, HeaderName::from_static("grpc-timeout"))
                .and_then(parse_grpc_timeout)
        }
        Protocol::Connect => {
            header_str(headers, HeaderName::from_static("connect-timeout-ms"))
                .and_then(parse_connect_timeout)
        }
        Protocol::Plain => None,
    }
}

/// Headers the transport consumes never reach handler metadata.
const METADATA_DENYLIST: [&str; 8] = [
    "content-type",
    "content-length",
    "te",
    "host",
    "grpc-timeout",
    "grpc-encoding",
    "connect-protocol-version",
    "connect-timeout-ms",
];

fn request_metadata(headers: &HeaderMap) -> Metadata {
    let mut metadata = Metadata::new();
    for (name, value) in headers {
        let key = name.as_str();
        if METADATA_DENYLIST.contains(&key) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            metadata.insert(key, value);
        }
    }
    metadata
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl http::header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn apply_metadata(headers: &mut HeaderMap, metadata: &Metadata) {
    for (key, value) in metadata.iter() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
}

fn success_response(
    protocol: Protocol,
    response_ct: &str,
    payload: Bytes,
    staged_headers: &Metadata,
    staged_trailers: &Metadata,
) -> Response<GatewayBody> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, response_ct);
    let body = match protocol {
        Protocol::Grpc => {
            let mut trailers = HeaderMap::new();
            for (key, value) in grpc_trailers(Ok(()), staged_trailers) {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(&value),
                ) {
                    trailers.append(name, value);
                }
            }
            GatewayBody::with_trailers(framing::encode_frame(0, &payload), trailers)
        }
        Protocol::GrpcWeb => {
            let mut framed = BytesMut::new();
            framed.extend_from_slice(&framing::encode_frame(0, &payload));
            framed.extend_from_slice(&framing::encode_trailer_frame(&grpc_trailers(
                Ok(()),
                staged_trailers,
            )));
            GatewayBody::from_bytes(framed.freeze())
        }
        Protocol::Connect | Protocol::Plain => {
            // Connect surfaces trailer metadata as `trailer-` headers.
            if protocol == Protocol::Connect {
                for (key, value) in staged_trailers.iter() {
                    builder = builder.header(format!("trailer-{key}"), value);
                }
            }
            GatewayBody::from_bytes(payload)
        }
    };
    let mut response = builder.body(body).unwrap_or_else(|_| {
        let mut fallback = Response::new(GatewayBody::empty());
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    });
    apply_metadata(response.headers_mut(), staged_headers);
    response
}

fn error_response(
    protocol: Protocol,
    response_ct: &str,
    _request_headers: &HeaderMap,
    err: &RpcError,
) -> Response<GatewayBody> {
    match protocol {
        Protocol::Grpc => {
            let mut trailers = HeaderMap::new();
            for (key, value) in grpc_trailers(Err(err), &Metadata::new()) {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(&value),
                ) {
                    trailers.append(name, value);
                }
            }
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, response_ct)
                .body(GatewayBody::trailers_only(trailers))
                .expect("static response construction")
        }
        Protocol::GrpcWeb => {
            let framed =
                framing::encode_trailer_frame(&grpc_trailers(Err(err), &Metadata::new()));
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, response_ct)
                .body(GatewayBody::from_bytes(framed))
                .expect("static response construction")
        }
        Protocol::Connect | Protocol::Plain => {
            let status = StatusCode::from_u16(err.code.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            json_response(status, Bytes::from(error_body(err)))
        }
    }
}

fn json_response(status: StatusCode, body: Bytes) -> Response<GatewayBody> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(GatewayBody::from_bytes(body))
        .expect("static response construction")
}

fn plain_error(status: StatusCode, code: Code, message: &str) -> Response<GatewayBody> {
    json_response(
        status,
        Bytes::from(error_body(&RpcError::new(code, message))),
    )
}

fn not_found(path: &str) -> Response<GatewayBody> {
    plain_error(
        StatusCode::NOT_FOUND,
        Code::NotFound,
        &format!("no method mounted at {path}"),
    )
}
