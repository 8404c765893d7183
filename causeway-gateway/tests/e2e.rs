//! End-to-end gateway tests: one service registry driven over every
//! protocol surface through `Router::call`, no sockets required.

use std::time::SystemTime;

use bytes::Bytes;
use causeway::{Record, RpcError, Service};
use causeway_gateway::framing;
use causeway_gateway::{GatewayBody, Router};
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode, Version};
use http_body_util::{BodyExt, Full};

#[derive(Record, Clone, Debug, Default, PartialEq)]
struct CreateUserRequest {
    #[proto(validate = "required")]
    name: String,
    #[proto(validate = "required,email")]
    email: String,
}

#[derive(Record, Clone, Debug, PartialEq)]
struct User {
    id: String,
    name: String,
    email: String,
    created_at: SystemTime,
}

#[derive(Record, Clone, Debug, PartialEq)]
struct CreateUserResponse {
    user: User,
}

#[derive(Record, Clone, Debug, Default, PartialEq)]
struct EchoRequest {
    message: String,
}

#[derive(Record, Clone, Debug, Default, PartialEq)]
struct EchoResponse {
    echo: String,
}

#[derive(Record, Clone, Debug, Default, PartialEq)]
struct Identifier {
    email: Option<String>,
    phone_number: Option<String>,
}

#[derive(Record, Clone, Debug, Default, PartialEq)]
struct LookupRequest {
    #[proto(oneof)]
    identifier: Identifier,
}

#[derive(Record, Clone, Debug, Default, PartialEq)]
struct LookupResponse {
    found: bool,
}

fn router() -> Router {
    let users = Service::builder("user.v1", "UserService")
        .with_validation(true)
        .with_reflection(true)
        .unary("CreateUser", |_ctx, req: CreateUserRequest| async move {
            Ok::<_, RpcError>(CreateUserResponse {
                user: User {
                    id: "usr_1".to_owned(),
                    name: req.name,
                    email: req.email,
                    created_at: SystemTime::UNIX_EPOCH
                        + std::time::Duration::from_secs(1_700_000_000),
                },
            })
        })
        .build()
        .unwrap();

    let echo = Service::builder("echo.v1", "EchoService")
        .unary("Echo", |_ctx, req: EchoRequest| async move {
            Ok::<_, RpcError>(EchoResponse { echo: req.message })
        })
        .unary("Lookup", |_ctx, req: LookupRequest| async move {
            Ok::<_, RpcError>(LookupResponse {
                found: req.identifier.email.is_some() || req.identifier.phone_number.is_some(),
            })
        })
        .unary("Sleep", |_ctx, _req: EchoRequest| async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok::<_, RpcError>(EchoResponse::default())
        })
        .build()
        .unwrap();

    Router::builder()
        .add_service(users)
        .add_service(echo)
        .with_openapi(true)
        .build()
        .unwrap()
}

fn post(path: &str, content_type: &str, body: impl Into<Bytes>) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(CONTENT_TYPE, content_type)
        .body(Full::new(body.into()))
        .unwrap()
}

async fn body_bytes(response: http::Response<GatewayBody>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

// EchoRequest { message: "hi" } on the binary wire: field 1, length 2.
const ECHO_HI: &[u8] = b"\x0a\x02hi";

#[tokio::test]
async fn connect_json_create_user_succeeds() {
    let response = router()
        .call(post(
            "/user.v1.UserService/CreateUser",
            "application/json",
            &br#"{"name":"Alice","email":"a@x.io"}"#[..],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["user"]["name"], "Alice");
    assert_eq!(json["user"]["email"], "a@x.io");
    assert!(!json["user"]["id"].as_str().unwrap().is_empty());
    // RFC 3339 timestamp.
    assert!(json["user"]["createdAt"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn connect_json_invalid_email_is_rejected() {
    let response = router()
        .call(post(
            "/user.v1.UserService/CreateUser",
            "application/json",
            &br#"{"name":"A","email":"not-an-email"}"#[..],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["code"], "invalid_argument");
    assert!(json["message"].as_str().unwrap().contains("email"));
}

#[tokio::test]
async fn grpc_proto_echo_round_trips_with_trailers() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo.v1.EchoService/Echo")
        .version(Version::HTTP_2)
        .header(CONTENT_TYPE, "application/grpc+proto")
        .header("te", "trailers")
        .header("grpc-timeout", "1S")
        .body(Full::new(Bytes::from(
            framing::encode_frame(0, ECHO_HI).to_vec(),
        )))
        .unwrap();
    let response = router().call(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let collected = response.into_body().collect().await.unwrap();
    let trailers = collected.trailers().cloned().expect("grpc trailers");
    assert_eq!(trailers.get("grpc-status").unwrap(), "0");

    let framed = collected.to_bytes();
    let frame = framing::decode_frame(&framed).unwrap();
    // EchoResponse { echo: "hi" } has the same shape as the request.
    assert_eq!(frame.payload.as_ref(), ECHO_HI);
}

#[tokio::test]
async fn grpc_web_json_echo_emits_trailer_frame() {
    let payload = br#"{"message":"hi"}"#;
    let response = router()
        .call(post(
            "/echo.v1.EchoService/Echo",
            "application/grpc-web+json",
            framing::encode_frame(0, payload).to_vec(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let framed = body_bytes(response).await;
    let message = framing::decode_frame(&framed).unwrap();
    assert!(!message.is_trailer());
    let json: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
    assert_eq!(json["echo"], "hi");

    let rest = &framed[5 + message.payload.len()..];
    let trailer = framing::decode_frame(rest).unwrap();
    assert!(trailer.is_trailer());
    let text = String::from_utf8(trailer.payload.to_vec()).unwrap();
    assert!(text.contains("grpc-status: 0"));
}

#[tokio::test]
async fn replies_agree_across_protocols() {
    // The observable reply must be identical modulo wire encoding.
    let connect = router()
        .call(post(
            "/echo.v1.EchoService/Echo",
            "application/json",
            &br#"{"message":"same"}"#[..],
        ))
        .await;
    let connect_json: serde_json::Value =
        serde_json::from_slice(&body_bytes(connect).await).unwrap();

    let grpc_request = Request::builder()
        .method(Method::POST)
        .uri("/echo.v1.EchoService/Echo")
        .version(Version::HTTP_2)
        .header(CONTENT_TYPE, "application/grpc+json")
        .body(Full::new(Bytes::from(
            framing::encode_frame(0, br#"{"message":"same"}"#).to_vec(),
        )))
        .unwrap();
    let grpc = router().call(grpc_request).await;
    let framed = body_bytes(grpc).await;
    let frame = framing::decode_frame(&framed).unwrap();
    let grpc_json: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();

    assert_eq!(connect_json, grpc_json);
}

#[tokio::test]
async fn oneof_constraint_is_enforced_without_validation() {
    // Both arms set: rejected with the group name in the message.
    let response = router()
        .call(post(
            "/echo.v1.EchoService/Lookup",
            "application/json",
            &br#"{"email":"a@x.io","phoneNumber":"+15550001111"}"#[..],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["code"], "invalid_argument");
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("oneof constraint violated for group 'identifier'"));

    // One arm set: success.
    let response = router()
        .call(post(
            "/echo.v1.EchoService/Lookup",
            "application/json",
            &br#"{"email":"a@x.io"}"#[..],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["found"], true);

    // No arms set: success.
    let response = router()
        .call(post(
            "/echo.v1.EchoService/Lookup",
            "application/json",
            &b"{}"[..],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn connect_deadline_expires_as_504() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo.v1.EchoService/Sleep")
        .header(CONTENT_TYPE, "application/json")
        .header("connect-protocol-version", "1")
        .header("connect-timeout-ms", "20")
        .body(Full::new(Bytes::from_static(b"{}")))
        .unwrap();
    let response = router().call(request).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["code"], "deadline_exceeded");
}

#[tokio::test]
async fn unsupported_content_type_is_415_on_plain() {
    let response = router()
        .call(post(
            "/echo.v1.EchoService/Echo",
            "text/plain",
            &b"hi"[..],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn unknown_path_is_404() {
    let response = router()
        .call(post("/nope.v1.Nope/Nope", "application/json", &b"{}"[..]))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["code"], "not_found");
}

#[tokio::test]
async fn openapi_document_lists_every_method() {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/openapi.json")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = router().call(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["openapi"], "3.0.3");
    assert!(json["paths"]["/user.v1.UserService/CreateUser"]["post"].is_object());
    assert!(json["paths"]["/echo.v1.EchoService/Echo"]["post"].is_object());
    // Schemas ride under fully qualified names.
    assert!(json["components"]["schemas"]["user.v1.CreateUserRequest"].is_object());
    assert_eq!(
        json["components"]["schemas"]["google.protobuf.Timestamp"]["format"],
        "date-time"
    );
}

#[tokio::test]
async fn reflection_lists_services() {
    // list_services = field 7, empty string payload.
    let request_message = b"\x3a\x00";
    let request = Request::builder()
        .method(Method::POST)
        .uri("/grpc.reflection.v1.ServerReflection/ServerReflectionInfo")
        .version(Version::HTTP_2)
        .header(CONTENT_TYPE, "application/grpc+proto")
        .body(Full::new(Bytes::from(
            framing::encode_frame(0, request_message).to_vec(),
        )))
        .unwrap();
    let response = router().call(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let collected = response.into_body().collect().await.unwrap();
    let trailers = collected.trailers().cloned().expect("grpc trailers");
    assert_eq!(trailers.get("grpc-status").unwrap(), "0");
    let framed = collected.to_bytes();
    let frame = framing::decode_frame(&framed).unwrap();
    let text = String::from_utf8_lossy(&frame.payload);
    assert!(text.contains("user.v1.UserService"));
}

#[tokio::test]
async fn grpc_web_error_rides_in_trailer_frame() {
    let response = router()
        .call(post(
            "/user.v1.UserService/CreateUser",
            "application/grpc-web+json",
            framing::encode_frame(0, br#"{"name":"A","email":"nope"}"#).to_vec(),
        ))
        .await;
    // Framed protocols always answer 200; the status rides in the
    // trailer frame.
    assert_eq!(response.status(), StatusCode::OK);
    let framed = body_bytes(response).await;
    let frame = framing::decode_frame(&framed).unwrap();
    assert!(frame.is_trailer());
    let text = String::from_utf8(frame.payload.to_vec()).unwrap();
    assert!(text.contains("grpc-status: 3"));
    assert!(text.contains("email"));
}

#[tokio::test]
async fn gzip_compressed_grpc_web_requests_decode() {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(br#"{"message":"zipped"}"#).unwrap();
    let compressed = encoder.finish().unwrap();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/echo.v1.EchoService/Echo")
        .header(CONTENT_TYPE, "application/grpc-web+json")
        .header("grpc-encoding", "gzip")
        .body(Full::new(Bytes::from(
            framing::encode_frame(0x01, &compressed).to_vec(),
        )))
        .unwrap();
    let response = router().call(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let framed = body_bytes(response).await;
    let frame = framing::decode_frame(&framed).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();
    assert_eq!(json["echo"], "zipped");
}

#[tokio::test]
async fn editions_services_serve_like_proto3_ones() {
    let service = Service::builder("echo.v2", "EchoService")
        .with_syntax(causeway::Syntax::Editions)
        .unary("Echo", |_ctx, req: EchoRequest| async move {
            Ok::<_, RpcError>(EchoResponse { echo: req.message })
        })
        .build()
        .unwrap();
    let router = Router::builder().add_service(service).build().unwrap();
    let response = router
        .call(post(
            "/echo.v2.EchoService/Echo",
            "application/json",
            &br#"{"message":"ed"}"#[..],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["echo"], "ed");
}

#[tokio::test]
async fn transport_cancellation_reaches_running_handlers() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    let observed = Arc::new(AtomicBool::new(false));
    let handler_observed = observed.clone();
    let service = Service::builder("watch.v1", "WatchService")
        .unary("Watch", move |ctx: causeway::Context, _req: EchoRequest| {
            let observed = handler_observed.clone();
            async move {
                // Park until the transport goes away, then report back.
                ctx.cancelled().await;
                observed.store(ctx.is_cancelled(), Ordering::SeqCst);
                Ok::<_, RpcError>(EchoResponse {
                    echo: "late".into(),
                })
            }
        })
        .build()
        .unwrap();
    let router = Router::builder().add_service(service).build().unwrap();

    let (handle, signal) = causeway::cancellation();
    let call = router.call_with_cancellation(
        post("/watch.v1.WatchService/Watch", "application/json", &b"{}"[..]),
        Some(signal),
    );
    tokio::pin!(call);

    // The handler is parked on its context; the call stays pending.
    assert!(tokio::time::timeout(Duration::from_millis(50), &mut call)
        .await
        .is_err());

    handle.cancel();
    let response = call.await;

    // The handler observed the cancellation before it returned, and its
    // late reply was discarded in favor of a canceled status.
    assert!(observed.load(Ordering::SeqCst));
    assert_eq!(response.status().as_u16(), 499);
    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["code"], "canceled");
}

#[tokio::test]
async fn dropped_connections_cancel_request_contexts() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Notify;

    let started = Arc::new(Notify::new());
    let observed = Arc::new(AtomicBool::new(false));
    let done = Arc::new(Notify::new());

    let handler_started = started.clone();
    let handler_observed = observed.clone();
    let handler_done = done.clone();
    let service = Service::builder("watch.v1", "WatchService")
        .unary("Hang", move |ctx: causeway::Context, _req: EchoRequest| {
            let started = handler_started.clone();
            let observed = handler_observed.clone();
            let done = handler_done.clone();
            async move {
                started.notify_one();
                // A side task keeps watching the context even if the
                // request future is torn down with the connection.
                let watcher = ctx.clone();
                tokio::spawn(async move {
                    watcher.cancelled().await;
                    observed.store(watcher.is_cancelled(), Ordering::SeqCst);
                    done.notify_one();
                });
                ctx.cancelled().await;
                Ok::<_, RpcError>(EchoResponse::default())
            }
        })
        .build()
        .unwrap();
    let router = Router::builder().add_service(service).build().unwrap();
    let server = causeway_gateway::Server::bind("127.0.0.1:0".parse().unwrap(), router)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let body = b"{}";
    let head = format!(
        "POST /watch.v1.WatchService/Hang HTTP/1.1\r\n\
         host: localhost\r\n\
         content-type: application/json\r\n\
         content-length: {}\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await.unwrap();
    stream.write_all(body).await.unwrap();

    // Wait for the handler to be running, then break the connection.
    tokio::time::timeout(Duration::from_secs(2), started.notified())
        .await
        .unwrap();
    drop(stream);

    tokio::time::timeout(Duration::from_secs(2), done.notified())
        .await
        .unwrap();
    assert!(observed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn body_over_limit_is_resource_exhausted() {
    let small = Router::builder()
        .add_service(
            Service::builder("echo.v1", "EchoService")
                .unary("Echo", |_ctx, req: EchoRequest| async move {
                    Ok::<_, RpcError>(EchoResponse { echo: req.message })
                })
                .build()
                .unwrap(),
        )
        .with_max_body_bytes(16)
        .build()
        .unwrap();
    let response = small
        .call(post(
            "/echo.v1.EchoService/Echo",
            "application/json",
            vec![b'x'; 64],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let json: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["code"], "resource_exhausted");
}
