//! Multi-protocol unary RPC gateway for `causeway`.
//!
//! Mounts every registered method at `/{package}.{service}/{method}` and
//! serves gRPC (HTTP/2 framed), gRPC-Web, Connect, and plain HTTP/JSON
//! from the same handler, plus gRPC server reflection and an OpenAPI 3
//! document when enabled.
//!
//! ```no_run
//! use causeway::{Record, RpcError, Service};
//! use causeway_gateway::{Router, Server};
//!
//! #[derive(Record, Default)]
//! struct EchoRequest {
//!     message: String,
//! }
//!
//! #[derive(Record, Default)]
//! struct EchoResponse {
//!     echo: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = Service::builder("echo.v1", "EchoService")
//!         .with_reflection(true)
//!         .unary("Echo", |_ctx, req: EchoRequest| async move {
//!             Ok::<_, RpcError>(EchoResponse { echo: req.message })
//!         })
//!         .build()?;
//!     let router = Router::builder()
//!         .add_service(service)
//!         .with_openapi(true)
//!         .build()?;
//!     let server = Server::bind("127.0.0.1:8080".parse()?, router).await?;
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```

pub mod body;
pub mod error;
pub mod framing;
pub mod openapi;
pub mod protocol;
pub mod reflection;
pub mod router;
pub mod server;
pub mod status;
pub mod timeout;

pub use body::GatewayBody;
pub use error::{GatewayBuildError, ProtocolError};
pub use protocol::Protocol;
pub use reflection::{ReflectionService, REFLECTION_PATH};
pub use router::{GatewayBuilder, Router};
pub use server::Server;
