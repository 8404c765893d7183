//! # Causeway
//!
//! A schema-first RPC framework without a code generation step. Declare
//! plain Rust records and handler functions; the framework derives a
//! Protobuf descriptor set from the records at startup and serves the same
//! methods over gRPC, gRPC-Web, and Connect simultaneously, plus OpenAPI
//! documentation and gRPC server reflection.
//!
//! This crate is the API surface: the [`Record`] reflection model, the
//! dynamic [`Value`] form the codecs operate on, canonical status
//! [`Code`]s, the handler [`Context`], and [`Service`] registration.
//! Descriptor synthesis lives in `causeway-schema`, wire codecs in
//! `causeway-codec`, `.proto` export in `causeway-export`, and the
//! multi-protocol HTTP gateway in `causeway-gateway`.
//!
//! ## Getting started
//!
//! ```
//! use causeway::{Context, Record, RpcError, Service};
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
//! # fn main() -> Result<(), causeway::BuildError> {
//! let service = Service::builder("echo.v1", "EchoService")
//!     .unary("Echo", |_ctx: Context, req: EchoRequest| async move {
//!         Ok::<_, RpcError>(EchoResponse { echo: req.message })
//!     })
//!     .build()?;
//! assert_eq!(service.method_path("Echo"), "/echo.v1.EchoService/Echo");
//! # Ok(())
//! # }
//! ```

pub mod code;
pub mod config;
pub mod context;
pub mod error;
pub mod record;
pub mod service;
pub mod value;
pub mod wkt;

pub use code::Code;
pub use config::{Edition, EnumKind, Features, FieldPresence, RepeatedEncoding, Syntax, Utf8Validation};
pub use context::{cancellation, Cancellation, CancellationHandle, Context, Metadata};
pub use error::{BuildError, ErrorDetail, RecordError, RpcError};
pub use record::{
    EnumRef, EnumType, FieldKind, FieldMeta, MapKeyKind, MessageRef, Modifiers, ProtoEnum,
    ProtoField, ProtoMapKey, Record, RecordType,
};
pub use service::{Method, Service, ServiceBuilder, ServiceConfig, ValueHandler};
pub use value::{MapKey, Value};

/// Derive [`Record`] for a struct, or a oneof group record.
pub use causeway_derive::Record;

/// Derive [`ProtoEnum`] for a fieldless enum.
pub use causeway_derive::ProtoEnum;
