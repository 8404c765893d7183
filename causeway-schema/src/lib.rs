//! Runtime Protobuf descriptor synthesis for `causeway`.
//!
//! Walks record metadata emitted by `#[derive(Record)]` and produces fully
//! valid `FileDescriptorProto` sets without a code generation step: one
//! file per top-level type, well-known type mappings, map entries, oneof
//! groups, proto3-optional bookkeeping, and Editions 2023 feature sets.
//!
//! Descriptors are built once at service registration and never mutated
//! afterwards; the [`SchemaCache`] collapses concurrent builds of the same
//! type into one.

pub mod builder;
pub mod cache;
pub mod error;
pub mod features;
pub mod introspect;
pub mod well_known;

pub use builder::{SchemaBuilder, SchemaConfig};
pub use cache::SchemaCache;
pub use error::SchemaError;
pub use introspect::{introspect, IntrospectedField, ResolvedKind, Scalar, WellKnown};
