//! Gateway error taxonomy.
//!
//! Build-time failures abort `GatewayBuilder::build`; request-time
//! failures are recovered locally and translated onto the protocol's error
//! surface, so handlers and peers never observe transport internals.

use causeway::{Code, RpcError};
use thiserror::Error;

/// Failures while assembling the router from registered services.
#[derive(Error, Debug)]
pub enum GatewayBuildError {
    #[error(transparent)]
    Schema(#[from] causeway_schema::SchemaError),

    #[error(transparent)]
    Codec(#[from] causeway_codec::CodecError),

    /// Fully qualified method paths must be unique per process.
    #[error("method path {0} registered twice")]
    DuplicatePath(String),
}

/// Request-time failures raised during Detect/Unframe/Decode.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

impl ProtocolError {
    /// The canonical code this failure surfaces as on framed protocols.
    pub fn code(&self) -> Code {
        match self {
            ProtocolError::UnsupportedContentType(_) => Code::Unimplemented,
            ProtocolError::MalformedFrame(_) => Code::InvalidArgument,
            ProtocolError::BodyTooLarge { .. } => Code::ResourceExhausted,
        }
    }
}

impl From<ProtocolError> for RpcError {
    fn from(err: ProtocolError) -> Self {
        RpcError::new(err.code(), err.to_string())
    }
}
