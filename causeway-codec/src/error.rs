//! Codec failures.
//!
//! Decode failures surface as `invalid_argument`, encode failures as
//! `internal`; the mapping is the gateway's job.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("encode failure: {0}")]
    Encode(String),

    /// The descriptor set does not describe the requested type.
    #[error("unknown message type {0}")]
    UnknownType(String),

    #[error("descriptor set is inconsistent: {0}")]
    InvalidDescriptor(String),
}

impl CodecError {
    pub fn decode(detail: impl std::fmt::Display) -> CodecError {
        CodecError::Decode(detail.to_string())
    }

    pub fn encode(detail: impl std::fmt::Display) -> CodecError {
        CodecError::Encode(detail.to_string())
    }
}
