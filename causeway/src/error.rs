//! Handler-facing errors and record conversion failures.

use thiserror::Error;

use crate::code::Code;

/// The error a handler returns to surface a canonical status.
///
/// The gateway renders it per protocol: gRPC trailers, a gRPC-Web trailer
/// frame, or a Connect JSON body. Handlers never observe transport errors;
/// a broken connection only manifests as context cancellation.
#[derive(Clone, Debug)]
pub struct RpcError {
    pub code: Code,
    pub message: String,
    pub details: Vec<ErrorDetail>,
}

/// A typed detail entry attached to an error, surfaced in Connect bodies.
#[derive(Clone, Debug)]
pub struct ErrorDetail {
    pub type_url: String,
    pub value: Vec<u8>,
    /// Optional decoded form, emitted as the `debug` member in Connect.
    pub debug: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(code: Code, message: impl Into<String>) -> RpcError {
        RpcError {
            code,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::AlreadyExists, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::PermissionDenied, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::Unauthenticated, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::FailedPrecondition, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::Unimplemented, message)
    }

    pub fn internal(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::Unavailable, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::DeadlineExceeded, message)
    }

    pub fn canceled(message: impl Into<String>) -> RpcError {
        RpcError::new(Code::Canceled, message)
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Any error without a canonical code surfaces as `unknown`.
impl From<Box<dyn std::error::Error + Send + Sync>> for RpcError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        RpcError::new(Code::Unknown, err.to_string())
    }
}

/// Failure converting between a typed record and its dynamic value form.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("expected {expected} value, got {got}")]
    WrongShape {
        expected: &'static str,
        got: &'static str,
    },

    #[error("value out of range for {0}")]
    OutOfRange(&'static str),

    #[error("unknown enum number {number} for {enum_name}")]
    UnknownEnumValue { enum_name: &'static str, number: i32 },

    #[error("field {0}: {1}")]
    Field(String, Box<RecordError>),
}

impl RecordError {
    /// Attach the field name on the way out of a nested conversion.
    pub fn in_field(self, name: &str) -> RecordError {
        RecordError::Field(name.to_owned(), Box::new(self))
    }
}

/// Registration-time service assembly failure.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("duplicate method name {0:?}")]
    DuplicateMethod(String),

    #[error("invalid {what} name {name:?}")]
    InvalidName { what: &'static str, name: String },
}
