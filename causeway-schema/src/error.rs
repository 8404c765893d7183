//! Registration-time schema failures.
//!
//! Every variant here aborts service build; none of them can reach the
//! wire. Request-time failures are the codec's and gateway's business.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    /// The top-level type did not resolve to a structural record.
    #[error("top-level type {0:?} is not a struct record")]
    NotAStruct(String),

    #[error("field {field:?} of {message}: unsupported field type: {detail}")]
    UnsupportedFieldType {
        message: String,
        field: String,
        detail: String,
    },

    #[error("field {field:?} of {message}: map key must be a supported scalar")]
    UnsupportedMapKey { message: String, field: String },

    #[error("field {field:?} of {message}: invalid modifier combination: {detail}")]
    InvalidModifierCombination {
        message: String,
        field: String,
        detail: String,
    },

    /// A referenced type could not be placed without an import cycle.
    #[error("cannot resolve import of {symbol} into {file} without a cycle")]
    CyclicImportResolution { file: String, symbol: String },

    #[error("descriptor construction failed: {0}")]
    DescriptorConstructionFailure(String),
}
