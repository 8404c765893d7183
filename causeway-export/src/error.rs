//! Export failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("cannot print descriptor: {0}")]
    Print(String),

    #[error("cannot write archive: {0}")]
    Zip(String),
}
