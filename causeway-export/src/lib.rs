//! Textual `.proto` export for `causeway` descriptor sets.
//!
//! Materializes a synthesized `FileDescriptorSet` back into `.proto`
//! source, one file per descriptor, stable across repeated exports. The
//! printer reproduces two fixups on top of a stock descriptor printer:
//! the Editions `edition = "<year>";` line and the leading `optional`
//! keyword on proto3-optional fields. [`write_zip`] bundles the printed
//! sources into a byte-stable archive.

pub mod error;
pub mod printer;
pub mod zip;

pub use error::ExportError;
pub use printer::{export_set, ExportOptions, ProtoFile};
pub use zip::write_zip;
