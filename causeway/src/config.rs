//! Service-level schema configuration: syntax mode, edition, features.

/// Which descriptor dialect the synthesizer emits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Syntax {
    #[default]
    Proto3,
    Editions,
}

/// Supported Protobuf editions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Edition {
    #[default]
    Edition2023,
    Edition2024,
}

impl Edition {
    /// The year literal printed in `edition = "<year>";` lines.
    pub fn year(&self) -> &'static str {
        match self {
            Edition::Edition2023 => "2023",
            Edition::Edition2024 => "2024",
        }
    }
}

/// Field presence axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FieldPresence {
    #[default]
    Explicit,
    Implicit,
    LegacyRequired,
}

/// Repeated-field encoding axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RepeatedEncoding {
    #[default]
    Packed,
    Expanded,
}

/// Enum openness axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnumKind {
    #[default]
    Open,
    Closed,
}

/// UTF-8 validation axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Utf8Validation {
    #[default]
    Verify,
    None,
}

/// The Editions feature set attached at file level and, where a field's
/// modifiers differ from the file default, overridden per field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Features {
    pub field_presence: FieldPresence,
    pub repeated_encoding: RepeatedEncoding,
    pub enum_kind: EnumKind,
    pub utf8_validation: Utf8Validation,
}
