//! Editions feature-set mapping.
//!
//! File-level defaults come from the service configuration; field-level
//! overrides are attached only where a field's modifiers differ from the
//! file default.

use causeway::config::{EnumKind, Features, FieldPresence, RepeatedEncoding, Utf8Validation};
use causeway::record::Modifiers;
use prost_types::feature_set;
use prost_types::FeatureSet;

/// Render the file-level feature set.
pub fn file_features(features: &Features) -> FeatureSet {
    FeatureSet {
        field_presence: Some(presence(features.field_presence) as i32),
        enum_type: Some(enum_kind(features.enum_kind) as i32),
        repeated_field_encoding: Some(encoding(features.repeated_encoding) as i32),
        utf8_validation: Some(utf8(features.utf8_validation) as i32),
        ..FeatureSet::default()
    }
}

/// Compute the field-level override, if the field diverges from the file.
pub fn field_overrides(file: &Features, modifiers: &Modifiers) -> Option<FeatureSet> {
    let mut overrides = FeatureSet::default();
    let mut any = false;

    let field_presence = if modifiers.required {
        Some(FieldPresence::LegacyRequired)
    } else if modifiers.implicit {
        Some(FieldPresence::Implicit)
    } else if modifiers.explicit || modifiers.optional {
        Some(FieldPresence::Explicit)
    } else {
        None
    };
    if let Some(p) = field_presence {
        if p != file.field_presence {
            overrides.field_presence = Some(presence(p) as i32);
            any = true;
        }
    }

    if modifiers.unpacked && file.repeated_encoding != RepeatedEncoding::Expanded {
        overrides.repeated_field_encoding =
            Some(feature_set::RepeatedFieldEncoding::Expanded as i32);
        any = true;
    }

    any.then_some(overrides)
}

fn presence(p: FieldPresence) -> feature_set::FieldPresence {
    match p {
        FieldPresence::Explicit => feature_set::FieldPresence::Explicit,
        FieldPresence::Implicit => feature_set::FieldPresence::Implicit,
        FieldPresence::LegacyRequired => feature_set::FieldPresence::LegacyRequired,
    }
}

fn enum_kind(e: EnumKind) -> feature_set::EnumType {
    match e {
        EnumKind::Open => feature_set::EnumType::Open,
        EnumKind::Closed => feature_set::EnumType::Closed,
    }
}

fn encoding(e: RepeatedEncoding) -> feature_set::RepeatedFieldEncoding {
    match e {
        RepeatedEncoding::Packed => feature_set::RepeatedFieldEncoding::Packed,
        RepeatedEncoding::Expanded => feature_set::RepeatedFieldEncoding::Expanded,
    }
}

fn utf8(v: Utf8Validation) -> feature_set::Utf8Validation {
    match v {
        Utf8Validation::Verify => feature_set::Utf8Validation::Verify,
        Utf8Validation::None => feature_set::Utf8Validation::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_edition_2023() {
        let fs = file_features(&Features::default());
        assert_eq!(
            fs.field_presence,
            Some(feature_set::FieldPresence::Explicit as i32)
        );
        assert_eq!(fs.enum_type, Some(feature_set::EnumType::Open as i32));
        assert_eq!(
            fs.repeated_field_encoding,
            Some(feature_set::RepeatedFieldEncoding::Packed as i32)
        );
        assert_eq!(
            fs.utf8_validation,
            Some(feature_set::Utf8Validation::Verify as i32)
        );
    }

    #[test]
    fn matching_modifiers_attach_no_override() {
        let file = Features::default();
        let none = field_overrides(
            &file,
            &Modifiers {
                explicit: true,
                ..Modifiers::default()
            },
        );
        assert!(none.is_none());
    }

    #[test]
    fn diverging_modifiers_attach_overrides() {
        let file = Features::default();
        let fs = field_overrides(
            &file,
            &Modifiers {
                implicit: true,
                ..Modifiers::default()
            },
        )
        .unwrap();
        assert_eq!(
            fs.field_presence,
            Some(feature_set::FieldPresence::Implicit as i32)
        );

        let fs = field_overrides(
            &file,
            &Modifiers {
                required: true,
                unpacked: true,
                ..Modifiers::default()
            },
        )
        .unwrap();
        assert_eq!(
            fs.field_presence,
            Some(feature_set::FieldPresence::LegacyRequired as i32)
        );
        assert_eq!(
            fs.repeated_field_encoding,
            Some(feature_set::RepeatedFieldEncoding::Expanded as i32)
        );
    }
}
