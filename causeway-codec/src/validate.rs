//! Validation closures derived from `validate` tags.
//!
//! The rule vocabulary is the usual struct-tag set: `required`, `email`,
//! `min=`, `max=`, and `oneof=a b c` (allowed values). Oneof-group
//! at-most-one-set checking is separate and unconditional: it runs even
//! when a service has validation disabled.

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;

use causeway::record::{FieldKind, RecordType};
use causeway::value::Value;

/// A violation surfaced to the client as `invalid_argument`.
#[derive(Clone, Debug)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Rule {
    Required,
    Email,
    Min(f64),
    Max(f64),
    OneOfValues(Vec<String>),
}

#[derive(Clone, Debug)]
struct FieldRules {
    /// Dotted path from the root record, using proto field names.
    path: Vec<String>,
    rules: Vec<Rule>,
}

#[derive(Clone, Debug)]
struct OneofGroup {
    /// Path of the group field itself.
    path: Vec<String>,
    group: String,
    members: Vec<String>,
}

/// A pure predicate over decoded values.
#[derive(Clone, Debug, Default)]
pub struct Validator {
    fields: Vec<FieldRules>,
    oneofs: Vec<OneofGroup>,
}

impl Validator {
    /// Derive the validator for a record type, walking nested records.
    pub fn for_record(ty: &RecordType) -> Validator {
        let mut validator = Validator::default();
        let mut visited = HashSet::new();
        collect(ty, &mut Vec::new(), &mut visited, &mut validator);
        validator
    }

    /// Whether any declared rule or group exists at all.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.oneofs.is_empty()
    }

    /// Check the declared `validate` rules.
    pub fn check(&self, value: &Value) -> Result<(), Violation> {
        for field in &self.fields {
            let target = lookup(value, &field.path);
            for rule in &field.rules {
                apply(rule, &field.path, target)?;
            }
        }
        Ok(())
    }

    /// Enforce at-most-one-set for every declared oneof group. Runs
    /// unconditionally, independent of the service validation flag.
    pub fn check_oneofs(&self, value: &Value) -> Result<(), Violation> {
        for group in &self.oneofs {
            let Some(Value::Message(arms)) = lookup(value, &group.path) else {
                continue;
            };
            let set = group
                .members
                .iter()
                .filter(|member| arms.get(*member).is_some_and(|v| !v.is_unset()))
                .count();
            if set > 1 {
                return Err(Violation {
                    field: group.path.join("."),
                    message: format!("oneof constraint violated for group '{}'", group.group),
                });
            }
        }
        Ok(())
    }
}

fn collect(
    ty: &RecordType,
    path: &mut Vec<String>,
    visited: &mut HashSet<TypeId>,
    out: &mut Validator,
) {
    if !visited.insert(ty.type_id) {
        return;
    }
    for field in &ty.fields {
        path.push(field.name.to_owned());
        if let Some(rules) = field.validate {
            let rules = parse_rules(rules);
            if !rules.is_empty() {
                out.fields.push(FieldRules {
                    path: path.clone(),
                    rules,
                });
            }
        }
        match base_kind(&field.kind) {
            FieldKind::Message(target) => {
                let record = target.record();
                if field.modifiers.oneof && record.fields.len() >= 2 {
                    out.oneofs.push(OneofGroup {
                        path: path.clone(),
                        group: field.name.to_owned(),
                        members: record.fields.iter().map(|f| f.name.to_owned()).collect(),
                    });
                }
                collect(&record, path, visited, out);
            }
            _ => {}
        }
        path.pop();
    }
    visited.remove(&ty.type_id);
}

/// Strip optional/repeated wrappers down to the element kind.
fn base_kind(kind: &FieldKind) -> FieldKind {
    match kind {
        FieldKind::Optional(inner) | FieldKind::Repeated(inner) => base_kind(inner),
        other => other.clone(),
    }
}

fn parse_rules(spec: &str) -> Vec<Rule> {
    spec.split(',')
        .filter_map(|rule| {
            let rule = rule.trim();
            if rule.is_empty() {
                return None;
            }
            Some(match rule.split_once('=') {
                None if rule == "required" => Rule::Required,
                None if rule == "email" => Rule::Email,
                Some(("min", n)) => Rule::Min(n.trim().parse().ok()?),
                Some(("max", n)) => Rule::Max(n.trim().parse().ok()?),
                Some(("oneof", values)) => Rule::OneOfValues(
                    values
                        .split_whitespace()
                        .map(str::to_owned)
                        .collect(),
                ),
                // Unknown vocabulary entries are ignored rather than fatal.
                _ => return None,
            })
        })
        .collect()
}

fn lookup<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        match current {
            Value::Message(fields) => {
                current = fields.get(segment)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

fn apply(rule: &Rule, path: &[String], value: Option<&Value>) -> Result<(), Violation> {
    let violation = |message: String| {
        Err(Violation {
            field: path.join("."),
            message,
        })
    };
    match rule {
        Rule::Required => {
            let missing = value.map(|v| v.is_default()).unwrap_or(true);
            if missing {
                return violation("is required".to_owned());
            }
        }
        Rule::Email => {
            if let Some(Value::String(s)) = value {
                if s.is_empty() {
                    return Ok(());
                }
                if !looks_like_email(s) {
                    return violation("must be a valid email address".to_owned());
                }
            }
        }
        Rule::Min(min) => {
            if let Some(size) = magnitude(value) {
                if size < *min {
                    return violation(format!("must be at least {min}"));
                }
            }
        }
        Rule::Max(max) => {
            if let Some(size) = magnitude(value) {
                if size > *max {
                    return violation(format!("must be at most {max}"));
                }
            }
        }
        Rule::OneOfValues(allowed) => {
            if let Some(Value::String(s)) = value {
                if !s.is_empty() && !allowed.iter().any(|a| a == s) {
                    return violation(format!("must be one of {}", allowed.join(", ")));
                }
            }
        }
    }
    Ok(())
}

/// Numeric value for numbers, length for strings/lists/maps/bytes.
fn magnitude(value: Option<&Value>) -> Option<f64> {
    Some(match value? {
        Value::Int(n) => *n as f64,
        Value::UInt(n) => *n as f64,
        Value::Double(n) => *n,
        Value::String(s) => s.chars().count() as f64,
        Value::Bytes(b) => b.len() as f64,
        Value::List(items) => items.len() as f64,
        Value::Map(entries) => entries.len() as f64,
        _ => return None,
    })
}

fn looks_like_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !s.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway::record::{FieldMeta, MessageRef};

    struct Identifier;
    fn identifier_type() -> RecordType {
        RecordType::new::<Identifier>("Identifier")
            .with_field(FieldMeta::new(
                "email",
                FieldKind::Optional(Box::new(FieldKind::String)),
            ))
            .with_field(FieldMeta::new(
                "phone_number",
                FieldKind::Optional(Box::new(FieldKind::String)),
            ))
    }

    struct Request;
    fn request_type() -> RecordType {
        RecordType::new::<Request>("Request")
            .with_field(FieldMeta::new("name", FieldKind::String).with_validate("required"))
            .with_field(
                FieldMeta::new("email", FieldKind::String).with_validate("required,email"),
            )
            .with_field(FieldMeta::new("age", FieldKind::Int32).with_validate("min=0,max=150"))
            .with_field(
                FieldMeta::new(
                    "identifier",
                    FieldKind::Message(MessageRef::from_fn(identifier_type)),
                )
                .with_modifiers(causeway::record::Modifiers {
                    oneof: true,
                    ..Default::default()
                }),
            )
    }

    fn valid_value() -> Value {
        Value::message([
            ("name", Value::from("Alice")),
            ("email", Value::from("a@x.io")),
            ("age", Value::Int(30)),
        ])
    }

    #[test]
    fn valid_record_passes() {
        let validator = Validator::for_record(&request_type());
        validator.check(&valid_value()).unwrap();
        validator.check_oneofs(&valid_value()).unwrap();
    }

    #[test]
    fn missing_required_field_is_reported() {
        let validator = Validator::for_record(&request_type());
        let mut value = valid_value();
        if let Value::Message(fields) = &mut value {
            fields.remove("name");
        }
        let violation = validator.check(&value).unwrap_err();
        assert_eq!(violation.field, "name");
    }

    #[test]
    fn bad_email_mentions_the_field() {
        let validator = Validator::for_record(&request_type());
        let mut value = valid_value();
        if let Value::Message(fields) = &mut value {
            fields.insert("email".into(), Value::from("not-an-email"));
        }
        let violation = validator.check(&value).unwrap_err();
        assert!(violation.to_string().contains("email"));
    }

    #[test]
    fn range_rules_apply_to_numbers() {
        let validator = Validator::for_record(&request_type());
        let mut value = valid_value();
        if let Value::Message(fields) = &mut value {
            fields.insert("age".into(), Value::Int(200));
        }
        assert!(validator.check(&value).is_err());
    }

    #[test]
    fn oneof_groups_reject_two_set_arms() {
        let validator = Validator::for_record(&request_type());
        let mut value = valid_value();
        if let Value::Message(fields) = &mut value {
            fields.insert(
                "identifier".into(),
                Value::message([
                    ("email", Value::from("a@x.io")),
                    ("phone_number", Value::from("+15550001111")),
                ]),
            );
        }
        let violation = validator.check_oneofs(&value).unwrap_err();
        assert!(violation
            .to_string()
            .contains("oneof constraint violated for group 'identifier'"));

        // One arm set, or none: fine.
        if let Value::Message(fields) = &mut value {
            fields.insert(
                "identifier".into(),
                Value::message([("email", Value::from("a@x.io"))]),
            );
        }
        validator.check_oneofs(&value).unwrap();
        if let Value::Message(fields) = &mut value {
            fields.remove("identifier");
        }
        validator.check_oneofs(&value).unwrap();
    }
}
