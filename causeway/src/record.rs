//! Record reflection.
//!
//! The schema synthesizer never inspects host types directly; it walks the
//! [`RecordType`] metadata that `#[derive(Record)]` emits at compile time.
//! The same metadata drives the conversion between typed records and the
//! dynamic [`Value`] form the codecs operate on.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::RecordError;
use crate::value::{MapKey, Value};

/// A reflected record type: message name plus the ordered field list.
#[derive(Clone, Debug)]
pub struct RecordType {
    /// Simple (unqualified) message name.
    pub name: &'static str,
    /// Identity of the host type, used for caching and cycle detection.
    pub type_id: TypeId,
    /// Leading doc comment, carried into source-code-info.
    pub doc: Option<&'static str>,
    pub fields: Vec<FieldMeta>,
}

impl RecordType {
    /// Metadata for the host type `T`.
    pub fn new<T: 'static>(name: &'static str) -> RecordType {
        RecordType {
            name,
            type_id: TypeId::of::<T>(),
            doc: None,
            fields: Vec::new(),
        }
    }

    pub fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn with_field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }
}

/// One reflected record field.
#[derive(Clone, Debug)]
pub struct FieldMeta {
    /// Proto field name: the record field name, or the JSON-style override.
    pub name: &'static str,
    /// Validation rule string from the `validate` attribute, if any.
    pub validate: Option<&'static str>,
    /// Default value literal (Editions only).
    pub default: Option<&'static str>,
    pub modifiers: Modifiers,
    /// Leading doc comment, carried into source-code-info.
    pub doc: Option<&'static str>,
    pub kind: FieldKind,
}

impl FieldMeta {
    pub fn new(name: &'static str, kind: FieldKind) -> FieldMeta {
        FieldMeta {
            name,
            validate: None,
            default: None,
            modifiers: Modifiers::default(),
            doc: None,
            kind,
        }
    }

    pub fn with_validate(mut self, rules: &'static str) -> Self {
        self.validate = Some(rules);
        self
    }

    pub fn with_default(mut self, literal: &'static str) -> Self {
        self.default = Some(literal);
        self
    }

    pub fn with_doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Proto-level modifiers extracted from the `#[proto(...)]` attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Editions legacy-required presence.
    pub required: bool,
    /// Editions implicit presence.
    pub implicit: bool,
    /// Editions explicit presence (the file default; only meaningful to
    /// cancel an inherited override).
    pub explicit: bool,
    /// Expanded repeated encoding.
    pub unpacked: bool,
    /// Explicit optional, same effect as an `Option<T>` field type.
    pub optional: bool,
    /// Force the target message to be rendered as `google.protobuf.Empty`.
    pub empty: bool,
    /// The field declares a oneof group over its target record's fields.
    pub oneof: bool,
}

impl Modifiers {
    pub fn is_plain(&self) -> bool {
        *self == Modifiers::default()
    }
}

/// The declared type of a field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Float,
    Double,
    String,
    Bytes,
    Enum(EnumRef),
    /// A nested record. The reference is lazy so cyclic type graphs can be
    /// described without recursing at metadata-build time.
    Message(MessageRef),
    Repeated(Box<FieldKind>),
    Map {
        key: Box<FieldKind>,
        value: Box<FieldKind>,
    },
    Optional(Box<FieldKind>),
    /// `std::time::SystemTime`, mapped to `.google.protobuf.Timestamp`.
    Timestamp,
    /// `std::time::Duration`, mapped to `.google.protobuf.Duration`.
    DurationKind,
    /// `serde_json::Map`, mapped to `.google.protobuf.Struct`.
    Struct,
    /// `serde_json::Value`, mapped to `.google.protobuf.Value`.
    JsonValue,
    /// `causeway::wkt::JsonList`, mapped to `.google.protobuf.ListValue`.
    ListValue,
    /// `causeway::wkt::FieldMask`, mapped to `.google.protobuf.FieldMask`.
    FieldMask,
    /// `causeway::wkt::Any`, mapped to `.google.protobuf.Any`.
    Any,
}

/// Map key types; anything else is rejected at build time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapKeyKind {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    String,
}

/// A lazy reference to another record type.
#[derive(Clone, Copy)]
pub struct MessageRef {
    get: fn() -> RecordType,
}

impl MessageRef {
    pub fn of<T: Record>() -> MessageRef {
        MessageRef {
            get: T::record_type,
        }
    }

    /// Build from a bare metadata function; used by hand-rolled records.
    pub fn from_fn(get: fn() -> RecordType) -> MessageRef {
        MessageRef { get }
    }

    pub fn record(&self) -> RecordType {
        (self.get)()
    }
}

impl PartialEq for MessageRef {
    fn eq(&self, other: &Self) -> bool {
        self.get as usize == other.get as usize
    }
}

impl std::fmt::Debug for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageRef({})", self.record().name)
    }
}

/// A lazy reference to a reflected enum type.
#[derive(Clone, Copy)]
pub struct EnumRef {
    get: fn() -> EnumType,
}

impl EnumRef {
    pub fn of<T: ProtoEnum>() -> EnumRef {
        EnumRef { get: T::enum_type }
    }

    pub fn enum_type(&self) -> EnumType {
        (self.get)()
    }
}

impl PartialEq for EnumRef {
    fn eq(&self, other: &Self) -> bool {
        self.get as usize == other.get as usize
    }
}

impl std::fmt::Debug for EnumRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EnumRef({})", self.enum_type().name)
    }
}

/// A reflected unit enum.
#[derive(Clone, Debug)]
pub struct EnumType {
    pub name: &'static str,
    pub type_id: TypeId,
    pub doc: Option<&'static str>,
    /// `(variant name, number)` pairs in declaration order.
    pub values: Vec<(&'static str, i32)>,
}

/// A host record that can be reflected and carried through the codecs.
///
/// Implemented via `#[derive(Record)]`; the derive also emits the matching
/// [`ProtoField`] impl so records nest as message-typed fields.
pub trait Record: Sized + Send + 'static {
    /// The reflected shape of this record.
    fn record_type() -> RecordType;

    /// Convert into the dynamic form, keyed by proto field name.
    fn to_value(&self) -> Value;

    /// Rebuild from the dynamic form. Absent fields arrive as
    /// [`Value::Unset`] and take their default.
    fn from_value(value: Value) -> Result<Self, RecordError>;
}

/// A fieldless enum usable as an enum-typed field.
pub trait ProtoEnum: Sized + Send + 'static {
    fn enum_type() -> EnumType;
    fn to_number(&self) -> i32;
    fn from_number(number: i32) -> Option<Self>;
}

/// A type usable as a record field.
pub trait ProtoField: Sized {
    fn field_kind() -> FieldKind;
    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Result<Self, RecordError>;
}

/// A scalar usable as a map key. The declared key kind comes from the
/// type's [`ProtoField`] impl; the synthesizer rejects anything outside the
/// supported scalar set at build time.
pub trait ProtoMapKey: ProtoField {
    fn into_map_key(self) -> MapKey;
    fn from_map_key(key: MapKey) -> Result<Self, RecordError>;
}

fn wrong_shape(expected: &'static str, got: &Value) -> RecordError {
    RecordError::WrongShape {
        expected,
        got: got.shape(),
    }
}

impl ProtoField for bool {
    fn field_kind() -> FieldKind {
        FieldKind::Bool
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(false),
            Value::Bool(b) => Ok(b),
            other => Err(wrong_shape("bool", &other)),
        }
    }
}

impl ProtoField for i32 {
    fn field_kind() -> FieldKind {
        FieldKind::Int32
    }

    fn into_value(self) -> Value {
        Value::Int(self.into())
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(0),
            Value::Int(n) => i32::try_from(n).map_err(|_| RecordError::OutOfRange("int32")),
            Value::UInt(n) => i32::try_from(n).map_err(|_| RecordError::OutOfRange("int32")),
            other => Err(wrong_shape("int32", &other)),
        }
    }
}

impl ProtoField for i64 {
    fn field_kind() -> FieldKind {
        FieldKind::Int64
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(0),
            Value::Int(n) => Ok(n),
            Value::UInt(n) => i64::try_from(n).map_err(|_| RecordError::OutOfRange("int64")),
            other => Err(wrong_shape("int64", &other)),
        }
    }
}

impl ProtoField for u32 {
    fn field_kind() -> FieldKind {
        FieldKind::UInt32
    }

    fn into_value(self) -> Value {
        Value::UInt(self.into())
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(0),
            Value::UInt(n) => u32::try_from(n).map_err(|_| RecordError::OutOfRange("uint32")),
            Value::Int(n) => u32::try_from(n).map_err(|_| RecordError::OutOfRange("uint32")),
            other => Err(wrong_shape("uint32", &other)),
        }
    }
}

impl ProtoField for u64 {
    fn field_kind() -> FieldKind {
        FieldKind::UInt64
    }

    fn into_value(self) -> Value {
        Value::UInt(self)
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(0),
            Value::UInt(n) => Ok(n),
            Value::Int(n) => u64::try_from(n).map_err(|_| RecordError::OutOfRange("uint64")),
            other => Err(wrong_shape("uint64", &other)),
        }
    }
}

impl ProtoField for f32 {
    fn field_kind() -> FieldKind {
        FieldKind::Float
    }

    fn into_value(self) -> Value {
        Value::Double(self.into())
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(0.0),
            Value::Double(n) => Ok(n as f32),
            Value::Int(n) => Ok(n as f32),
            Value::UInt(n) => Ok(n as f32),
            other => Err(wrong_shape("float", &other)),
        }
    }
}

impl ProtoField for f64 {
    fn field_kind() -> FieldKind {
        FieldKind::Double
    }

    fn into_value(self) -> Value {
        Value::Double(self)
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(0.0),
            Value::Double(n) => Ok(n),
            Value::Int(n) => Ok(n as f64),
            Value::UInt(n) => Ok(n as f64),
            other => Err(wrong_shape("double", &other)),
        }
    }
}

impl ProtoField for String {
    fn field_kind() -> FieldKind {
        FieldKind::String
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(String::new()),
            Value::String(s) => Ok(s),
            other => Err(wrong_shape("string", &other)),
        }
    }
}

impl ProtoField for Vec<u8> {
    fn field_kind() -> FieldKind {
        FieldKind::Bytes
    }

    fn into_value(self) -> Value {
        Value::Bytes(self)
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(Vec::new()),
            Value::Bytes(b) => Ok(b),
            other => Err(wrong_shape("bytes", &other)),
        }
    }
}

impl<T: ProtoField> ProtoField for Option<T> {
    fn field_kind() -> FieldKind {
        FieldKind::Optional(Box::new(T::field_kind()))
    }

    fn into_value(self) -> Value {
        match self {
            Some(inner) => inner.into_value(),
            None => Value::Unset,
        }
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ProtoField> ProtoField for Vec<T> {
    fn field_kind() -> FieldKind {
        FieldKind::Repeated(Box::new(T::field_kind()))
    }

    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(ProtoField::into_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(Vec::new()),
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(wrong_shape("list", &other)),
        }
    }
}

impl<K, V> ProtoField for HashMap<K, V>
where
    K: ProtoMapKey + Eq + std::hash::Hash,
    V: ProtoField,
{
    fn field_kind() -> FieldKind {
        FieldKind::Map {
            key: Box::new(K::field_kind()),
            value: Box::new(V::field_kind()),
        }
    }

    fn into_value(self) -> Value {
        Value::Map(
            self.into_iter()
                .map(|(k, v)| (k.into_map_key(), v.into_value()))
                .collect(),
        )
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(HashMap::new()),
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_map_key(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(wrong_shape("map", &other)),
        }
    }
}

impl<K, V> ProtoField for BTreeMap<K, V>
where
    K: ProtoMapKey + Ord,
    V: ProtoField,
{
    fn field_kind() -> FieldKind {
        FieldKind::Map {
            key: Box::new(K::field_kind()),
            value: Box::new(V::field_kind()),
        }
    }

    fn into_value(self) -> Value {
        Value::Map(
            self.into_iter()
                .map(|(k, v)| (k.into_map_key(), v.into_value()))
                .collect(),
        )
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(BTreeMap::new()),
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_map_key(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(wrong_shape("map", &other)),
        }
    }
}

impl ProtoField for SystemTime {
    fn field_kind() -> FieldKind {
        FieldKind::Timestamp
    }

    fn into_value(self) -> Value {
        let (seconds, nanos) = match self.duration_since(UNIX_EPOCH) {
            Ok(d) => (d.as_secs() as i64, d.subsec_nanos() as i64),
            // Pre-epoch instants carry negative seconds with non-negative
            // nanos, per the Timestamp contract.
            Err(e) => {
                let d = e.duration();
                if d.subsec_nanos() == 0 {
                    (-(d.as_secs() as i64), 0)
                } else {
                    (-(d.as_secs() as i64) - 1, 1_000_000_000 - d.subsec_nanos() as i64)
                }
            }
        };
        Value::message([("seconds", Value::Int(seconds)), ("nanos", Value::Int(nanos))])
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(UNIX_EPOCH),
            Value::Message(mut fields) => {
                let seconds = i64::from_value(fields.remove("seconds").unwrap_or_default())?;
                let nanos = i64::from_value(fields.remove("nanos").unwrap_or_default())?;
                let base = if seconds >= 0 {
                    UNIX_EPOCH.checked_add(Duration::from_secs(seconds as u64))
                } else {
                    UNIX_EPOCH.checked_sub(Duration::from_secs(seconds.unsigned_abs()))
                };
                base.and_then(|t| t.checked_add(Duration::from_nanos(nanos.max(0) as u64)))
                    .ok_or(RecordError::OutOfRange("timestamp"))
            }
            other => Err(wrong_shape("timestamp", &other)),
        }
    }
}

impl ProtoField for Duration {
    fn field_kind() -> FieldKind {
        FieldKind::DurationKind
    }

    fn into_value(self) -> Value {
        Value::message([
            ("seconds", Value::Int(self.as_secs() as i64)),
            ("nanos", Value::Int(self.subsec_nanos() as i64)),
        ])
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(Duration::ZERO),
            Value::Message(mut fields) => {
                let seconds = i64::from_value(fields.remove("seconds").unwrap_or_default())?;
                let nanos = i64::from_value(fields.remove("nanos").unwrap_or_default())?;
                if seconds < 0 || nanos < 0 {
                    return Err(RecordError::OutOfRange("duration"));
                }
                Ok(Duration::new(seconds as u64, nanos as u32))
            }
            other => Err(wrong_shape("duration", &other)),
        }
    }
}

impl ProtoField for serde_json::Value {
    fn field_kind() -> FieldKind {
        FieldKind::JsonValue
    }

    fn into_value(self) -> Value {
        Value::Json(self)
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(serde_json::Value::Null),
            Value::Json(v) => Ok(v),
            other => Err(wrong_shape("json value", &other)),
        }
    }
}

impl ProtoField for serde_json::Map<String, serde_json::Value> {
    fn field_kind() -> FieldKind {
        FieldKind::Struct
    }

    fn into_value(self) -> Value {
        Value::Json(serde_json::Value::Object(self))
    }

    fn from_value(value: Value) -> Result<Self, RecordError> {
        match value {
            Value::Unset => Ok(serde_json::Map::new()),
            Value::Json(serde_json::Value::Object(map)) => Ok(map),
            Value::Json(other) => Err(RecordError::WrongShape {
                expected: "json object",
                got: match other {
                    serde_json::Value::Null => "json null",
                    serde_json::Value::Bool(_) => "json bool",
                    serde_json::Value::Number(_) => "json number",
                    serde_json::Value::String(_) => "json string",
                    serde_json::Value::Array(_) => "json array",
                    serde_json::Value::Object(_) => unreachable!(),
                },
            }),
            other => Err(wrong_shape("json object", &other)),
        }
    }
}

macro_rules! impl_map_key {
    ($ty:ty, $variant:ident, $label:literal) => {
        impl ProtoMapKey for $ty {
            fn into_map_key(self) -> MapKey {
                MapKey::$variant(self.into())
            }

            fn from_map_key(key: MapKey) -> Result<Self, RecordError> {
                match key {
                    MapKey::$variant(v) => {
                        <$ty>::try_from(v).map_err(|_| RecordError::OutOfRange($label))
                    }
                    _ => Err(RecordError::WrongShape {
                        expected: $label,
                        got: "map key",
                    }),
                }
            }
        }
    };
}

impl_map_key!(i32, Int, "int32");
impl_map_key!(i64, Int, "int64");
impl_map_key!(u32, UInt, "uint32");
impl_map_key!(u64, UInt, "uint64");

impl ProtoMapKey for bool {
    fn into_map_key(self) -> MapKey {
        MapKey::Bool(self)
    }

    fn from_map_key(key: MapKey) -> Result<Self, RecordError> {
        match key {
            MapKey::Bool(b) => Ok(b),
            _ => Err(RecordError::WrongShape {
                expected: "bool",
                got: "map key",
            }),
        }
    }
}

impl ProtoMapKey for String {
    fn into_map_key(self) -> MapKey {
        MapKey::String(self)
    }

    fn from_map_key(key: MapKey) -> Result<Self, RecordError> {
        match key {
            MapKey::String(s) => Ok(s),
            _ => Err(RecordError::WrongShape {
                expected: "string",
                got: "map key",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_round_trip_through_values() {
        assert_eq!(i32::from_value(42i32.into_value()).unwrap(), 42);
        assert_eq!(u64::from_value(7u64.into_value()).unwrap(), 7);
        assert_eq!(
            String::from_value("hi".to_owned().into_value()).unwrap(),
            "hi"
        );
        assert_eq!(bool::from_value(Value::Unset).unwrap(), false);
    }

    #[test]
    fn option_maps_unset() {
        assert_eq!(Option::<i32>::from_value(Value::Unset).unwrap(), None);
        assert_eq!(Option::<i32>::from_value(Value::Int(3)).unwrap(), Some(3));
        assert_eq!(None::<String>.into_value(), Value::Unset);
    }

    #[test]
    fn timestamp_round_trips() {
        let t = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        let restored = SystemTime::from_value(t.into_value()).unwrap();
        assert_eq!(restored, t);
    }

    #[test]
    fn pre_epoch_timestamp_uses_negative_seconds() {
        let t = UNIX_EPOCH - Duration::from_secs(30);
        match t.into_value() {
            Value::Message(fields) => {
                assert_eq!(fields.get("seconds"), Some(&Value::Int(-30)));
                assert_eq!(fields.get("nanos"), Some(&Value::Int(0)));
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_int_is_rejected() {
        let err = i32::from_value(Value::Int(i64::MAX)).unwrap_err();
        assert!(matches!(err, RecordError::OutOfRange("int32")));
    }

    #[test]
    fn map_kind_carries_key_and_value() {
        let kind = <BTreeMap<u32, String>>::field_kind();
        assert_eq!(
            kind,
            FieldKind::Map {
                key: Box::new(FieldKind::UInt32),
                value: Box::new(FieldKind::String),
            }
        );
    }
}
