//! Wire codecs for `causeway`.
//!
//! Owns the synthesized descriptors at request time: a [`SchemaPool`]
//! resolves a descriptor set once, and [`MethodCodecs`] bundles the input
//! and output schemas of one method with the validator derived from its
//! `validate` tags. Two codecs cover the wire formats the gateway speaks:
//! canonical Protobuf-JSON and the Protobuf binary format.

pub mod binary;
pub mod error;
pub mod json;
pub mod schema_pool;
pub mod validate;

use std::sync::Arc;

use causeway::value::Value;

pub use error::CodecError;
pub use schema_pool::{
    EnumSchema, FieldSchema, FieldType, MapSchema, MessageSchema, OneofSchema, SchemaPool,
};
pub use validate::{Validator, Violation};

/// The two wire forms a unary payload can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    Binary,
}

/// Select the codec for a request content type, ignoring parameters.
///
/// Returns `None` for content types outside the supported table.
pub fn wire_format_for(content_type: &str) -> Option<WireFormat> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "application/json" | "application/grpc-web+json" | "application/grpc+json" => {
            Some(WireFormat::Json)
        }
        "application/proto"
        | "application/protobuf"
        | "application/grpc"
        | "application/grpc+proto"
        | "application/grpc-web"
        | "application/grpc-web+proto" => Some(WireFormat::Binary),
        _ => None,
    }
}

/// The per-method codec triple: input schema, output schema, validator.
#[derive(Clone, Debug)]
pub struct MethodCodecs {
    pool: Arc<SchemaPool>,
    input: String,
    output: String,
    validator: Validator,
}

impl MethodCodecs {
    pub fn new(
        pool: Arc<SchemaPool>,
        input: impl Into<String>,
        output: impl Into<String>,
        validator: Validator,
    ) -> MethodCodecs {
        MethodCodecs {
            pool,
            input: input.into(),
            output: output.into(),
            validator,
        }
    }

    pub fn pool(&self) -> &Arc<SchemaPool> {
        &self.pool
    }

    pub fn input_type(&self) -> &str {
        &self.input
    }

    pub fn output_type(&self) -> &str {
        &self.output
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn decode_input(&self, format: WireFormat, data: &[u8]) -> Result<Value, CodecError> {
        match format {
            WireFormat::Json => json::decode(&self.pool, &self.input, data),
            WireFormat::Binary => binary::decode(&self.pool, &self.input, data),
        }
    }

    pub fn encode_output(&self, format: WireFormat, value: &Value) -> Result<Vec<u8>, CodecError> {
        match format {
            WireFormat::Json => json::encode(&self.pool, &self.output, value),
            WireFormat::Binary => binary::encode(&self.pool, &self.output, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causeway::wkt::FieldMask;
    use causeway::{Record, RpcError, Service};
    use causeway_schema::{SchemaBuilder, SchemaConfig};
    use std::collections::BTreeMap;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    #[derive(Record, Clone, Debug, PartialEq)]
    struct Profile {
        name: String,
        /// Optional nickname with explicit presence.
        nickname: Option<String>,
        age: u32,
        scores: Vec<i64>,
        attributes: BTreeMap<String, String>,
        counts: BTreeMap<u32, i64>,
        created_at: SystemTime,
        session_ttl: Duration,
        mask: FieldMask,
    }

    #[derive(Record, Clone, Debug, Default, PartialEq)]
    struct ProfileReply {
        ok: bool,
    }

    impl Default for Profile {
        fn default() -> Self {
            Profile {
                name: String::new(),
                nickname: None,
                age: 0,
                scores: Vec::new(),
                attributes: BTreeMap::new(),
                counts: BTreeMap::new(),
                created_at: UNIX_EPOCH,
                session_ttl: Duration::ZERO,
                mask: FieldMask::default(),
            }
        }
    }

    fn codecs() -> MethodCodecs {
        let service = Service::builder("profile.v1", "ProfileService")
            .unary("Put", |_ctx, _req: Profile| async move {
                Ok::<_, RpcError>(ProfileReply { ok: true })
            })
            .build()
            .unwrap();
        let builder = SchemaBuilder::new(SchemaConfig::for_service(&service));
        let set = builder.build_service_set(&service).unwrap();
        let pool = Arc::new(SchemaPool::from_set(&set).unwrap());
        MethodCodecs::new(
            pool,
            ".profile.v1.Profile",
            ".profile.v1.ProfileReply",
            Validator::default(),
        )
    }

    fn sample() -> Profile {
        Profile {
            name: "Alice".into(),
            nickname: Some("al".into()),
            age: 30,
            scores: vec![5, -3, 12],
            attributes: BTreeMap::from([("tier".into(), "gold".into())]),
            counts: BTreeMap::from([(7, -1), (9, 250)]),
            created_at: UNIX_EPOCH + Duration::new(1_700_000_000, 42),
            session_ttl: Duration::from_secs(90),
            mask: FieldMask::new(["name", "age"]),
        }
    }

    #[test]
    fn json_round_trips_a_full_record() {
        let codecs = codecs();
        let original = sample();
        let bytes = json::encode(
            codecs.pool(),
            codecs.input_type(),
            &original.to_value(),
        )
        .unwrap();
        let decoded = codecs.decode_input(WireFormat::Json, &bytes).unwrap();
        assert_eq!(Profile::from_value(decoded).unwrap(), original);
    }

    #[test]
    fn binary_round_trips_a_full_record() {
        let codecs = codecs();
        let original = sample();
        let bytes = binary::encode(
            codecs.pool(),
            codecs.input_type(),
            &original.to_value(),
        )
        .unwrap();
        let decoded = codecs.decode_input(WireFormat::Binary, &bytes).unwrap();
        assert_eq!(Profile::from_value(decoded).unwrap(), original);
    }

    #[test]
    fn json_uses_canonical_forms() {
        let codecs = codecs();
        let bytes = json::encode(codecs.pool(), codecs.input_type(), &sample().to_value()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        // Timestamp as RFC 3339, Duration as a seconds string, 64-bit ints
        // as strings, field mask as a paths array.
        assert!(json["createdAt"].as_str().unwrap().starts_with("2023-11-1"));
        assert_eq!(json["sessionTtl"], serde_json::json!("90s"));
        assert_eq!(json["scores"][1], serde_json::json!("-3"));
        assert_eq!(json["mask"], serde_json::json!(["name", "age"]));
        assert_eq!(json["attributes"]["tier"], serde_json::json!("gold"));
        // Non-string scalar map keys render as strings.
        assert_eq!(json["counts"]["7"], serde_json::json!("-1"));
    }

    #[test]
    fn decode_accepts_original_field_names_and_ignores_unknowns() {
        let codecs = codecs();
        let body = br#"{"name":"Bob","created_at":"1970-01-01T00:00:00Z","wat":1}"#;
        let decoded = codecs.decode_input(WireFormat::Json, body).unwrap();
        let profile = Profile::from_value(decoded).unwrap();
        assert_eq!(profile.name, "Bob");
        assert_eq!(profile.created_at, UNIX_EPOCH);
    }

    #[test]
    fn empty_repeated_is_absent_on_both_wires() {
        let codecs = codecs();
        let empty = Profile::default();
        let json_bytes =
            json::encode(codecs.pool(), codecs.input_type(), &empty.to_value()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&json_bytes).unwrap();
        assert!(json.get("scores").is_none());

        let bin = binary::encode(codecs.pool(), codecs.input_type(), &empty.to_value()).unwrap();
        // Only explicit-presence fields survive; the empty list contributes
        // no bytes at all.
        let decoded = codecs.decode_input(WireFormat::Binary, &bin).unwrap();
        assert_eq!(Profile::from_value(decoded).unwrap().scores, Vec::<i64>::new());
    }

    #[test]
    fn wire_format_table_matches_content_types() {
        assert_eq!(wire_format_for("application/json"), Some(WireFormat::Json));
        assert_eq!(
            wire_format_for("application/json; charset=utf-8"),
            Some(WireFormat::Json)
        );
        assert_eq!(
            wire_format_for("application/proto"),
            Some(WireFormat::Binary)
        );
        assert_eq!(
            wire_format_for("application/protobuf"),
            Some(WireFormat::Binary)
        );
        assert_eq!(
            wire_format_for("application/grpc-web+json"),
            Some(WireFormat::Json)
        );
        assert_eq!(
            wire_format_for("application/grpc+proto"),
            Some(WireFormat::Binary)
        );
        assert_eq!(wire_format_for("text/html"), None);
    }

    #[test]
    fn unknown_binary_fields_are_skipped() {
        let codecs = codecs();
        let mut bytes = binary::encode(
            codecs.pool(),
            codecs.input_type(),
            &sample().to_value(),
        )
        .unwrap();
        // Append a field the schema does not know: tag 99, varint 7.
        prost::encoding::encode_key(99, prost::encoding::WireType::Varint, &mut bytes);
        prost::encoding::encode_varint(7, &mut bytes);
        let decoded = codecs.decode_input(WireFormat::Binary, &bytes).unwrap();
        assert_eq!(Profile::from_value(decoded).unwrap(), sample());
    }
}
