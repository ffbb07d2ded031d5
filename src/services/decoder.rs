//! Decoder for schema-registered Avro payloads
//!
//! Wire format: one magic byte (0x00), a big-endian u32 schema id, then the
//! Avro binary datum written with that schema.

use apache_avro::types::Value as AvroValue;
use apache_avro::from_avro_datum;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

use super::schema_registry::SchemaSource;

pub const MAGIC_BYTE: u8 = 0x00;
const HEADER_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    EmptyPayload,
    MagicByte(u8),
    Truncated(usize),
    UnknownSchema(u32),
    Registry(String),
    Schema(String),
    Body { schema_id: u32, message: String },
    Mismatch { schema_id: u32, message: String },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::EmptyPayload => write!(f, "Empty payload"),
            DecodeError::MagicByte(b) => write!(f, "Unexpected magic byte 0x{:02x}", b),
            DecodeError::Truncated(len) => {
                write!(f, "Payload truncated: {} bytes, need at least {}", len, HEADER_LEN)
            }
            DecodeError::UnknownSchema(id) => write!(f, "Unknown schema id {}", id),
            DecodeError::Registry(msg) => write!(f, "Schema registry error: {}", msg),
            DecodeError::Schema(msg) => write!(f, "Schema error: {}", msg),
            DecodeError::Body { schema_id, message } => {
                write!(f, "Body does not decode with schema {}: {}", schema_id, message)
            }
            DecodeError::Mismatch { schema_id, message } => {
                write!(f, "Record does not match schema {}: {}", schema_id, message)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Split a payload into its schema id and Avro body
pub fn split_wire_format(payload: &[u8]) -> Result<(u32, &[u8]), DecodeError> {
    match payload.first() {
        None => return Err(DecodeError::EmptyPayload),
        Some(&b) if b != MAGIC_BYTE => return Err(DecodeError::MagicByte(b)),
        Some(_) => {}
    }

    if payload.len() < HEADER_LEN {
        return Err(DecodeError::Truncated(payload.len()));
    }

    let schema_id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
    Ok((schema_id, &payload[HEADER_LEN..]))
}

/// Long-lived decoder shared by every worker. Read-mostly once schemas are cached.
#[derive(Clone)]
pub struct AvroDecoder {
    schemas: Arc<dyn SchemaSource>,
}

impl AvroDecoder {
    pub fn new(schemas: Arc<dyn SchemaSource>) -> Self {
        Self { schemas }
    }

    pub async fn decode_value(&self, payload: &[u8]) -> Result<(u32, AvroValue), DecodeError> {
        let (schema_id, body) = split_wire_format(payload)?;
        let schema = self.schemas.schema(schema_id).await?;

        let mut reader = body;
        let value = from_avro_datum(&schema, &mut reader, None).map_err(|e| DecodeError::Body {
            schema_id,
            message: e.to_string(),
        })?;

        Ok((schema_id, value))
    }

    /// Decode a payload straight into a typed record
    pub async fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, DecodeError> {
        let (schema_id, value) = self.decode_value(payload).await?;
        let json = avro_to_json(&value).map_err(|message| DecodeError::Mismatch { schema_id, message })?;
        debug!(schema_id, "Decoded Avro payload");

        serde_json::from_value(json).map_err(|e| DecodeError::Mismatch {
            schema_id,
            message: e.to_string(),
        })
    }
}

/// Projection of an Avro value onto JSON. Unions collapse to their branch,
/// records and maps become objects, time logical types stay numeric and uuids
/// become their canonical string. Values with no faithful JSON form (fixed-scale
/// `decimal`, `duration`) are rejected instead of being stringified.
pub fn avro_to_json(value: &AvroValue) -> Result<JsonValue, String> {
    let json = match value {
        AvroValue::Null => JsonValue::Null,
        AvroValue::Boolean(b) => JsonValue::Bool(*b),
        AvroValue::Int(i) | AvroValue::Date(i) | AvroValue::TimeMillis(i) => JsonValue::from(*i),
        AvroValue::Long(l)
        | AvroValue::TimeMicros(l)
        | AvroValue::TimestampMillis(l)
        | AvroValue::TimestampMicros(l)
        | AvroValue::TimestampNanos(l)
        | AvroValue::LocalTimestampMillis(l)
        | AvroValue::LocalTimestampMicros(l)
        | AvroValue::LocalTimestampNanos(l) => JsonValue::from(*l),
        AvroValue::Float(f) => Number::from_f64(f64::from(*f))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        AvroValue::Double(d) => Number::from_f64(*d)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        AvroValue::String(s) | AvroValue::Enum(_, s) => JsonValue::String(s.clone()),
        AvroValue::Uuid(u) => JsonValue::String(u.to_string()),
        AvroValue::BigDecimal(d) => JsonValue::String(d.to_string()),
        AvroValue::Bytes(bytes) | AvroValue::Fixed(_, bytes) => {
            JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect())
        }
        AvroValue::Union(_, inner) => avro_to_json(inner)?,
        AvroValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(avro_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        AvroValue::Map(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), avro_to_json(v)?)))
                .collect::<Result<Map<String, JsonValue>, String>>()?,
        ),
        AvroValue::Record(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), avro_to_json(v)?)))
                .collect::<Result<Map<String, JsonValue>, String>>()?,
        ),
        AvroValue::Decimal(_) => {
            return Err("decimal logical type needs its schema scale, publish it as a string".to_string());
        }
        other => return Err(format!("unsupported Avro value {:?}", other)),
    };

    Ok(json)
}
