//! BSON to JSON type mappings.
//!
//! Records are emitted as plain JSON. JSON-native BSON values map directly;
//! every other value is written in its string form so that clients never see
//! extended-JSON wrappers such as `{"$oid": ...}`.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bson::{Bson, Document};
use serde_json::Value as JsonValue;

/// Convert one record to a JSON object.
pub fn document_to_json(document: &Document) -> JsonValue {
    JsonValue::Object(document_to_map(document))
}

fn document_to_map(document: &Document) -> serde_json::Map<String, JsonValue> {
    document
        .iter()
        .map(|(key, value)| (key.clone(), bson_to_json(value)))
        .collect()
}

/// Convert a single BSON value.
pub fn bson_to_json(value: &Bson) -> JsonValue {
    match value {
        Bson::Null | Bson::Undefined => JsonValue::Null,
        Bson::Boolean(b) => JsonValue::Bool(*b),
        Bson::Int32(i) => JsonValue::from(*i),
        Bson::Int64(i) => JsonValue::from(*i),
        Bson::Double(f) => float_to_json(*f),
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => {
            JsonValue::String(s.clone())
        }
        Bson::Array(items) => JsonValue::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(document) => document_to_json(document),
        Bson::ObjectId(oid) => JsonValue::String(oid.to_hex()),
        Bson::DateTime(dt) => JsonValue::String(
            dt.try_to_rfc3339_string()
                .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        ),
        Bson::Binary(binary) => JsonValue::String(STANDARD.encode(&binary.bytes)),
        Bson::Timestamp(ts) => {
            JsonValue::String(format!("Timestamp({}, {})", ts.time, ts.increment))
        }
        Bson::RegularExpression(regex) => {
            JsonValue::String(format!("/{}/{}", regex.pattern, regex.options))
        }
        Bson::JavaScriptCodeWithScope(code) => JsonValue::String(code.code.clone()),
        Bson::Decimal128(_) => decimal_to_json(value),
        Bson::MaxKey => JsonValue::String("MaxKey".to_string()),
        Bson::MinKey => JsonValue::String("MinKey".to_string()),
        other => JsonValue::String(other.clone().into_relaxed_extjson().to_string()),
    }
}

/// Non-finite doubles have no JSON representation and are written as text.
fn float_to_json(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(value.to_string()))
}

fn decimal_to_json(value: &Bson) -> JsonValue {
    match value.clone().into_relaxed_extjson() {
        JsonValue::Object(mut wrapper) => wrapper
            .remove("$numberDecimal")
            .unwrap_or(JsonValue::Null),
        other => other,
    }
}
