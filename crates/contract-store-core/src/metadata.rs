//! Contract metadata: the closed storage type set and the sanitizer.
//!
//! Extraction output is untrusted `serde_json` data: it may carry nulls,
//! blank strings, empty collections or nested structures. [`sanitize`]
//! reduces it to a [`SanitizedMetadata`] map whose values are all
//! [`StoredValue`]s, which every [`Store`](crate::store::Store) backend can
//! persist.
//!
//! # Rules
//!
//! | Input | Stored as |
//! |-------|-----------|
//! | `null` | omitted |
//! | blank / whitespace-only string | omitted |
//! | string, bool | unchanged |
//! | number fitting `i64` | [`StoredValue::Integer`] |
//! | fractional number | [`StoredValue::Float`] |
//! | other number (`u64` above `i64::MAX`) | its string form |
//! | empty array / object | omitted |
//! | array | [`StoredValue::EncodedSequence`] (compact JSON) |
//! | object | [`StoredValue::EncodedMapping`] (compact JSON) |
//!
//! Structured values carry an explicit tag, so reading them back never
//! has to guess. The flat interchange layout carries the tags separately
//! as [`FlatKinds`]; the leading-bracket heuristic ([`decode_untagged`])
//! is only used for flat data that comes without them.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Store-controlled ingestion timestamp (RFC 3339).
pub const INGESTED_AT: &str = "ingested_at";
/// Character count of the contract text.
pub const TEXT_LENGTH: &str = "text_length";
/// Set to `true` when no caller-supplied field survived sanitization.
pub const NO_EXTRACTED_DATA: &str = "no_extracted_data";

/// Keys owned by the store. Caller values under these names are replaced.
pub const RESERVED_KEYS: [&str; 3] = [INGESTED_AT, TEXT_LENGTH, NO_EXTRACTED_DATA];

/// A metadata value in its persistable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// A non-empty JSON array, compact-encoded.
    EncodedSequence(String),
    /// A non-empty JSON object, compact-encoded.
    EncodedMapping(String),
}

/// Sanitized metadata for one contract, keyed by field name.
pub type SanitizedMetadata = BTreeMap<String, StoredValue>;

/// The tag of a [`StoredValue`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Boolean,
    EncodedSequence,
    EncodedMapping,
}

/// Per-field tags accompanying a flat metadata map.
pub type FlatKinds = BTreeMap<String, ValueKind>;

/// A stored structured field that no longer decodes.
///
/// Only reachable through corrupted rows. Readers recover by using the raw
/// string in place of the structure.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("structured field does not decode ({reason}): {raw}")]
pub struct MalformedField {
    pub raw: String,
    pub reason: String,
}

impl StoredValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            StoredValue::String(_) => ValueKind::String,
            StoredValue::Integer(_) => ValueKind::Integer,
            StoredValue::Float(_) => ValueKind::Float,
            StoredValue::Boolean(_) => ValueKind::Boolean,
            StoredValue::EncodedSequence(_) => ValueKind::EncodedSequence,
            StoredValue::EncodedMapping(_) => ValueKind::EncodedMapping,
        }
    }

    /// Rebuild a value of a known kind from its flat form. `None` when the
    /// flat value does not fit the kind.
    pub fn from_flat(kind: ValueKind, flat: &Value) -> Option<StoredValue> {
        match (kind, flat) {
            (ValueKind::String, Value::String(s)) => Some(StoredValue::String(s.clone())),
            (ValueKind::Integer, v) => v.as_i64().map(StoredValue::Integer),
            (ValueKind::Float, v) => v.as_f64().map(StoredValue::Float),
            (ValueKind::Boolean, Value::Bool(b)) => Some(StoredValue::Boolean(*b)),
            (ValueKind::EncodedSequence, Value::String(s)) => decode_structured(s, Value::is_array)
                .ok()
                .map(|_| StoredValue::EncodedSequence(s.clone())),
            (ValueKind::EncodedMapping, Value::String(s)) => decode_structured(s, Value::is_object)
                .ok()
                .map(|_| StoredValue::EncodedMapping(s.clone())),
            _ => None,
        }
    }

    /// Decode into the logical JSON value.
    pub fn try_decode(&self) -> Result<Value, MalformedField> {
        match self {
            StoredValue::String(s) => Ok(Value::String(s.clone())),
            StoredValue::Integer(i) => Ok(Value::from(*i)),
            StoredValue::Float(f) => Ok(serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string()))),
            StoredValue::Boolean(b) => Ok(Value::Bool(*b)),
            StoredValue::EncodedSequence(raw) => decode_structured(raw, Value::is_array),
            StoredValue::EncodedMapping(raw) => decode_structured(raw, Value::is_object),
        }
    }

    /// The flat primitive form used by the interchange layout: structured
    /// values become their encoded strings.
    pub fn to_flat(&self) -> Value {
        match self {
            StoredValue::EncodedSequence(raw) | StoredValue::EncodedMapping(raw) => {
                Value::String(raw.clone())
            }
            other => other
                .try_decode()
                .unwrap_or_else(|e| Value::String(e.raw)),
        }
    }
}

fn decode_structured(raw: &str, expected: fn(&Value) -> bool) -> Result<Value, MalformedField> {
    match serde_json::from_str::<Value>(raw) {
        Ok(v) if expected(&v) => Ok(v),
        Ok(_) => Err(MalformedField {
            raw: raw.to_string(),
            reason: "unexpected JSON type".to_string(),
        }),
        Err(e) => Err(MalformedField {
            raw: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Sanitize a single value. Returns `None` when the value is dropped.
pub fn sanitize_value(value: &Value) -> Option<StoredValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(StoredValue::Boolean(*b)),
        Value::String(s) => non_blank(s).map(|s| StoredValue::String(s.to_string())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(StoredValue::Integer(i))
            } else if n.is_f64() {
                n.as_f64().map(StoredValue::Float)
            } else {
                non_blank(&n.to_string()).map(|s| StoredValue::String(s.to_string()))
            }
        }
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Array(_) => Some(StoredValue::EncodedSequence(value.to_string())),
        Value::Object(_) => Some(StoredValue::EncodedMapping(value.to_string())),
    }
}

fn non_blank(s: &str) -> Option<&str> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Apply the per-key rules to every field, without injecting anything.
pub fn sanitize_fields(raw: &Map<String, Value>) -> SanitizedMetadata {
    raw.iter()
        .filter_map(|(key, value)| sanitize_value(value).map(|v| (key.clone(), v)))
        .collect()
}

/// Sanitize extracted fields and inject the store-controlled diagnostics.
///
/// The result always contains [`INGESTED_AT`] and [`TEXT_LENGTH`]; when
/// none of the caller's fields survived it also carries
/// [`NO_EXTRACTED_DATA`] = `true`. Never fails.
pub fn sanitize(
    raw: &Map<String, Value>,
    text: &str,
    ingested_at: DateTime<Utc>,
) -> SanitizedMetadata {
    let mut out: SanitizedMetadata = raw
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .filter_map(|(key, value)| sanitize_value(value).map(|v| (key.clone(), v)))
        .collect();

    let informative = !out.is_empty();

    out.insert(
        INGESTED_AT.to_string(),
        StoredValue::String(ingested_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    out.insert(
        TEXT_LENGTH.to_string(),
        StoredValue::Integer(text.chars().count() as i64),
    );
    if !informative {
        out.insert(NO_EXTRACTED_DATA.to_string(), StoredValue::Boolean(true));
    }

    out
}

/// Decode every field into its logical value.
///
/// Malformed structured fields are logged and returned as raw strings.
pub fn decode_metadata(metadata: &SanitizedMetadata) -> Map<String, Value> {
    metadata
        .iter()
        .map(|(key, stored)| {
            let value = stored.try_decode().unwrap_or_else(|e| {
                tracing::warn!(field = %key, error = %e, "keeping malformed structured field as text");
                Value::String(e.raw)
            });
            (key.clone(), value)
        })
        .collect()
}

/// Leading-bracket heuristic for untagged strings.
///
/// Strings starting with `[` or `{` that parse as a JSON array or object
/// are returned decoded; everything else, including strings that fail to
/// parse, is returned unchanged as a string.
pub fn decode_untagged(raw: &str) -> Value {
    if raw.starts_with('[') || raw.starts_with('{') {
        match serde_json::from_str::<Value>(raw) {
            Ok(v @ (Value::Array(_) | Value::Object(_))) => return v,
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "bracketed string is not JSON, keeping text"),
        }
    }
    Value::String(raw.to_string())
}

/// Flatten to primitives with structured values JSON-encoded as strings.
pub fn to_flat(metadata: &SanitizedMetadata) -> Map<String, Value> {
    metadata
        .iter()
        .map(|(key, stored)| (key.clone(), stored.to_flat()))
        .collect()
}

/// The tag of every field, to travel alongside [`to_flat`].
pub fn flat_kinds(metadata: &SanitizedMetadata) -> FlatKinds {
    metadata
        .iter()
        .map(|(key, stored)| (key.clone(), stored.kind()))
        .collect()
}

/// Rebuild tagged metadata from the flat layout.
///
/// Fields listed in `kinds` are restored with their recorded tag. The
/// others (or all of them, without `kinds`) are recognised with
/// [`decode_untagged`]; an encoded empty collection is not something the
/// sanitizer writes, so it stays a plain string.
pub fn from_flat(flat: &Map<String, Value>, kinds: Option<&FlatKinds>) -> SanitizedMetadata {
    flat.iter()
        .filter_map(|(key, value)| {
            if let Some(kind) = kinds.and_then(|k| k.get(key)) {
                match StoredValue::from_flat(*kind, value) {
                    Some(stored) => return Some((key.clone(), stored)),
                    None => tracing::warn!(field = %key, ?kind, "flat value does not match its kind"),
                }
            }
            let stored = match value {
                Value::String(s) => match decode_untagged(s) {
                    Value::Array(items) if !items.is_empty() => {
                        StoredValue::EncodedSequence(Value::Array(items).to_string())
                    }
                    Value::Object(map) if !map.is_empty() => {
                        StoredValue::EncodedMapping(Value::Object(map).to_string())
                    }
                    _ => return sanitize_value(value).map(|v| (key.clone(), v)),
                },
                other => return sanitize_value(other).map(|v| (key.clone(), v)),
            };
            Some((key.clone(), stored))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_drops_null_blank_and_empty_collections() {
        let raw = fields(json!({
            "a": null,
            "b": "",
            "c": "   \t",
            "d": [],
            "e": {},
            "keep": "value"
        }));
        let out = sanitize_fields(&raw);
        assert_eq!(out.len(), 1);
        assert_eq!(out["keep"], StoredValue::String("value".to_string()));
    }

    #[test]
    fn test_primitives_pass_through() {
        let raw = fields(json!({
            "total_amount": 1000,
            "rate": 2.5,
            "signed": true,
            "currency": " USD "
        }));
        let out = sanitize_fields(&raw);
        assert_eq!(out["total_amount"], StoredValue::Integer(1000));
        assert_eq!(out["rate"], StoredValue::Float(2.5));
        assert_eq!(out["signed"], StoredValue::Boolean(true));
        // Non-blank strings are kept verbatim, surrounding spaces included.
        assert_eq!(out["currency"], StoredValue::String(" USD ".to_string()));
    }

    #[test]
    fn test_huge_unsigned_falls_back_to_string() {
        let raw = fields(json!({ "serial": u64::MAX }));
        let out = sanitize_fields(&raw);
        assert_eq!(
            out["serial"],
            StoredValue::String("18446744073709551615".to_string())
        );
    }

    #[test]
    fn test_structures_are_encoded() {
        let raw = fields(json!({
            "parties": ["Acme", "Beta"],
            "penalty": { "late_fee": 50 }
        }));
        let out = sanitize_fields(&raw);
        assert_eq!(
            out["parties"],
            StoredValue::EncodedSequence(r#"["Acme","Beta"]"#.to_string())
        );
        assert_eq!(
            out["penalty"],
            StoredValue::EncodedMapping(r#"{"late_fee":50}"#.to_string())
        );
    }

    #[test]
    fn test_non_ascii_is_not_escaped() {
        let raw = fields(json!({ "parties": ["Compañía Ñandú"] }));
        let out = sanitize_fields(&raw);
        assert_eq!(
            out["parties"],
            StoredValue::EncodedSequence(r#"["Compañía Ñandú"]"#.to_string())
        );
    }

    #[test]
    fn test_sanitize_empty_injects_diagnostics_and_flag() {
        let out = sanitize(&Map::new(), "hello", now());
        let keys: Vec<&str> = out.keys().map(String::as_str).collect();
        assert_eq!(keys, vec![INGESTED_AT, NO_EXTRACTED_DATA, TEXT_LENGTH]);
        assert_eq!(out[TEXT_LENGTH], StoredValue::Integer(5));
        assert_eq!(out[NO_EXTRACTED_DATA], StoredValue::Boolean(true));
        assert_eq!(
            out[INGESTED_AT],
            StoredValue::String("2024-03-01T10:00:00.000000Z".to_string())
        );
    }

    #[test]
    fn test_sanitize_all_dropped_still_flags() {
        let raw = fields(json!({ "parties": [], "currency": null, "subject_matter": " " }));
        let out = sanitize(&raw, "", now());
        assert_eq!(out.len(), 3);
        assert_eq!(out[NO_EXTRACTED_DATA], StoredValue::Boolean(true));
    }

    #[test]
    fn test_sanitize_with_fields_has_no_flag() {
        let raw = fields(json!({ "currency": "EUR" }));
        let out = sanitize(&raw, "texto ñ", now());
        assert!(!out.contains_key(NO_EXTRACTED_DATA));
        assert_eq!(out[TEXT_LENGTH], StoredValue::Integer(7));
    }

    #[test]
    fn test_reserved_keys_are_store_controlled() {
        let raw = fields(json!({
            "ingested_at": "1999-01-01",
            "text_length": 99999,
            "no_extracted_data": false
        }));
        let out = sanitize(&raw, "abc", now());
        assert_eq!(out[TEXT_LENGTH], StoredValue::Integer(3));
        assert_eq!(out[NO_EXTRACTED_DATA], StoredValue::Boolean(true));
        assert_ne!(out[INGESTED_AT], StoredValue::String("1999-01-01".to_string()));
    }

    #[test]
    fn test_decode_restores_structures() {
        let raw = fields(json!({
            "parties": ["Acme", "Beta"],
            "total_amount": 1000,
            "currency": "USD"
        }));
        let decoded = decode_metadata(&sanitize_fields(&raw));
        assert_eq!(decoded, raw);
    }

    #[test]
    fn test_tagged_string_with_bracket_stays_string() {
        let raw = fields(json!({ "subject_matter": "[DRAFT] warehouse lease" }));
        let decoded = decode_metadata(&sanitize_fields(&raw));
        assert_eq!(decoded["subject_matter"], json!("[DRAFT] warehouse lease"));
    }

    #[test]
    fn test_malformed_structured_field_recovers_raw() {
        let mut meta = SanitizedMetadata::new();
        meta.insert(
            "parties".to_string(),
            StoredValue::EncodedSequence("[\"Acme\",".to_string()),
        );
        let decoded = decode_metadata(&meta);
        assert_eq!(decoded["parties"], json!("[\"Acme\","));
    }

    #[test]
    fn test_decode_untagged_heuristic() {
        assert_eq!(decode_untagged(r#"["a","b"]"#), json!(["a", "b"]));
        assert_eq!(decode_untagged(r#"{"k":1}"#), json!({"k": 1}));
        assert_eq!(decode_untagged("[not json"), json!("[not json"));
        assert_eq!(decode_untagged("plain"), json!("plain"));
    }

    #[test]
    fn test_flat_layout_roundtrip() {
        let raw = fields(json!({
            "parties": ["Acme", "Beta"],
            "penalty": { "late_fee": 50 },
            "total_amount": 1000,
            "rate": 0.5,
            "subject_matter": "[DRAFT] lease",
            "literal": "[]"
        }));
        let tagged = sanitize_fields(&raw);
        let flat = to_flat(&tagged);
        assert_eq!(flat["parties"], json!(r#"["Acme","Beta"]"#));
        assert_eq!(flat["total_amount"], json!(1000));

        let restored = from_flat(&flat, None);
        assert_eq!(restored["parties"], tagged["parties"]);
        assert_eq!(restored["penalty"], tagged["penalty"]);
        assert_eq!(restored["total_amount"], StoredValue::Integer(1000));
        assert_eq!(restored["rate"], StoredValue::Float(0.5));
        assert_eq!(
            restored["subject_matter"],
            StoredValue::String("[DRAFT] lease".to_string())
        );
        assert_eq!(restored["literal"], StoredValue::String("[]".to_string()));
    }

    #[test]
    fn test_flat_kinds_keep_json_looking_strings() {
        let tagged = sanitize_fields(&fields(json!({
            "note": "[\"Acme\"]",
            "clause": "{\"a\":1}",
            "parties": ["Acme"]
        })));
        let flat = to_flat(&tagged);
        let kinds = flat_kinds(&tagged);
        assert_eq!(kinds["note"], ValueKind::String);
        assert_eq!(kinds["parties"], ValueKind::EncodedSequence);

        let restored = from_flat(&flat, Some(&kinds));
        assert_eq!(restored, tagged);
        assert_eq!(
            restored["note"],
            StoredValue::String(r#"["Acme"]"#.to_string())
        );

        // Without kinds the bracket heuristic still applies.
        assert_eq!(
            from_flat(&flat, None)["note"],
            StoredValue::EncodedSequence(r#"["Acme"]"#.to_string())
        );
    }

    #[test]
    fn test_flat_kind_mismatch_falls_back_to_heuristic() {
        let flat = fields(json!({ "parties": "not json", "count": 3 }));
        let kinds: FlatKinds = [
            ("parties".to_string(), ValueKind::EncodedSequence),
            ("count".to_string(), ValueKind::Boolean),
        ]
        .into_iter()
        .collect();
        let restored = from_flat(&flat, Some(&kinds));
        assert_eq!(restored["parties"], StoredValue::String("not json".to_string()));
        assert_eq!(restored["count"], StoredValue::Integer(3));
    }

    #[test]
    fn test_stored_value_serde_is_tagged() {
        let v = StoredValue::EncodedSequence(r#"["a"]"#.to_string());
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"kind":"encoded_sequence","value":"[\"a\"]"}"#);
        let back: StoredValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
