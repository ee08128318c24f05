//! The on-disk `{version, generatedBy, timestamp, data}` wrapper every corpus
//! and run-record file uses.
//!
//! Reading tolerates a bare-array payload (the legacy, unwrapped form);
//! writing always emits the envelope with a trailing newline. This mirrors
//! the cold-start/malformed-vs-valid discipline `cache.rs`'s `ImageCache`
//! applies to its own JSON file, generalized to any `T`.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub const ENVELOPE_VERSION: i64 = 1;
pub const GENERATED_BY: &str = "sorry-currents";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("failed to read {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
    #[error("malformed JSON in {path}: {source}")]
    Parse { path: String, #[source] source: serde_json::Error },
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionedEnvelope<T> {
    pub version: i64,
    #[serde(rename = "generatedBy")]
    pub generated_by: String,
    pub timestamp: DateTime<Utc>,
    pub data: T,
}

impl<T> VersionedEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            generated_by: GENERATED_BY.to_string(),
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Accepts either `{version, generatedBy, timestamp, data}` or a bare array
/// (the pre-envelope legacy form), returning just the payload.
pub fn decode_tolerant<T>(content: &str) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned,
{
    if let Ok(envelope) = serde_json::from_str::<VersionedEnvelope<T>>(content) {
        return Ok(envelope.data);
    }
    serde_json::from_str::<T>(content)
}

/// Always emits the envelope form, two-space indented, with a trailing
/// newline, per the wire-format contract.
pub fn encode_envelope<T>(data: T) -> Result<String, EnvelopeError>
where
    T: Serialize,
{
    let envelope = VersionedEnvelope::new(data);
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, serde_json::ser::PrettyFormatter::with_indent(b"  "));
    envelope.serialize(&mut ser).map_err(EnvelopeError::Serialize)?;
    let mut out = String::from_utf8(buf).expect("serde_json always emits valid utf8");
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_enveloped_form() {
        let raw = r#"{"version":1,"generatedBy":"x","timestamp":"2024-01-01T00:00:00Z","data":[1,2,3]}"#;
        let data: Vec<i32> = decode_tolerant(raw).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn decodes_bare_array_legacy_form() {
        let raw = "[1,2,3]";
        let data: Vec<i32> = decode_tolerant(raw).unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn encode_always_wraps_and_trails_newline() {
        let out = encode_envelope(vec![1, 2, 3]).unwrap();
        assert!(out.ends_with('\n'));
        assert!(out.contains("\"version\": 1"));
        assert!(out.contains("\"generatedBy\""));
        let roundtrip: Vec<i32> = decode_tolerant(&out).unwrap();
        assert_eq!(roundtrip, vec![1, 2, 3]);
    }
}
