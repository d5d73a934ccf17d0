//! Envelope decoding for newline-delimited JSON messages.
//!
//! Every line on the input stream is one JSON object of the form
//! `{"type": "<tag>", "data": {...}}`. Decoding only checks that shape; the
//! payload stays untyped until the [`validator`](crate::schema::validator)
//! runs against the schema the tag selects.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Outer `{type, data}` wrapper around every ingested message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub data: Map<String, Value>,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl Envelope {
    /// Decodes one line. Surrounding whitespace, including the trailing
    /// newline, is ignored.
    pub fn decode(line: &[u8]) -> Result<Self, DecodeError> {
        let trimmed = trim_line(line);
        if trimmed.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(serde_json::from_slice(trimmed)?)
    }
}

/// Strips ASCII whitespace from both ends of a raw line.
pub(crate) fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    &line[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_envelope() {
        let line = br#"{"type":"Company","data":{"company_id":1,"company_name":"Acme","headcount":50}}"#;
        let envelope = Envelope::decode(line).unwrap();

        assert_eq!(envelope.type_tag, "Company");
        assert_eq!(envelope.data.get("company_id"), Some(&json!(1)));
        assert_eq!(envelope.data.get("company_name"), Some(&json!("Acme")));
        assert_eq!(envelope.data.get("headcount"), Some(&json!(50)));
    }

    #[test]
    fn test_decode_trims_line_endings() {
        let envelope = Envelope::decode(b"  {\"type\":\"Bogus\",\"data\":{}}\r\n").unwrap();
        assert_eq!(envelope.type_tag, "Bogus");
        assert!(envelope.data.is_empty());
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = Envelope::decode(b"{\"type\":\"Person\",\"data\":{").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_missing_keys() {
        let err = Envelope::decode(br#"{"data":{}}"#).unwrap_err();
        assert!(err.to_string().contains("type"));

        let err = Envelope::decode(br#"{"type":"Person"}"#).unwrap_err();
        assert!(err.to_string().contains("data"));
    }

    #[test]
    fn test_decode_rejects_non_object_data() {
        assert!(Envelope::decode(br#"{"type":"Person","data":[1,2]}"#).is_err());
        assert!(Envelope::decode(br#"{"type":7,"data":{}}"#).is_err());
        assert!(Envelope::decode(br#"["Person",{}]"#).is_err());
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let err = Envelope::decode(b"{\"type\":\"\xff\",\"data\":{}}").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_empty_line() {
        assert!(matches!(Envelope::decode(b" \n"), Err(DecodeError::Empty)));
    }
}
