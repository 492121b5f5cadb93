// SPDX-License-Identifier: Apache-2.0

//! Decoding of EVE log lines into events.
//!
//! An EVE line is a single UTF-8 JSON document. The decoder is a pure
//! function over the line bytes; the rest of the crate treats the decoded
//! event as opaque.

use serde_json::Value;
use thiserror::Error;

/// How much of a rejected line to keep in the error for logging.
const SNIPPET_LEN: usize = 128;

/// A decoded EVE event. The importer does not interpret the payload beyond
/// "decoded means append to the sink".
#[derive(Debug, Clone, PartialEq)]
pub struct EveEvent {
    value: Value,
}

impl EveEvent {
    /// The decoded JSON document.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// The `event_type` field, when present (alert, dns, flow, ...).
    pub fn event_type(&self) -> Option<&str> {
        self.value.get("event_type").and_then(Value::as_str)
    }
}

/// A line the decoder rejected, carrying a snippet of the offending line
/// and the underlying reason.
#[derive(Error, Debug)]
#[error("malformed event ({reason}): {snippet}")]
pub struct MalformedEvent {
    snippet: String,
    reason: String,
}

impl MalformedEvent {
    fn new(line: &[u8], reason: impl Into<String>) -> Self {
        let snippet: String = String::from_utf8_lossy(line)
            .chars()
            .take(SNIPPET_LEN)
            .collect();
        Self {
            snippet,
            reason: reason.into(),
        }
    }
}

/// Decode one line into an event.
///
/// Rejects non-UTF-8 input, invalid JSON, and documents whose top level is
/// not an object. A whitespace-only line is rejected like any other
/// undecodable line.
pub fn decode(line: &[u8]) -> Result<EveEvent, MalformedEvent> {
    let text =
        std::str::from_utf8(line).map_err(|e| MalformedEvent::new(line, e.to_string()))?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| MalformedEvent::new(line, e.to_string()))?;
    match value {
        Value::Object(_) => Ok(EveEvent { value }),
        _ => Err(MalformedEvent::new(line, "top level is not a JSON object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_alert() {
        let line = br#"{"timestamp":"2019-07-01T18:20:01.112176+0000","event_type":"alert","src_ip":"10.16.1.11"}"#;
        let event = decode(line).unwrap();
        assert_eq!(event.event_type(), Some("alert"));
        assert_eq!(event.value()["src_ip"], "10.16.1.11");
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode(b"{asdf: asdf...").unwrap_err();
        assert!(err.to_string().contains("{asdf: asdf..."));
    }

    #[test]
    fn test_decode_non_object() {
        assert!(decode(b"[1, 2, 3]").is_err());
        assert!(decode(b"42").is_err());
    }

    #[test]
    fn test_decode_whitespace_only() {
        assert!(decode(b"   ").is_err());
        assert!(decode(b"").is_err());
    }

    #[test]
    fn test_decode_invalid_utf8() {
        assert!(decode(&[0xff, 0xfe, b'{', b'}']).is_err());
    }

    #[test]
    fn test_snippet_truncated() {
        let long = vec![b'x'; 4096];
        let err = decode(&long).unwrap_err();
        assert!(err.to_string().len() < 256);
    }
}
