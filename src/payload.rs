//! payload.rs - raw broker payload decoding
//!
//! Attempts, in order: floating point number, JSON document, raw string.
//! Decoding never fails; unparseable input degrades to the string variant.

use serde_json::Value;

/// a decoded message body
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedPayload {
    Number(f64),
    Json(Value),
    Text(String),
}

impl ParsedPayload {
    /// numeric view of the payload, if there is one. a bare json number
    /// counts; everything else does not.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParsedPayload::Number(n) => Some(*n),
            ParsedPayload::Json(v) => v.as_f64(),
            ParsedPayload::Text(_) => None,
        }
    }

    /// json view for legacy payloads that wrap the value in an object
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ParsedPayload::Json(v) => Some(v),
            _ => None,
        }
    }

    /// the payload as a model value
    pub fn to_value(&self) -> Value {
        match self {
            ParsedPayload::Number(n) => Value::from(*n),
            ParsedPayload::Json(v) => v.clone(),
            ParsedPayload::Text(s) => Value::from(s.clone()),
        }
    }
}

/// decode a raw message body. pure function, no side effects.
pub fn parse(raw: &[u8]) -> ParsedPayload {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if let Ok(num) = trimmed.parse::<f64>() {
        return ParsedPayload::Number(num);
    }
    if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
        return ParsedPayload::Json(json);
    }
    ParsedPayload::Text(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_number() {
        assert_eq!(parse(b"42.5"), ParsedPayload::Number(42.5));
        assert_eq!(parse(b" 7 "), ParsedPayload::Number(7.0));
    }

    #[test]
    fn parses_json_object() {
        let parsed = parse(br#"{"value": 7.9}"#);
        assert_eq!(parsed, ParsedPayload::Json(json!({"value": 7.9})));
        assert_eq!(parsed.as_number(), None);
    }

    #[test]
    fn falls_back_to_text() {
        assert_eq!(parse(b"hello broker"), ParsedPayload::Text("hello broker".to_string()));
    }

    #[test]
    fn invalid_utf8_degrades_to_text() {
        let parsed = parse(&[0xff, 0xfe, 0x41]);
        assert!(matches!(parsed, ParsedPayload::Text(_)));
    }

    #[test]
    fn number_wins_over_json() {
        // "7" is valid json too; the numeric tier claims it first
        assert_eq!(parse(b"7"), ParsedPayload::Number(7.0));
    }
}
