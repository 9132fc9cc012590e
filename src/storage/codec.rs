//! Text encoding of stored values.
//!
//! Every value is wrapped in a single-field envelope before it is serialized:
//!
//! | Value | Stored text |
//! |-------|-------------|
//! | `Absent` | `{}` |
//! | `Null` | `{"value":null}` |
//! | `"dark"` | `{"value":"dark"}` |
//! | `{"a":1}` | `{"value":{"a":1}}` |
//!
//! The envelope keeps a stored `null` apart from a stored "nothing", and both
//! apart from "no row".

use crate::models::Value;
use crate::{Error, Result};

/// Envelope field holding the payload.
const ENVELOPE_FIELD: &str = "value";

/// Encodes a value into its stored text form.
#[must_use]
pub fn encode(value: &Value) -> String {
    let mut envelope = serde_json::Map::with_capacity(1);
    if let Some(json) = value.clone().into_json() {
        envelope.insert(ENVELOPE_FIELD.to_string(), json);
    }
    serde_json::Value::Object(envelope).to_string()
}

/// Decodes stored text back into a value.
///
/// # Errors
///
/// Returns [`Error::CorruptValue`] if the text is not JSON or not an envelope object.
pub fn decode(text: &str) -> Result<Value> {
    let parsed: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::CorruptValue(e.to_string()))?;

    let serde_json::Value::Object(mut envelope) = parsed else {
        return Err(Error::CorruptValue(format!(
            "expected an envelope object, found `{}`",
            truncate(text)
        )));
    };

    Ok(envelope
        .remove(ENVELOPE_FIELD)
        .map_or(Value::Absent, Value::from))
}

/// Shortens stored text for error messages.
fn truncate(text: &str) -> &str {
    const MAX: usize = 64;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_forms() {
        assert_eq!(encode(&Value::Absent), "{}");
        assert_eq!(encode(&Value::Null), r#"{"value":null}"#);
        assert_eq!(encode(&Value::from("dark")), r#"{"value":"dark"}"#);
        assert_eq!(encode(&Value::from(json!({"a": 1}))), r#"{"value":{"a":1}}"#);
    }

    #[test]
    fn test_absent_and_null_stay_distinct() {
        assert_eq!(decode(&encode(&Value::Absent)).unwrap(), Value::Absent);
        assert_eq!(decode(&encode(&Value::Null)).unwrap(), Value::Null);
    }

    #[test]
    fn test_nested_roundtrip() {
        let value = Value::from(json!({
            "list": [1, "two", null, {"three": 3.5}],
            "flag": false
        }));
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn test_floats_roundtrip_exactly() {
        let samples = [
            1.947_700_395_895_162e-169,
            0.1,
            1.0 / 3.0,
            f64::MAX,
            f64::MIN_POSITIVE,
            -2.5e300,
        ];
        for f in samples {
            let value = Value::from(f);
            let decoded = decode(&encode(&value)).unwrap();
            assert_eq!(decoded, value, "{f:e} changed");
            assert_eq!(decoded.into_json().and_then(|j| j.as_f64()), Some(f));
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("not json"), Err(Error::CorruptValue(_))));
        assert!(matches!(decode(""), Err(Error::CorruptValue(_))));
    }

    #[test]
    fn test_decode_rejects_bare_scalars() {
        let err = decode("42").unwrap_err();
        assert!(matches!(err, Error::CorruptValue(ref msg) if msg.contains("envelope")));
    }

    #[test]
    fn test_decode_ignores_unknown_envelope_fields() {
        assert_eq!(
            decode(r#"{"value":1,"extra":true}"#).unwrap(),
            Value::from(1_i64)
        );
    }
}
