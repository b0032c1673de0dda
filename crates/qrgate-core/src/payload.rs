//! # Sensor Payload Parsing
//!
//! Maps arbitrary, possibly partial sensor input onto a defined payload
//! with explicit defaults. A single bad message must never take the bridge
//! down, so parsing cannot fail: bytes that are not a JSON object, or
//! fields of the wrong type, produce [`Parsed::Malformed`] carrying the
//! defaulted payload and a description of what was wrong.
//!
//! ## Defaults
//!
//! | Payload | Field | Default |
//! |---|---|---|
//! | presence | `present` | `true` (a number counts as `false` when zero) |
//! | thumb | `thumb` | `false` |
//! | thumb | `hold_complete` | `false` (only a literal `true` counts) |
//! | thumb | `progress` | absent |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of parsing an inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    /// The payload was a JSON object and every present field had the right type.
    Valid(T),
    /// The payload was defaulted, fully or per field.
    Malformed {
        /// The payload with defaults substituted for what could not be read.
        value: T,
        /// Why the input was rejected.
        reason: String,
    },
}

impl<T> Parsed<T> {
    /// Consume and return the payload.
    pub fn into_value(self) -> T {
        match self {
            Self::Valid(v) | Self::Malformed { value: v, .. } => v,
        }
    }

    /// The rejection reason, if any.
    pub fn malformed_reason(&self) -> Option<&str> {
        match self {
            Self::Valid(_) => None,
            Self::Malformed { reason, .. } => Some(reason),
        }
    }
}

/// Presence sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresencePayload {
    /// Whether a person is in front of the gate.
    pub present: bool,
    /// Measured distance, if the sensor reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Free-form sensor annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Default for PresencePayload {
    fn default() -> Self {
        Self {
            present: true,
            distance: None,
            reason: None,
        }
    }
}

impl PresencePayload {
    /// Parse a raw presence message.
    pub fn parse(bytes: &[u8]) -> Parsed<Self> {
        let mut fields = match FieldReader::from_bytes(bytes) {
            Ok(fields) => fields,
            Err(reason) => {
                return Parsed::Malformed {
                    value: Self::default(),
                    reason,
                }
            }
        };
        let value = Self {
            present: fields.flag("present").unwrap_or(true),
            distance: fields.number("distance"),
            reason: fields.string("reason"),
        };
        fields.finish(value)
    }
}

/// Thumb-hold gesture reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThumbPayload {
    /// Whether a thumb gesture is currently detected.
    pub thumb: bool,
    /// Whether the gesture has been held for the required duration.
    pub hold_complete: bool,
    /// Hold progress in `0..=1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl ThumbPayload {
    /// Parse a raw thumb message.
    pub fn parse(bytes: &[u8]) -> Parsed<Self> {
        let mut fields = match FieldReader::from_bytes(bytes) {
            Ok(fields) => fields,
            Err(reason) => {
                return Parsed::Malformed {
                    value: Self::default(),
                    reason,
                }
            }
        };
        let value = Self {
            thumb: fields.bool("thumb").unwrap_or(false),
            hold_complete: fields.bool("hold_complete").unwrap_or(false),
            progress: fields.number("progress"),
        };
        fields.finish(value)
    }
}

/// Parse raw bytes into a JSON value for mirroring to observers.
///
/// Anything that is not valid JSON becomes an empty object.
pub fn parse_json_lenient(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(Map::new());
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Reads typed fields out of a JSON object, recording type mismatches.
struct FieldReader {
    object: Map<String, Value>,
    problems: Vec<String>,
}

impl FieldReader {
    fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        // An empty message is an empty object, not an error.
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self {
                object: Map::new(),
                problems: Vec::new(),
            });
        }
        match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(object)) => Ok(Self {
                object,
                problems: Vec::new(),
            }),
            Ok(other) => Err(format!("expected JSON object, got {}", type_name(&other))),
            Err(e) => Err(format!("invalid JSON: {e}")),
        }
    }

    fn bool(&mut self, key: &str) -> Option<bool> {
        match self.object.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                note_mismatch(&mut self.problems, key, "boolean", other);
                None
            }
        }
    }

    /// Like [`Self::bool`], but a number is read as non-zero.
    fn flag(&mut self, key: &str) -> Option<bool> {
        match self.object.get(key) {
            Some(Value::Number(n)) => Some(n.as_f64().map_or(true, |f| f != 0.0)),
            _ => self.bool(key),
        }
    }

    fn number(&mut self, key: &str) -> Option<f64> {
        match self.object.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_f64(),
            Some(other) => {
                note_mismatch(&mut self.problems, key, "number", other);
                None
            }
        }
    }

    fn string(&mut self, key: &str) -> Option<String> {
        match self.object.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                note_mismatch(&mut self.problems, key, "string", other);
                None
            }
        }
    }

    fn finish<T>(self, value: T) -> Parsed<T> {
        if self.problems.is_empty() {
            Parsed::Valid(value)
        } else {
            Parsed::Malformed {
                value,
                reason: self.problems.join("; "),
            }
        }
    }
}

fn note_mismatch(problems: &mut Vec<String>, key: &str, expected: &str, got: &Value) {
    problems.push(format!("field `{key}`: expected {expected}, got {}", type_name(got)));
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn presence_full_payload() {
        let parsed = PresencePayload::parse(br#"{"present":false,"distance":42.5,"reason":"left"}"#);
        assert_eq!(
            parsed,
            Parsed::Valid(PresencePayload {
                present: false,
                distance: Some(42.5),
                reason: Some("left".into()),
            })
        );
    }

    #[test]
    fn presence_missing_flag_defaults_to_present() {
        let parsed = PresencePayload::parse(br#"{"distance":30}"#);
        assert_eq!(parsed.malformed_reason(), None);
        let value = parsed.into_value();
        assert!(value.present);
        assert_eq!(value.distance, Some(30.0));
    }

    #[test]
    fn presence_empty_message_is_valid_default() {
        let parsed = PresencePayload::parse(b"");
        assert_eq!(parsed, Parsed::Valid(PresencePayload::default()));
    }

    #[test]
    fn presence_non_json_is_malformed_default() {
        let parsed = PresencePayload::parse(b"not json at all");
        assert!(parsed.malformed_reason().unwrap().contains("invalid JSON"));
        assert_eq!(parsed.into_value(), PresencePayload::default());
    }

    #[test]
    fn presence_array_is_malformed() {
        let parsed = PresencePayload::parse(b"[true]");
        assert_eq!(
            parsed.malformed_reason(),
            Some("expected JSON object, got array")
        );
    }

    #[test]
    fn presence_wrong_type_defaults_only_that_field() {
        let parsed = PresencePayload::parse(br#"{"present":"yes","distance":12}"#);
        assert!(parsed.malformed_reason().unwrap().contains("`present`"));
        let value = parsed.into_value();
        assert!(value.present);
        assert_eq!(value.distance, Some(12.0));
    }

    #[test]
    fn presence_numeric_flag_is_coerced() {
        let absent = PresencePayload::parse(br#"{"present":0}"#);
        assert_eq!(absent.malformed_reason(), None);
        assert!(!absent.into_value().present);

        let here = PresencePayload::parse(br#"{"present":1,"distance":20}"#);
        assert!(here.into_value().present);
    }

    #[test]
    fn each_mismatched_field_is_reported_once() {
        let parsed = PresencePayload::parse(br#"{"present":[],"distance":"far","reason":7}"#);
        let reason = parsed.malformed_reason().unwrap().to_string();
        assert_eq!(reason.matches("field").count(), 3);
        assert!(reason.contains("`present`: expected boolean, got array"));
        assert!(reason.contains("`distance`: expected number, got string"));
        assert!(reason.contains("`reason`: expected string, got number"));
        assert_eq!(parsed.into_value(), PresencePayload::default());
    }

    #[test]
    fn thumb_progress_only() {
        let parsed = ThumbPayload::parse(br#"{"thumb":true,"hold_complete":false,"progress":0.4}"#);
        assert_eq!(
            parsed,
            Parsed::Valid(ThumbPayload {
                thumb: true,
                hold_complete: false,
                progress: Some(0.4),
            })
        );
    }

    #[test]
    fn thumb_hold_complete_requires_literal_true() {
        let parsed = ThumbPayload::parse(br#"{"thumb":true,"hold_complete":1}"#);
        assert!(parsed.malformed_reason().unwrap().contains("`hold_complete`"));
        let value = parsed.into_value();
        assert!(!value.hold_complete);
        assert!(value.thumb);
    }

    #[test]
    fn thumb_null_fields_use_defaults() {
        let parsed = ThumbPayload::parse(br#"{"thumb":null,"hold_complete":null,"progress":null}"#);
        assert_eq!(parsed, Parsed::Valid(ThumbPayload::default()));
    }

    #[test]
    fn thumb_garbage_is_default() {
        let parsed = ThumbPayload::parse(&[0xff, 0xfe, 0x00]);
        assert!(parsed.malformed_reason().is_some());
        assert_eq!(parsed.into_value(), ThumbPayload::default());
    }

    #[test]
    fn multiple_problems_are_joined() {
        let parsed = ThumbPayload::parse(br#"{"thumb":"x","progress":"y"}"#);
        let reason = parsed.malformed_reason().unwrap();
        assert!(reason.contains("`thumb`"));
        assert!(reason.contains("`progress`"));
    }

    #[test]
    fn lenient_json_falls_back_to_empty_object() {
        assert_eq!(parse_json_lenient(b"{oops"), serde_json::json!({}));
        assert_eq!(parse_json_lenient(b"  "), serde_json::json!({}));
        assert_eq!(parse_json_lenient(br#"{"a":1}"#), serde_json::json!({"a": 1}));
    }

    proptest! {
        #[test]
        fn parsing_arbitrary_bytes_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = PresencePayload::parse(&bytes);
            let _ = ThumbPayload::parse(&bytes);
            let _ = parse_json_lenient(&bytes);
        }

        #[test]
        fn valid_thumb_objects_parse_exactly(thumb in any::<bool>(), hold in any::<bool>(), progress in 0.0f64..=1.0) {
            let raw = serde_json::json!({"thumb": thumb, "hold_complete": hold, "progress": progress});
            let parsed = ThumbPayload::parse(raw.to_string().as_bytes());
            prop_assert!(parsed.malformed_reason().is_none());
            let value = parsed.into_value();
            prop_assert_eq!(value.thumb, thumb);
            prop_assert_eq!(value.hold_complete, hold);
            let parsed_progress = value.progress.unwrap_or(f64::NAN);
            prop_assert!((parsed_progress - progress).abs() < 1e-9);
        }
    }
}
