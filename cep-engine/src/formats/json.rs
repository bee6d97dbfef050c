//! JSON object records

use super::DataFormatter;
use crate::types::{EngineError, Payload, Result, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reads one JSON object per record
///
/// The timestamp attribute is either a number of seconds since the Unix
/// epoch (fractions allowed, microsecond precision) or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonDataFormatter {
    /// Attribute holding the event type
    #[serde(default = "default_type_field")]
    pub type_field: String,
    /// Attribute holding the logical timestamp
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
}

fn default_type_field() -> String {
    "type".to_string()
}

fn default_timestamp_field() -> String {
    "timestamp".to_string()
}

impl Default for JsonDataFormatter {
    fn default() -> Self {
        Self {
            type_field: default_type_field(),
            timestamp_field: default_timestamp_field(),
        }
    }
}

impl JsonDataFormatter {
    pub fn new(type_field: impl Into<String>, timestamp_field: impl Into<String>) -> Self {
        Self {
            type_field: type_field.into(),
            timestamp_field: timestamp_field.into(),
        }
    }

    fn field<'a>(&self, payload: &'a Payload, name: &str) -> Result<&'a Value> {
        payload
            .get(name)
            .ok_or_else(|| EngineError::Parse(format!("missing attribute '{}'", name)))
    }
}

impl DataFormatter for JsonDataFormatter {
    fn parse_event(&self, raw: &str) -> Result<Payload> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(payload)) => Ok(payload),
            Ok(other) => Err(EngineError::Parse(format!(
                "expected a JSON object, got {}",
                other
            ))),
            Err(e) => Err(EngineError::Parse(format!("invalid JSON record: {}", e))),
        }
    }

    fn get_event_type(&self, payload: &Payload) -> Result<String> {
        match self.field(payload, &self.type_field)? {
            Value::String(event_type) => Ok(event_type.clone()),
            other => Err(EngineError::Parse(format!(
                "attribute '{}' must be a string, got {}",
                self.type_field, other
            ))),
        }
    }

    fn get_event_timestamp(&self, payload: &Payload) -> Result<Timestamp> {
        let value = self.field(payload, &self.timestamp_field)?;
        let parsed = match value {
            Value::Number(number) => number
                .as_f64()
                .filter(|secs| secs.is_finite())
                .and_then(|secs| DateTime::<Utc>::from_timestamp_micros((secs * 1e6).round() as i64)),
            Value::String(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        };
        parsed.ok_or_else(|| {
            EngineError::Parse(format!(
                "attribute '{}' is not a valid timestamp: {}",
                self.timestamp_field, value
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_timestamp() {
        let formatter = JsonDataFormatter::default();
        let payload = formatter
            .parse_event(r#"{"type": "A", "timestamp": 10.0001, "price": 3}"#)
            .unwrap();
        assert_eq!(formatter.get_event_type(&payload).unwrap(), "A");
        let timestamp = formatter.get_event_timestamp(&payload).unwrap();
        assert_eq!(timestamp.timestamp_micros(), 10_000_100);
    }

    #[test]
    fn test_parse_rfc3339_timestamp() {
        let formatter = JsonDataFormatter::new("kind", "at");
        let payload = formatter
            .parse_event(r#"{"kind": "B", "at": "2024-01-01T00:00:05+01:00"}"#)
            .unwrap();
        let timestamp = formatter.get_event_timestamp(&payload).unwrap();
        assert_eq!(timestamp.to_rfc3339(), "2023-12-31T23:00:05+00:00");
    }

    #[test]
    fn test_malformed_records_are_parse_errors() {
        let formatter = JsonDataFormatter::default();
        assert!(matches!(formatter.parse_event("not json"), Err(EngineError::Parse(_))));
        assert!(matches!(formatter.parse_event("[1, 2]"), Err(EngineError::Parse(_))));

        let payload = formatter.parse_event(r#"{"type": 5, "timestamp": true}"#).unwrap();
        assert!(formatter.get_event_type(&payload).is_err());
        assert!(formatter.get_event_timestamp(&payload).is_err());

        let payload = formatter.parse_event(r#"{"timestamp": 1}"#).unwrap();
        assert!(matches!(formatter.get_event_type(&payload), Err(EngineError::Parse(_))));
    }
}
