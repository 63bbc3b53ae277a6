//! Device state snapshot
//!
//! One persisted record of what the device reported at a point in time.
//! Field values are coerced the way a loosely-typed document store would:
//! numeric strings become numbers, `"true"`/`"false"` become booleans,
//! everything else of the wrong shape is rejected.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{SinkError, SinkResult};

/// Field that marks a device frame as a state report worth persisting
pub const SERVO_POS_FIELD: &str = "servoPos";

/// A single device-state snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub servo_pos: Option<f64>,
    pub pot_value: Option<f64>,
    pub system_enabled: Option<bool>,
    pub pot_control: Option<bool>,
    pub is_reset: Option<bool>,
    /// Creation instant, defaulted to now when the frame carries none
    pub timestamp: DateTime<Utc>,
}

impl DeviceSnapshot {
    /// Create an empty snapshot stamped with the current time
    pub fn new() -> Self {
        Self {
            servo_pos: None,
            pot_value: None,
            system_enabled: None,
            pot_control: None,
            is_reset: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a snapshot from the fields of a parsed device frame
    ///
    /// Unknown fields are ignored. A field holding a value that cannot be
    /// coerced to its column type fails the whole snapshot.
    pub fn from_fields(fields: &Map<String, Value>) -> SinkResult<Self> {
        let timestamp = match fields.get("timestamp") {
            None | Some(Value::Null) => Utc::now(),
            Some(value) => coerce_timestamp(value)?,
        };

        Ok(Self {
            servo_pos: number_field(fields, SERVO_POS_FIELD)?,
            pot_value: number_field(fields, "potValue")?,
            system_enabled: bool_field(fields, "systemEnabled")?,
            pot_control: bool_field(fields, "potControl")?,
            is_reset: bool_field(fields, "isReset")?,
            timestamp,
        })
    }

    /// Builder method: set servo position
    pub fn servo_pos(mut self, value: f64) -> Self {
        self.servo_pos = Some(value);
        self
    }

    /// Builder method: set potentiometer reading
    pub fn pot_value(mut self, value: f64) -> Self {
        self.pot_value = Some(value);
        self
    }

    /// Builder method: set timestamp
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

fn number_field(fields: &Map<String, Value>, field: &'static str) -> SinkResult<Option<f64>> {
    let invalid = |reason: String| SinkError::InvalidField { field, reason };

    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(format!("{} is not representable", n))),
        Some(Value::Bool(b)) => Ok(Some(if *b { 1.0 } else { 0.0 })),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(format!("cannot cast {:?} to a number", s))),
        Some(other) => Err(invalid(format!("expected a number, got {}", other))),
    }
}

fn bool_field(fields: &Map<String, Value>, field: &'static str) -> SinkResult<Option<bool>> {
    let invalid = |reason: String| SinkError::InvalidField { field, reason };

    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(v) if v == 1.0 => Ok(Some(true)),
            Some(v) if v == 0.0 => Ok(Some(false)),
            _ => Err(invalid(format!("cannot cast {} to a boolean", n))),
        },
        Some(Value::String(s)) => match s.as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(invalid(format!("cannot cast {:?} to a boolean", s))),
        },
        Some(other) => Err(invalid(format!("expected a boolean, got {}", other))),
    }
}

fn coerce_timestamp(value: &Value) -> SinkResult<DateTime<Utc>> {
    let invalid = |reason: String| SinkError::InvalidField {
        field: "timestamp",
        reason,
    };

    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| invalid(format!("{:?}: {}", s, e))),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| invalid(format!("{} is not a valid epoch millisecond value", n))),
        other => Err(invalid(format!("expected a date, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test fixture must be an object"),
        }
    }

    #[test]
    fn test_from_full_state_report() {
        let snapshot = DeviceSnapshot::from_fields(&fields(json!({
            "servoPos": 90,
            "potValue": 512,
            "systemEnabled": true,
            "potControl": false,
            "isReset": false
        })))
        .unwrap();

        assert_eq!(snapshot.servo_pos, Some(90.0));
        assert_eq!(snapshot.pot_value, Some(512.0));
        assert_eq!(snapshot.system_enabled, Some(true));
        assert_eq!(snapshot.pot_control, Some(false));
        assert_eq!(snapshot.is_reset, Some(false));
    }

    #[test]
    fn test_partial_report_leaves_missing_fields_empty() {
        let before = Utc::now();
        let snapshot = DeviceSnapshot::from_fields(&fields(json!({"servoPos": 0}))).unwrap();

        assert_eq!(snapshot.servo_pos, Some(0.0));
        assert_eq!(snapshot.pot_value, None);
        assert_eq!(snapshot.system_enabled, None);
        assert!(snapshot.timestamp >= before);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let snapshot =
            DeviceSnapshot::from_fields(&fields(json!({"servoPos": 45.5, "firmware": "1.2"})))
                .unwrap();
        assert_eq!(snapshot.servo_pos, Some(45.5));
    }

    #[test]
    fn test_string_coercion() {
        let snapshot = DeviceSnapshot::from_fields(&fields(json!({
            "servoPos": "120",
            "systemEnabled": "true",
            "isReset": 0
        })))
        .unwrap();

        assert_eq!(snapshot.servo_pos, Some(120.0));
        assert_eq!(snapshot.system_enabled, Some(true));
        assert_eq!(snapshot.is_reset, Some(false));
    }

    #[test]
    fn test_bad_number_rejected() {
        let err = DeviceSnapshot::from_fields(&fields(json!({"servoPos": "left"}))).unwrap_err();
        assert!(matches!(
            err,
            SinkError::InvalidField {
                field: "servoPos",
                ..
            }
        ));

        let err = DeviceSnapshot::from_fields(&fields(json!({"servoPos": [1, 2]}))).unwrap_err();
        assert!(matches!(err, SinkError::InvalidField { .. }));
    }

    #[test]
    fn test_bad_boolean_rejected() {
        let err =
            DeviceSnapshot::from_fields(&fields(json!({"servoPos": 1, "potControl": "maybe"})))
                .unwrap_err();
        assert!(matches!(
            err,
            SinkError::InvalidField {
                field: "potControl",
                ..
            }
        ));
    }

    #[test]
    fn test_supplied_timestamp_kept() {
        let snapshot = DeviceSnapshot::from_fields(&fields(json!({
            "servoPos": 10,
            "timestamp": "2024-03-01T12:00:00Z"
        })))
        .unwrap();
        assert_eq!(snapshot.timestamp.to_rfc3339(), "2024-03-01T12:00:00+00:00");

        let snapshot = DeviceSnapshot::from_fields(&fields(json!({
            "servoPos": 10,
            "timestamp": 1709294400000i64
        })))
        .unwrap();
        assert_eq!(snapshot.timestamp.timestamp_millis(), 1709294400000);
    }

    #[test]
    fn test_serializes_camel_case() {
        let snapshot = DeviceSnapshot::new().servo_pos(90.0).pot_value(512.0);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["servoPos"], 90.0);
        assert_eq!(json["potValue"], 512.0);
        assert!(json.get("timestamp").is_some());
    }
}
