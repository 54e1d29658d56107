//! Field extraction for device payloads.
//!
//! Firmware revisions disagree on field names (`jarak` vs `distance`,
//! `akurasi` vs `accuracy`, ...), so each normalized field is looked up
//! through a list of accepted keys. The first key whose value is usable
//! wins, so a blank or mistyped field falls through to the next alias.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::models::{Classification, DeviceReading, ImageFrame};
use crate::shared::errors::IngestError;

pub type Fields = Map<String, Value>;

const DEVICE_ID: &[&str] = &["device_id", "id"];
const KIND: &[&str] = &["type", "kind"];
const DISTANCE: &[&str] = &["distance", "distance_cm", "jarak"];
const STATUS: &[&str] = &["status", "classification"];
const CONFIDENCE: &[&str] = &["confidence", "accuracy", "akurasi"];
const DANGER_SCORE: &[&str] = &["danger_score", "bahaya"];
const OBJECT: &[&str] = &["object", "objek"];
const RSSI: &[&str] = &["rssi"];
const IMAGE: &[&str] = &["image", "img"];

pub fn parse_body(body: &[u8]) -> Result<Fields, IngestError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;

    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(IngestError::MalformedPayload(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

pub fn device_id(fields: &Fields) -> Option<String> {
    lookup(fields, DEVICE_ID, as_identifier)
}

pub fn kind(fields: &Fields) -> Option<&str> {
    lookup(fields, KIND, Value::as_str)
}

/// The encoded image, if the payload has one. A present but non-string value
/// is reported as a decode failure rather than silently ignored.
pub fn image(fields: &Fields) -> Result<Option<&str>, IngestError> {
    match first_present(fields, IMAGE) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(encoded)) => Ok(Some(encoded)),
        Some(other) => Err(IngestError::ImageDecodeFailed(format!(
            "image field is a {}, expected a base64 string",
            json_type(other)
        ))),
    }
}

pub fn normalize_reading(
    device_id: String,
    fields: &Fields,
    image: Option<ImageFrame>,
    received_at: DateTime<Utc>,
) -> DeviceReading {
    DeviceReading {
        device_id,
        distance_cm: lookup(fields, DISTANCE, |v| as_number(v).filter(|d| *d >= 0.0)),
        classification: lookup(fields, STATUS, |v| {
            v.as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Classification::new)
        }),
        confidence: lookup(fields, CONFIDENCE, as_unit_interval),
        danger_score: lookup(fields, DANGER_SCORE, as_unit_interval),
        detected_object: lookup(fields, OBJECT, |v| v.as_str().map(str::to_string)),
        rssi_dbm: lookup(fields, RSSI, |v| {
            as_number(v)
                .filter(|r| *r >= i32::MIN as f64 && *r <= i32::MAX as f64)
                .map(|r| r.round() as i32)
        }),
        image,
        received_at,
    }
}

fn lookup<'a, T>(
    fields: &'a Fields,
    keys: &[&str],
    convert: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find_map(convert)
}

fn first_present<'a>(fields: &'a Fields, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| fields.get(*key))
}

// ids show up both as strings and as bare numbers
fn as_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn as_unit_interval(value: &Value) -> Option<f64> {
    as_number(value).filter(|n| (0.0..=1.0).contains(n))
}

fn json_type(value: &Value) -> &'static str {
    match value {
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
    use chrono::TimeZone;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = parse_body(b"not json at all").unwrap_err();
        assert!(matches!(err, IngestError::MalformedPayload(_)));
    }

    #[test]
    fn json_array_body_is_malformed() {
        let err = parse_body(b"[1, 2, 3]").unwrap_err();
        assert_eq!(
            err,
            IngestError::MalformedPayload("expected a JSON object, got array".into())
        );
    }

    #[test]
    fn indonesian_field_names_are_normalized() {
        let f = fields(json!({
            "id": 7,
            "jarak": 42.5,
            "status": "BAHAYA",
            "akurasi": 0.87,
            "bahaya": 0.91,
            "objek": "forklift",
            "rssi": -61
        }));
        let at = Utc.timestamp_opt(100, 0).unwrap();
        let reading = normalize_reading(device_id(&f).unwrap(), &f, None, at);

        assert_eq!(reading.device_id, "7");
        assert_eq!(reading.distance_cm, Some(42.5));
        assert_eq!(reading.classification.unwrap().label(), "BAHAYA");
        assert_eq!(reading.confidence, Some(0.87));
        assert_eq!(reading.danger_score, Some(0.91));
        assert_eq!(reading.detected_object.as_deref(), Some("forklift"));
        assert_eq!(reading.rssi_dbm, Some(-61));
        assert_eq!(reading.received_at, at);
    }

    #[test]
    fn english_field_names_are_normalized() {
        let f = fields(json!({
            "device_id": "helm-01",
            "distance": "120",
            "status": "safe",
            "accuracy": 0.5,
            "danger_score": 0.1
        }));
        let reading = normalize_reading("helm-01".into(), &f, None, Utc::now());

        assert_eq!(device_id(&f).as_deref(), Some("helm-01"));
        assert_eq!(reading.distance_cm, Some(120.0));
        assert_eq!(reading.confidence, Some(0.5));
        assert_eq!(reading.danger_score, Some(0.1));
    }

    #[test]
    fn invalid_sensor_values_become_null() {
        let f = fields(json!({
            "distance": -1,
            "accuracy": 1.7,
            "bahaya": "n/a",
            "status": "   "
        }));
        let reading = normalize_reading("d".into(), &f, None, Utc::now());

        assert_eq!(reading.distance_cm, None);
        assert_eq!(reading.confidence, None);
        assert_eq!(reading.danger_score, None);
        assert_eq!(reading.classification, None);
    }

    #[test]
    fn blank_device_id_is_absent() {
        assert_eq!(device_id(&fields(json!({"id": "  "}))), None);
        assert_eq!(device_id(&fields(json!({"id": true}))), None);
    }

    #[test]
    fn unusable_field_falls_through_to_next_alias() {
        let f = fields(json!({"device_id": "", "id": "h1"}));
        assert_eq!(device_id(&f).as_deref(), Some("h1"));

        let f = fields(json!({
            "status": 3,
            "classification": "BAHAYA",
            "distance": "far",
            "jarak": 42
        }));
        let reading = normalize_reading("d".into(), &f, None, Utc::now());
        assert!(reading.is_danger());
        assert_eq!(reading.distance_cm, Some(42.0));
    }

    #[test]
    fn image_field_must_be_a_string() {
        assert_eq!(image(&fields(json!({"img": "abc"}))).unwrap(), Some("abc"));
        assert_eq!(image(&fields(json!({"image": null}))).unwrap(), None);
        assert!(matches!(
            image(&fields(json!({"image": 12}))),
            Err(IngestError::ImageDecodeFailed(_))
        ));
    }
}
