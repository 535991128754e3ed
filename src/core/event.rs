// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Event model flowing through the pipeline

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Well-known event sources
pub mod sources {
    pub const CAM0: &str = "cam0";
    pub const CAM10: &str = "cam10";
    pub const AUDIO: &str = "audio";
}

/// Well-known event types
pub mod kinds {
    pub const CAMERA_DETECTION: &str = "camera_detection";
    pub const NOISE_LEVEL: &str = "noise_level";
    pub const CONNECTION: &str = "connection";
}

/// A single payload value. Kept deliberately small: producers only ever emit
/// counts, flags, measurements, labels and label lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::List(v.into_iter().map(FieldValue::Text).collect())
    }
}

/// Source-specific event fields, ordered by name
pub type Payload = BTreeMap<String, FieldValue>;

/// A timestamped, source-tagged sensing observation.
///
/// Serializes flat: `source`, `type` and `timestamp` sit next to the payload
/// fields, which is the shape dashboard clients and the persisted log expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Event {
    /// Create an event without a timestamp; the consumer loop stamps it.
    pub fn new(source: &str, kind: &str) -> Self {
        Self {
            source: source.to_string(),
            kind: kind.to_string(),
            timestamp: None,
            payload: Payload::new(),
        }
    }

    /// Builder-style payload field
    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.payload.get(key)
    }

    /// Assign `now` if no timestamp is present. Returns whether one was assigned.
    pub fn stamp_if_missing(&mut self, now: DateTime<Utc>) -> bool {
        if self.timestamp.is_some() {
            return false;
        }
        self.timestamp = Some(now);
        true
    }

    /// Source and type must both be present for an event to enter the pipeline
    pub fn is_well_formed(&self) -> bool {
        !self.source.trim().is_empty() && !self.kind.trim().is_empty()
    }

    /// Whether this is a camera detection flagged as an accident
    pub fn is_accident(&self) -> bool {
        self.kind == kinds::CAMERA_DETECTION
            && self
                .get("accident_detected")
                .and_then(FieldValue::as_bool)
                .unwrap_or(false)
    }

    /// cam0: people counting plus pose-based accident assessment
    pub fn people_detection(
        people_count: u32,
        accident_detected: bool,
        accident_type: Option<String>,
        fps: f64,
    ) -> Self {
        Self::new(sources::CAM0, kinds::CAMERA_DETECTION)
            .with("camera", sources::CAM0)
            .with("people_count", people_count)
            .with("accident_detected", accident_detected)
            .with("accident_type", accident_type)
            .with("fps", fps)
            .at(Utc::now())
    }

    /// cam10: PPE compliance
    pub fn ppe_detection(
        compliant: u32,
        non_compliant: u32,
        total: u32,
        missing_items: Vec<String>,
        fps: f64,
    ) -> Self {
        Self::new(sources::CAM10, kinds::CAMERA_DETECTION)
            .with("camera", sources::CAM10)
            .with("ppe_compliant", compliant)
            .with("ppe_non_compliant", non_compliant)
            .with("total_detected", total)
            .with("missing_items", missing_items)
            .with("fps", fps)
            .at(Utc::now())
    }

    /// audio: sound pressure level against the configured threshold
    pub fn noise_level(level_db: f64, threshold: f64) -> Self {
        Self::new(sources::AUDIO, kinds::NOISE_LEVEL)
            .with("noise_level", level_db)
            .with("threshold", threshold)
            .with("alert", level_db > threshold)
            .at(Utc::now())
    }
}

/// Canonical timestamp text: RFC 3339, UTC, microseconds. Sorts lexicographically.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in canonical form
pub fn timestamp_now() -> String {
    format_timestamp(&Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_event_without_timestamp() {
        let json = r#"{"source":"audio","type":"noise_level","noise_level":92,"threshold":85,"alert":true}"#;
        let event: Event = serde_json::from_str(json).unwrap();

        assert_eq!(event.source, "audio");
        assert_eq!(event.kind, "noise_level");
        assert!(event.timestamp.is_none());
        assert_eq!(event.get("noise_level"), Some(&FieldValue::Int(92)));
        assert_eq!(event.get("alert").and_then(FieldValue::as_bool), Some(true));
    }

    #[test]
    fn test_serialize_is_flat() {
        let event = Event::ppe_detection(1, 2, 3, vec!["helmet".to_string()], 9.5);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["source"], "cam10");
        assert_eq!(value["type"], "camera_detection");
        assert_eq!(value["ppe_non_compliant"], 2);
        assert_eq!(value["missing_items"][0], "helmet");
        assert!(value["timestamp"].is_string());
        assert!(value.get("payload").is_none());
    }

    #[test]
    fn test_stamp_never_overwrites() {
        let original = Utc::now() - chrono::Duration::hours(1);
        let mut event = Event::new("cam0", "camera_detection").at(original);

        assert!(!event.stamp_if_missing(Utc::now()));
        assert_eq!(event.timestamp, Some(original));

        let mut bare = Event::new("cam0", "camera_detection");
        assert!(bare.stamp_if_missing(original));
        assert_eq!(bare.timestamp, Some(original));
    }

    #[test]
    fn test_null_and_nested_values() {
        let event = Event::people_detection(2, false, None, 10.0);
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(back.get("accident_type"), Some(&FieldValue::Null));
        assert_eq!(back, event);
    }

    #[test]
    fn test_accident_flag() {
        assert!(Event::people_detection(1, true, Some("fall_detected".into()), 10.0).is_accident());
        assert!(!Event::people_detection(1, false, None, 10.0).is_accident());
        assert!(!Event::noise_level(90.0, 85.0).with("accident_detected", true).is_accident());
    }

    #[test]
    fn test_well_formed() {
        assert!(Event::new("audio", "noise_level").is_well_formed());
        assert!(!Event::new("", "noise_level").is_well_formed());
        assert!(!Event::new("audio", " ").is_well_formed());
    }
}
