use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::ImageFormat;
use std::collections::VecDeque;
use std::fmt;

pub type DeviceId = String;

/// A device id becomes one level of its config topic, so it must be
/// non-empty and free of level separators and wildcards.
pub fn is_valid_device_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '+', '#'])
}

/// A message as handed over by the transport: routing key plus raw body.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardLevel {
    Safe,
    Warning,
    Danger,
}

impl HazardLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardLevel::Safe => "SAFE",
            HazardLevel::Warning => "WARNING",
            HazardLevel::Danger => "DANGER",
        }
    }
}

/// Classification label exactly as the device sent it. Firmware versions use
/// both English and Indonesian labels and may add new ones, so the label is
/// kept verbatim and only interpreted through `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification(String);

impl Classification {
    pub fn new(label: impl Into<String>) -> Self {
        Classification(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    /// Case-insensitive mapping of known labels; unknown labels have no level.
    pub fn level(&self) -> Option<HazardLevel> {
        match self.0.trim().to_ascii_uppercase().as_str() {
            "SAFE" | "AMAN" => Some(HazardLevel::Safe),
            "WARNING" | "WASPADA" => Some(HazardLevel::Warning),
            "DANGER" | "BAHAYA" => Some(HazardLevel::Danger),
            _ => None,
        }
    }

    pub fn is_danger(&self) -> bool {
        self.level() == Some(HazardLevel::Danger)
    }
}

/// A decoded camera snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub bytes: Bytes,
    pub format: ImageFormat,
    pub received_at: DateTime<Utc>,
}

impl ImageFrame {
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReading {
    pub device_id: DeviceId,
    pub distance_cm: Option<f64>,
    pub classification: Option<Classification>,
    pub confidence: Option<f64>,
    pub danger_score: Option<f64>,
    pub detected_object: Option<String>,
    pub rssi_dbm: Option<i32>,
    pub image: Option<ImageFrame>,
    pub received_at: DateTime<Utc>,
}

impl DeviceReading {
    pub fn is_danger(&self) -> bool {
        self.classification
            .as_ref()
            .map(Classification::is_danger)
            .unwrap_or(false)
    }

    // history only feeds trend charts, frames live in `last_image`
    fn without_image(&self) -> DeviceReading {
        DeviceReading {
            image: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeResult {
    Accepted,
    Stale,
}

/// Everything known about one device. Only the ingestion store mutates it;
/// readers get it behind an `Arc` from a snapshot.
#[derive(Debug, Clone)]
pub struct DeviceState {
    latest: Option<DeviceReading>,
    history: VecDeque<DeviceReading>,
    last_image: Option<ImageFrame>,
    last_seen: DateTime<Utc>,
}

impl DeviceState {
    pub(super) fn new(first_seen: DateTime<Utc>) -> Self {
        DeviceState {
            latest: None,
            history: VecDeque::new(),
            last_image: None,
            last_seen: first_seen,
        }
    }

    pub fn latest(&self) -> Option<&DeviceReading> {
        self.latest.as_ref()
    }

    pub fn history(&self) -> impl Iterator<Item = &DeviceReading> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn last_image(&self) -> Option<&ImageFrame> {
        self.last_image.as_ref()
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    pub fn is_danger(&self) -> bool {
        self.latest
            .as_ref()
            .map(DeviceReading::is_danger)
            .unwrap_or(false)
    }

    /// Merge a data update. A reading older than the stored `latest` is
    /// rejected; any frame it carries is still kept since frames are not
    /// ordered against data.
    pub(super) fn apply_reading(&mut self, reading: DeviceReading, capacity: usize) -> MergeResult {
        self.touch(reading.received_at);
        if let Some(frame) = &reading.image {
            self.last_image = Some(frame.clone());
        }

        if let Some(latest) = &self.latest {
            if latest.received_at > reading.received_at {
                return MergeResult::Stale;
            }
        }

        self.history.push_back(reading.without_image());
        while self.history.len() > capacity {
            self.history.pop_front();
        }
        self.latest = Some(reading);
        MergeResult::Accepted
    }

    pub(super) fn apply_image(&mut self, frame: ImageFrame) {
        self.touch(frame.received_at);
        self.last_image = Some(frame);
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_seen {
            self.last_seen = at;
        }
    }
}

/// Transport health as seen by the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn state(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Failed(_) => "FAILED",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ConnectionStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}({})", self.state(), reason),
            None => write!(f, "{}", self.state()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn reading(secs: i64, status: &str) -> DeviceReading {
        DeviceReading {
            device_id: "d1".into(),
            distance_cm: Some(secs as f64),
            classification: Some(Classification::new(status)),
            confidence: None,
            danger_score: None,
            detected_object: None,
            rssi_dbm: None,
            image: None,
            received_at: at(secs),
        }
    }

    #[test]
    fn classification_levels_are_case_insensitive() {
        assert_eq!(Classification::new("bahaya").level(), Some(HazardLevel::Danger));
        assert_eq!(Classification::new("Danger").level(), Some(HazardLevel::Danger));
        assert_eq!(Classification::new(" aman ").level(), Some(HazardLevel::Safe));
        assert_eq!(Classification::new("WASPADA").level(), Some(HazardLevel::Warning));
    }

    #[test]
    fn unknown_classification_keeps_its_label() {
        let c = Classification::new("Helm-Lepas");
        assert_eq!(c.level(), None);
        assert_eq!(c.label(), "Helm-Lepas");
        assert!(!c.is_danger());
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let mut state = DeviceState::new(at(0));
        assert_eq!(state.apply_reading(reading(10, "AMAN"), 5), MergeResult::Accepted);
        assert_eq!(state.apply_reading(reading(10, "BAHAYA"), 5), MergeResult::Accepted);
        assert!(state.is_danger());
        assert_eq!(state.history_len(), 2);
    }

    #[test]
    fn history_drops_frames_but_latest_keeps_them() {
        let mut state = DeviceState::new(at(0));
        let mut r = reading(1, "AMAN");
        r.image = Some(ImageFrame {
            bytes: Bytes::from_static(&[0xFF, 0xD8, 0xFF]),
            format: ImageFormat::Jpeg,
            received_at: at(1),
        });
        state.apply_reading(r, 5);

        assert!(state.latest().unwrap().image.is_some());
        assert!(state.history().all(|h| h.image.is_none()));
        assert_eq!(state.last_image().unwrap().mime_type(), "image/jpeg");
    }

    #[test]
    fn connection_status_display() {
        assert_eq!(ConnectionStatus::default().to_string(), "DISCONNECTED");
        assert_eq!(
            ConnectionStatus::Failed("refused".into()).to_string(),
            "FAILED(refused)"
        );
    }
}
