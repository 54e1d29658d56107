use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::modules::ingest::{ConnectionStatus, DeviceReading, DeviceState, ImageFrame, Snapshot};

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionView {
    /// DISCONNECTED, CONNECTING, CONNECTED or FAILED
    pub state: String,
    pub reason: Option<String>,
}

impl From<&ConnectionStatus> for ConnectionView {
    fn from(status: &ConnectionStatus) -> Self {
        ConnectionView {
            state: status.state().to_string(),
            reason: status.reason().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub connection: ConnectionView,
    pub danger_count: usize,
    pub device_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadingView {
    pub received_at: DateTime<Utc>,
    pub distance_cm: Option<f64>,
    /// Label exactly as sent by the device
    pub classification: Option<String>,
    /// SAFE, WARNING or DANGER when the label is recognized
    pub hazard: Option<String>,
    pub confidence: Option<f64>,
    pub danger_score: Option<f64>,
    pub detected_object: Option<String>,
    pub rssi_dbm: Option<i32>,
}

impl From<&DeviceReading> for ReadingView {
    fn from(reading: &DeviceReading) -> Self {
        let classification = reading.classification.as_ref();
        ReadingView {
            received_at: reading.received_at,
            distance_cm: reading.distance_cm,
            classification: classification.map(|c| c.label().to_string()),
            hazard: classification
                .and_then(|c| c.level())
                .map(|level| level.as_str().to_string()),
            confidence: reading.confidence,
            danger_score: reading.danger_score,
            detected_object: reading.detected_object.clone(),
            rssi_dbm: reading.rssi_dbm,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImageView {
    pub mime_type: String,
    pub size_bytes: usize,
    pub received_at: DateTime<Utc>,
}

impl From<&ImageFrame> for ImageView {
    fn from(frame: &ImageFrame) -> Self {
        ImageView {
            mime_type: frame.mime_type().to_string(),
            size_bytes: frame.bytes.len(),
            received_at: frame.received_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceView {
    pub device_id: String,
    pub danger: bool,
    pub last_seen: DateTime<Utc>,
    pub latest: Option<ReadingView>,
    /// Oldest first
    pub history: Vec<ReadingView>,
    pub image: Option<ImageView>,
}

impl DeviceView {
    pub fn new(device_id: &str, state: &DeviceState) -> Self {
        DeviceView {
            device_id: device_id.to_string(),
            danger: state.is_danger(),
            last_seen: state.last_seen(),
            latest: state.latest().map(ReadingView::from),
            history: state.history().map(ReadingView::from).collect(),
            image: state.last_image().map(ImageView::from),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DevicesResponse {
    pub connection: ConnectionView,
    pub danger_count: usize,
    pub devices: Vec<DeviceView>,
}

impl From<&Snapshot> for DevicesResponse {
    fn from(snapshot: &Snapshot) -> Self {
        let devices = snapshot
            .device_ids()
            .iter()
            .filter_map(|id| snapshot.devices.get(id).map(|state| DeviceView::new(id, state)))
            .collect();

        DevicesResponse {
            connection: ConnectionView::from(&snapshot.connection),
            danger_count: snapshot.danger_count,
            devices,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ThresholdRequest {
    pub threshold: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThresholdResponse {
    pub target: String,
    pub threshold: f64,
    pub published: usize,
}
