use serde::{Deserialize, Serialize};

use crate::modules::ingest::TopicLayout;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Tls,
    Ws,
    Wss,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub transport: TransportKind,
    /// Path of the websocket endpoint, only used by `ws`/`wss`.
    pub ws_path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: u16,
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
    pub channel_capacity: usize,
    /// Largest MQTT packet accepted or sent, in bytes. Camera snapshots
    /// arrive base64-encoded and routinely exceed rumqttc's 10 KiB default.
    pub max_packet_size: usize,
    pub reconnect_delay_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "helm-hub".to_string(),
            transport: TransportKind::Tcp,
            ws_path: "/mqtt".to_string(),
            username: None,
            password: None,
            keep_alive: 60,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            channel_capacity: 250,
            max_packet_size: 1024 * 1024,
            reconnect_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TopicsConfig {
    pub layout: TopicLayout,
    pub subscriptions: Vec<String>,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        TopicsConfig {
            layout: TopicLayout::DeviceKind,
            subscriptions: vec!["helm/+/data".to_string(), "helm/+/image".to_string()],
        }
    }
}
