use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::config::CommandConfig;
use crate::modules::ingest::{is_valid_device_id, IngestionStore};
use crate::shared::errors::PublishError;

/// Outbound half of the broker connection. Implementations must hand the
/// message off without blocking; delivery is the transport's business.
pub trait ConfigTransport: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Device(String),
    All,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Target, PublishError> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("all") {
            return Ok(Target::All);
        }
        if !is_valid_device_id(raw) {
            return Err(PublishError::InvalidTarget(raw.to_string()));
        }
        Ok(Target::Device(raw.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ThresholdCommand {
    threshold: f64,
}

pub struct CommandPublisher {
    store: Arc<IngestionStore>,
    transport: Arc<dyn ConfigTransport>,
    threshold_min: f64,
    threshold_max: f64,
    topic_template: String,
}

impl CommandPublisher {
    pub fn new(
        store: Arc<IngestionStore>,
        transport: Arc<dyn ConfigTransport>,
        config: &CommandConfig,
    ) -> Self {
        CommandPublisher {
            store,
            transport,
            threshold_min: config.threshold_min,
            threshold_max: config.threshold_max,
            topic_template: config.config_topic.clone(),
        }
    }

    pub fn config_topic(&self, device_id: &str) -> String {
        self.topic_template.replace("{device_id}", device_id)
    }

    /// Validate `value` and send it to one device, or to every known device
    /// when `target` is `all`. Returns how many publishes were handed off.
    pub fn set_threshold(&self, target: &str, value: f64) -> Result<usize, PublishError> {
        if !value.is_finite() || value < self.threshold_min || value > self.threshold_max {
            return Err(PublishError::OutOfRange {
                value,
                min: self.threshold_min,
                max: self.threshold_max,
            });
        }
        let target = Target::parse(target)?;

        if !self.store.connection_status().is_connected() {
            warn!("Threshold not sent, broker connection is down");
            return Err(PublishError::NotConnected);
        }

        let payload = serde_json::to_vec(&ThresholdCommand { threshold: value })
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let device_ids = match target {
            Target::Device(id) => vec![id],
            // one snapshot for the whole fan-out
            Target::All => self.store.snapshot().device_ids(),
        };

        let mut sent = 0;
        let mut failures = Vec::new();
        for device_id in &device_ids {
            let topic = self.config_topic(device_id);
            match self.transport.publish(&topic, payload.clone()) {
                Ok(()) => sent += 1,
                Err(e) => {
                    error!("Failed to send threshold to topic '{}': {}", topic, e);
                    failures.push(format!("{}: {}", device_id, e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(PublishError::Transport(format!(
                "{} of {} publishes rejected ({})",
                failures.len(),
                device_ids.len(),
                failures.join("; ")
            )));
        }

        info!("Threshold {} sent to {} device(s)", value, sent);
        Ok(sent)
    }
}
