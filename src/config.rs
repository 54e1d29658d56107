use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::modules::mqtt::config::{MqttConfig, TopicsConfig};
use crate::shared::errors::ConfigError;

pub const CONFIG_ENV: &str = "HELM_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/helm.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Configs {
    pub mqtt: MqttConfig,
    pub topics: TopicsConfig,
    pub ingest: IngestConfig,
    pub command: CommandConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub history_capacity: usize,
    /// Forget devices silent for this long. Unset keeps devices forever.
    pub prune_after_secs: Option<u64>,
    pub prune_interval_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            history_capacity: 20,
            prune_after_secs: None,
            prune_interval_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CommandConfig {
    pub threshold_min: f64,
    pub threshold_max: f64,
    /// `{device_id}` is replaced by the target device.
    pub config_topic: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        CommandConfig {
            threshold_min: 0.3,
            threshold_max: 0.95,
            config_topic: "helm/config/{device_id}".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], 3030)),
        }
    }
}

impl Configs {
    /// Load from `$HELM_CONFIG`, or `config/helm.toml` if it exists, then
    /// apply environment overrides. Missing default file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut configs = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load_from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from_file(DEFAULT_CONFIG_PATH)?
            }
            Err(_) => {
                info!("No config file found, using defaults");
                Configs::default()
            }
        };

        configs.apply_env_overrides(|key| std::env::var(key).ok())?;
        configs.validate()?;
        Ok(configs)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let configs: Configs = toml::from_str(&content)?;
        info!("Configurations loaded from {}", path.display());
        Ok(configs)
    }

    /// Broker address and credentials may come from the environment so they
    /// never have to live in the config file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(broker) = lookup("MQTT_BROKER") {
            self.mqtt.broker = broker;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            self.mqtt.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("MQTT_PORT '{}' is not a port", port)))?;
        }
        if let Some(username) = lookup("MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let command = &self.command;
        if !(0.0..=1.0).contains(&command.threshold_min)
            || !(0.0..=1.0).contains(&command.threshold_max)
            || command.threshold_min > command.threshold_max
        {
            return Err(ConfigError::Invalid(format!(
                "threshold range [{}, {}] must lie within [0, 1]",
                command.threshold_min, command.threshold_max
            )));
        }
        if !command.config_topic.contains("{device_id}") {
            return Err(ConfigError::Invalid(
                "command.config_topic must contain {device_id}".to_string(),
            ));
        }
        if self.ingest.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "ingest.history_capacity must be at least 1".to_string(),
            ));
        }
        if self.ingest.prune_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "ingest.prune_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.mqtt.max_packet_size == 0 {
            return Err(ConfigError::Invalid(
                "mqtt.max_packet_size must be at least 1".to_string(),
            ));
        }
        if self.topics.subscriptions.is_empty() {
            return Err(ConfigError::Invalid(
                "topics.subscriptions must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
