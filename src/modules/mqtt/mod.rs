pub mod config;
mod handlers;
mod mqtt_client;
mod topic;

pub use mqtt_client::MqttClient;

use self::config::{MqttConfig, TopicsConfig};
use crate::{modules::ingest::IngestionStore, shared::errors::MqttError};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Connect to the broker and route telemetry into `store`. The returned task
/// finishes once `shutdown` is cancelled.
pub async fn start_mqtt(
    mqtt_config: &MqttConfig,
    topics: &TopicsConfig,
    store: Arc<IngestionStore>,
    shutdown: CancellationToken,
) -> Result<(MqttClient, JoinHandle<()>), MqttError> {
    let (mqtt, task) = MqttClient::new(mqtt_config, store.clone(), shutdown)?;
    log::info!("Mqtt started...");

    handlers::telemetry::handler(&mqtt, store, &topics.subscriptions).await?;

    Ok((mqtt, task))
}
