use log::{debug, warn};
use rumqttc::QoS;
use std::sync::Arc;

use crate::{
    modules::{
        ingest::{InboundMessage, IngestOutcome, IngestionStore},
        mqtt::mqtt_client::MqttClient,
    },
    shared::errors::MqttError,
};

/// Subscribe to the telemetry filters and feed every message into the store.
pub async fn handler(
    client: &MqttClient,
    store: Arc<IngestionStore>,
    filters: &[String],
) -> Result<(), MqttError> {
    for filter in filters {
        client.subscribe(filter, QoS::AtLeastOnce).await?;
    }

    client
        .add_topic_handler(filters, move |publish| {
            handle_message(&store, &publish.topic, publish.payload.clone());
        })
        .await;

    Ok(())
}

/// Never fails: a bad message is logged and dropped so the event loop keeps running.
pub fn handle_message(store: &IngestionStore, topic: &str, payload: bytes::Bytes) {
    let message = InboundMessage::new(topic, payload);
    match store.ingest(&message) {
        Ok(IngestOutcome::Stale) => {
            debug!("Discarded out-of-order reading on topic '{}'", topic);
        }
        Ok(outcome) => {
            debug!("Ingested message on topic '{}': {:?}", topic, outcome);
        }
        Err(e) => {
            warn!("Dropping message on topic '{}': {}", topic, e);
        }
    }
}
