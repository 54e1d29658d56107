use log::{debug, error, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, Publish, QoS,
    TlsConfiguration, Transport,
};
use std::{fs, sync::Arc, time::Duration};
use tokio::{sync::RwLock, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use super::{
    config::{MqttConfig, TransportKind},
    topic,
};
use crate::modules::command::ConfigTransport;
use crate::modules::ingest::{ConnectionStatus, IngestionStore};
use crate::shared::errors::MqttError;

type TopicHandler = Box<dyn Fn(&Publish) + Send + Sync + 'static>;

struct HandlerEntry {
    filters: Vec<String>,
    handler: TopicHandler,
}

#[derive(Clone)]
pub struct MqttClient {
    client: AsyncClient,
    topic_handlers: Arc<RwLock<Vec<HandlerEntry>>>,
    store: Arc<IngestionStore>,
}

impl MqttClient {
    /// Build the client and spawn its event loop. The loop keeps polling
    /// (and therefore reconnecting) until `shutdown` is cancelled.
    pub fn new(
        config: &MqttConfig,
        store: Arc<IngestionStore>,
        shutdown: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), MqttError> {
        let options = mqtt_options(config)?;
        let (client, eventloop) = AsyncClient::new(options, config.channel_capacity);

        let mqtt_client = MqttClient {
            client,
            topic_handlers: Arc::new(RwLock::new(Vec::new())),
            store,
        };

        mqtt_client
            .store
            .set_connection_status(ConnectionStatus::Connecting);
        info!(
            "Connecting to broker {}:{} over {:?}",
            config.broker, config.port, config.transport
        );

        let reconnect_delay = Duration::from_millis(config.reconnect_delay_ms);
        let task = tokio::spawn(
            mqtt_client
                .clone()
                .run_event_loop(eventloop, reconnect_delay, shutdown),
        );

        Ok((mqtt_client, task))
    }

    async fn run_event_loop(
        self,
        mut eventloop: EventLoop,
        reconnect_delay: Duration,
        shutdown: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(
                        "Received {} bytes on topic '{}'",
                        publish.payload.len(),
                        publish.topic
                    );
                    self.dispatch(&publish).await;
                }
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!("Connection established with broker.");
                        self.store.set_connection_status(ConnectionStatus::Connected);
                        self.resubscribe().await;
                    } else {
                        warn!("Broker refused connection: {:?}", ack.code);
                        self.store
                            .set_connection_status(ConnectionStatus::Failed(format!(
                                "{:?}",
                                ack.code
                            )));
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Broker closed the connection.");
                    self.store
                        .set_connection_status(ConnectionStatus::Disconnected);
                }
                Ok(_) => (),
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    self.store
                        .set_connection_status(ConnectionStatus::Failed(e.to_string()));
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(reconnect_delay) => {}
                    }
                }
            }
        }

        if let Err(e) = self.client.try_disconnect() {
            debug!("Disconnect request not sent: {}", e);
        }
        self.store
            .set_connection_status(ConnectionStatus::Disconnected);
        info!("MQTT event loop stopped.");
    }

    async fn dispatch(&self, publish: &Publish) {
        let handlers = self.topic_handlers.read().await;
        let mut handled = false;
        for entry in handlers.iter() {
            if entry
                .filters
                .iter()
                .any(|filter| topic::matches(filter, &publish.topic))
            {
                (entry.handler)(publish);
                handled = true;
            }
        }
        if !handled {
            debug!("No handler for topic '{}'", publish.topic);
        }
    }

    // clean sessions lose subscriptions on every reconnect
    async fn resubscribe(&self) {
        let handlers = self.topic_handlers.read().await;
        for filter in handlers.iter().flat_map(|entry| entry.filters.iter()) {
            let client = self.client.clone();
            let filter = filter.clone();
            tokio::spawn(async move {
                info!("Subscribing to topic: {}", filter);
                if let Err(e) = client.subscribe(filter.clone(), QoS::AtLeastOnce).await {
                    error!("Failed to subscribe to topic '{}': {}", filter, e);
                }
            });
        }
    }

    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), rumqttc::ClientError> {
        self.client.subscribe(topic, qos).await?;
        Ok(())
    }

    /// Register `handler` for every filter in `filters`. A message matching
    /// several of them is still delivered to the handler once.
    pub async fn add_topic_handler<F>(&self, filters: &[String], handler: F)
    where
        F: Fn(&Publish) + Send + Sync + 'static,
    {
        let mut handlers = self.topic_handlers.write().await;
        handlers.push(HandlerEntry {
            filters: filters.to_vec(),
            handler: Box::new(handler),
        });
    }
}

impl ConfigTransport for MqttClient {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), String> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| e.to_string())
    }
}

fn mqtt_options(config: &MqttConfig) -> Result<MqttOptions, MqttError> {
    let mut options = match config.transport {
        TransportKind::Tcp | TransportKind::Tls => {
            MqttOptions::new(&config.client_id, &config.broker, config.port)
        }
        TransportKind::Ws | TransportKind::Wss => {
            MqttOptions::new(&config.client_id, websocket_url(config), config.port)
        }
    };
    options.set_keep_alive(Duration::from_secs(config.keep_alive.max(5).into()));
    options.set_clean_session(true);
    options.set_max_packet_size(config.max_packet_size, config.max_packet_size);

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    match config.transport {
        TransportKind::Tcp => {}
        TransportKind::Ws => {
            options.set_transport(Transport::Ws);
        }
        TransportKind::Tls => {
            let transport = match tls_configuration(config)? {
                Some(tls) => Transport::tls_with_config(tls),
                None => Transport::tls_with_default_config(),
            };
            options.set_transport(transport);
        }
        TransportKind::Wss => {
            let transport = match tls_configuration(config)? {
                Some(tls) => Transport::Wss(tls),
                None => Transport::wss_with_default_config(),
            };
            options.set_transport(transport);
        }
    }

    Ok(options)
}

fn websocket_url(config: &MqttConfig) -> String {
    let scheme = match config.transport {
        TransportKind::Wss => "wss",
        _ => "ws",
    };
    let path = if config.ws_path.starts_with('/') {
        config.ws_path.clone()
    } else {
        format!("/{}", config.ws_path)
    };
    format!("{}://{}:{}{}", scheme, config.broker, config.port, path)
}

/// Custom TLS material, if a CA certificate was configured. Client auth is
/// used only when both the certificate and the key are given.
fn tls_configuration(config: &MqttConfig) -> Result<Option<TlsConfiguration>, MqttError> {
    let Some(ca_path) = &config.ca_cert else {
        return Ok(None);
    };
    let ca = load_certificate(ca_path)?;

    let client_auth = match (&config.client_cert, &config.client_key) {
        (Some(cert), Some(key)) => Some((load_certificate(cert)?, load_certificate(key)?)),
        _ => None,
    };

    Ok(Some(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    }))
}

fn load_certificate(path: &str) -> Result<Vec<u8>, MqttError> {
    fs::read(path).map_err(|source| MqttError::Certificate {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_includes_path() {
        let config = MqttConfig {
            broker: "broker.emqx.io".into(),
            port: 8084,
            transport: TransportKind::Wss,
            ws_path: "mqtt".into(),
            ..Default::default()
        };
        assert_eq!(websocket_url(&config), "wss://broker.emqx.io:8084/mqtt");
    }

    #[test]
    fn plain_tcp_needs_no_certificates() {
        let options = mqtt_options(&MqttConfig::default()).unwrap();
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
    }

    #[test]
    fn default_options_accept_a_camera_snapshot() {
        use bytes::BytesMut;
        use rumqttc::mqttbytes::v4::{self, Packet as WirePacket, Publish as WirePublish};

        let options = mqtt_options(&MqttConfig::default()).unwrap();

        // 24 KiB frame, base64 in a JSON body, as an ESP32-CAM sends it
        let frame = vec![0xABu8; 24 * 1024];
        let body = format!(
            r#"{{"id":"1","image":"{}"}}"#,
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &frame)
        );
        let mut publish = WirePublish::new("helm/1/image", QoS::AtLeastOnce, body.into_bytes());
        publish.pkid = 1;

        let mut wire = BytesMut::new();
        publish.write(&mut wire).unwrap();
        assert!(wire.len() > 10 * 1024);

        match v4::read(&mut wire, options.max_packet_size()).unwrap() {
            WirePacket::Publish(read) => assert_eq!(read.topic, "helm/1/image"),
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn missing_ca_file_is_an_error() {
        let config = MqttConfig {
            transport: TransportKind::Tls,
            ca_cert: Some("/nonexistent/ca.pem".into()),
            ..Default::default()
        };
        assert!(matches!(
            mqtt_options(&config),
            Err(MqttError::Certificate { .. })
        ));
    }
}
