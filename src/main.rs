mod config;
mod logger;
mod modules;
mod shared;

use config::Configs;
use log::{error, info};
use modules::{
    api::start_api,
    command::CommandPublisher,
    ingest::{spawn_pruner, IngestionStore},
    mqtt::start_mqtt,
};
use shared::clock::SystemClock;
use std::{process, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    logger::start_log();

    let configs = match Configs::load() {
        Ok(configs) => configs,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let store = Arc::new(IngestionStore::new(
        configs.topics.layout,
        configs.ingest.history_capacity,
        Arc::new(SystemClock),
    ));
    let shutdown = CancellationToken::new();

    let (mqtt_client, mqtt_task) =
        match start_mqtt(&configs.mqtt, &configs.topics, store.clone(), shutdown.clone()).await {
            Ok(started) => started,
            Err(e) => {
                error!("Failed to start mqtt: {}", e);
                process::exit(1);
            }
        };

    let publisher = Arc::new(CommandPublisher::new(
        store.clone(),
        Arc::new(mqtt_client),
        &configs.command,
    ));

    let pruner_task = configs.ingest.prune_after_secs.map(|max_age| {
        info!("Pruning devices silent for more than {}s", max_age);
        spawn_pruner(
            store.clone(),
            Duration::from_secs(max_age),
            Duration::from_secs(configs.ingest.prune_interval_secs),
            shutdown.clone(),
        )
    });

    let api_task = match start_api(configs.api.bind, store, publisher, shutdown.clone()) {
        Ok(task) => task,
        Err(e) => {
            error!("Failed to bind API on {}: {}", configs.api.bind, e);
            shutdown.cancel();
            join_task("Mqtt", mqtt_task).await;
            process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down...");
    shutdown.cancel();

    join_task("Mqtt", mqtt_task).await;
    join_task("API", api_task).await;
    if let Some(task) = pruner_task {
        join_task("Pruner", task).await;
    }
}

/// Wait for a background task, logging a panic or cancellation. Returns
/// whether it finished cleanly.
async fn join_task(name: &str, task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            error!("{} task ended abnormally: {}", name, e);
            false
        }
    }
}
