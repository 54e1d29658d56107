use log::info;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::interval};
use tokio_util::sync::CancellationToken;

use super::store::IngestionStore;

/// Periodically drop devices that have gone dark so they stop counting
/// towards `danger_count` and the device lists.
pub fn spawn_pruner(
    store: Arc<IngestionStore>,
    max_age: Duration,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut prune_interval = interval(every);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = prune_interval.tick() => {
                    let removed = store.prune(max_age);
                    if removed > 0 {
                        info!(
                            "Pruned {} device(s) silent for more than {}s",
                            removed,
                            max_age.as_secs()
                        );
                    }
                }
            }
        }
    })
}
