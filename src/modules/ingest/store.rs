use chrono::{DateTime, Utc};
use log::debug;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use super::{
    frame::decode_image,
    models::{
        ConnectionStatus, DeviceId, DeviceState, ImageFrame, InboundMessage, MergeResult,
    },
    payload,
    routing::{self, MessageKind, TopicLayout},
};
use crate::shared::{clock::Clock, errors::IngestError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Reading became the device's latest and was appended to its history.
    Updated,
    /// Reading was older than the stored latest and was discarded.
    Stale,
    /// A new frame replaced the device's last image.
    ImageStored,
    /// Kind not handled by this store; nothing changed.
    Ignored,
}

/// Point-in-time view of every device and the link state, taken under one
/// guard. Each `DeviceState` is shared with the store and never mutated after
/// it was handed out.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub devices: HashMap<DeviceId, Arc<DeviceState>>,
    pub danger_count: usize,
    pub connection: ConnectionStatus,
}

impl Snapshot {
    /// Device ids in a stable order, for lists and fan-out.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[derive(Default)]
struct DeviceTable {
    devices: HashMap<DeviceId, Arc<DeviceState>>,
    danger_count: usize,
    connection: ConnectionStatus,
}

impl DeviceTable {
    fn set_connection(&mut self, status: ConnectionStatus) {
        if self.connection != status {
            debug!("Connection status {} -> {}", self.connection, status);
            self.connection = status;
        }
    }

    // always derived from the table, never adjusted incrementally
    fn recount_danger(&mut self) {
        self.danger_count = self.devices.values().filter(|d| d.is_danger()).count();
    }

    fn entry(&mut self, device_id: &str, now: DateTime<Utc>) -> &mut DeviceState {
        let state = self
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(DeviceState::new(now)));
        // copy-on-write: readers holding the old Arc keep their view
        Arc::make_mut(state)
    }
}

pub struct IngestionStore {
    layout: TopicLayout,
    history_capacity: usize,
    clock: Arc<dyn Clock>,
    table: RwLock<DeviceTable>,
}

impl IngestionStore {
    pub fn new(layout: TopicLayout, history_capacity: usize, clock: Arc<dyn Clock>) -> Self {
        IngestionStore {
            layout,
            history_capacity: history_capacity.max(1),
            clock,
            table: RwLock::new(DeviceTable::default()),
        }
    }

    /// Entry point for the transport callback.
    ///
    /// Parsing and image decoding happen before any lock is taken; the lock is
    /// only held for the merge, the danger recount and marking the link live.
    /// Receiving anything routable is proof the link is up.
    pub fn ingest(&self, message: &InboundMessage) -> Result<IngestOutcome, IngestError> {
        let fields = payload::parse_body(&message.payload)?;
        let route = routing::resolve(self.layout, &message.topic, &fields)?;

        let outcome = match route.kind {
            None => {
                debug!("Ignoring unknown message kind on topic '{}'", message.topic);
                self.write_table().set_connection(ConnectionStatus::Connected);
                IngestOutcome::Ignored
            }
            Some(MessageKind::Data) => {
                let received_at = self.clock.now();
                let image = match payload::image(&fields)? {
                    Some(encoded) => Some(decode_image(encoded, received_at)?),
                    None => None,
                };
                let reading =
                    payload::normalize_reading(route.device_id, &fields, image, received_at);

                let mut table = self.write_table();
                let capacity = self.history_capacity;
                let merged = table
                    .entry(&reading.device_id, received_at)
                    .apply_reading(reading, capacity);
                table.recount_danger();
                table.set_connection(ConnectionStatus::Connected);

                match merged {
                    MergeResult::Accepted => IngestOutcome::Updated,
                    MergeResult::Stale => IngestOutcome::Stale,
                }
            }
            Some(MessageKind::Image) => {
                let received_at = self.clock.now();
                let encoded = payload::image(&fields)?.ok_or_else(|| {
                    IngestError::ImageDecodeFailed("image message without image field".into())
                })?;
                let frame = decode_image(encoded, received_at)?;
                self.store_image(&route.device_id, frame);
                IngestOutcome::ImageStored
            }
        };

        Ok(outcome)
    }

    fn store_image(&self, device_id: &str, frame: ImageFrame) {
        let mut table = self.write_table();
        table.entry(device_id, frame.received_at).apply_image(frame);
        table.recount_danger();
        table.set_connection(ConnectionStatus::Connected);
    }

    pub fn snapshot(&self) -> Snapshot {
        let table = self.read_table();
        Snapshot {
            devices: table.devices.clone(),
            danger_count: table.danger_count,
            connection: table.connection.clone(),
        }
    }

    pub fn device(&self, device_id: &str) -> Option<Arc<DeviceState>> {
        self.read_table().devices.get(device_id).cloned()
    }

    pub fn danger_count(&self) -> usize {
        self.read_table().danger_count
    }

    pub fn device_count(&self) -> usize {
        self.read_table().devices.len()
    }

    /// Forget devices not heard from within `max_age`. Returns how many were removed.
    pub fn prune(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let Some(cutoff) = self.clock.now().checked_sub_signed(max_age) else {
            return 0;
        };

        let mut table = self.write_table();
        let before = table.devices.len();
        table.devices.retain(|_, state| state.last_seen() >= cutoff);
        let removed = before - table.devices.len();
        if removed > 0 {
            table.recount_danger();
        }
        removed
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.read_table().connection.clone()
    }

    pub fn set_connection_status(&self, status: ConnectionStatus) {
        self.write_table().set_connection(status);
    }

    fn read_table(&self) -> RwLockReadGuard<'_, DeviceTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, DeviceTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }
}
