mod frame;
mod models;
mod payload;
mod pruner;
mod routing;
mod store;

pub use models::{
    is_valid_device_id, ConnectionStatus, DeviceReading, DeviceState, ImageFrame, InboundMessage,
};
pub use pruner::spawn_pruner;
pub use routing::TopicLayout;
pub use store::{IngestOutcome, IngestionStore, Snapshot};

#[cfg(test)]
pub(crate) use frame::fixtures as test_fixtures;
