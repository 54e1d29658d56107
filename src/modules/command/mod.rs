mod publisher;

pub use publisher::{CommandPublisher, ConfigTransport};

#[cfg(test)]
pub(crate) use publisher::testing;
