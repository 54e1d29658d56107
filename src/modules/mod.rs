pub mod api;
pub mod command;
pub mod ingest;
pub mod mqtt;
