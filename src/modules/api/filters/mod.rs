use serde::de::DeserializeOwned;
use std::{convert::Infallible, sync::Arc};
use warp::Filter;

use crate::modules::{command::CommandPublisher, ingest::IngestionStore};

pub fn with_json_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(1024 * 16).and(warp::body::json())
}

pub fn with_store(
    store: Arc<IngestionStore>,
) -> impl Filter<Extract = (Arc<IngestionStore>,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

pub fn with_publisher(
    publisher: Arc<CommandPublisher>,
) -> impl Filter<Extract = (Arc<CommandPublisher>,), Error = Infallible> + Clone {
    warp::any().map(move || publisher.clone())
}
