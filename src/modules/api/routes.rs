use std::sync::Arc;
use warp::Filter;

use crate::modules::{
    api::{
        filters::{with_json_body, with_publisher, with_store},
        handlers,
        models::ThresholdRequest,
    },
    command::CommandPublisher,
    ingest::IngestionStore,
};

pub fn status_route(
    store: Arc<IngestionStore>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("status")
        .and(warp::get())
        .and(with_store(store))
        .and_then(handlers::status_handler)
}

pub fn devices_routes(
    store: Arc<IngestionStore>,
    publisher: Arc<CommandPublisher>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let list = warp::path!("devices")
        .and(warp::get())
        .and(with_store(store.clone()))
        .and_then(handlers::devices_handler);

    let single = warp::path!("devices" / String)
        .and(warp::get())
        .and(with_store(store.clone()))
        .and_then(handlers::device_handler);

    let image = warp::path!("devices" / String / "image")
        .and(warp::get())
        .and(with_store(store))
        .and_then(handlers::device_image_handler);

    let threshold = warp::path!("devices" / String / "threshold")
        .and(warp::post())
        .and(with_json_body::<ThresholdRequest>())
        .and(with_publisher(publisher))
        .and_then(handlers::threshold_handler);

    list.or(single).or(image).or(threshold)
}
