mod filters;
mod handlers;
mod models;
mod routes;
mod swagger;

use crate::modules::{command::CommandPublisher, ingest::IngestionStore};
use crate::shared::errors::handle_rejection;
use std::{net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utoipa::OpenApi;
use warp::Filter;

#[derive(OpenApi)]
#[openapi(paths(
    handlers::status_handler,
    handlers::devices_handler,
    handlers::device_handler,
    handlers::device_image_handler,
    handlers::threshold_handler
))]
pub struct HelmHubApi;

fn api_routes(
    store: Arc<IngestionStore>,
    publisher: Arc<CommandPublisher>,
) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
    let api_doc = warp::path("api-doc.json")
        .and(warp::get())
        .map(|| warp::reply::json(&swagger::HelmHubDoc::openapi()));

    warp::path!("api" / ..)
        .and(
            api_doc
                .or(routes::status_route(store.clone()))
                .or(routes::devices_routes(store, publisher)),
        )
        .recover(handle_rejection)
}

/// Serve the JSON surface the dashboard polls. Stops accepting connections
/// once `shutdown` is cancelled.
pub fn start_api(
    bind: SocketAddr,
    store: Arc<IngestionStore>,
    publisher: Arc<CommandPublisher>,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, warp::Error> {
    let routes = api_routes(store, publisher);
    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(bind, async move { shutdown.cancelled().await })?;

    log::info!("Starting API on {}...", addr);
    Ok(tokio::spawn(server))
}
