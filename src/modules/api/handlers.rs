use std::sync::Arc;
use warp::{
    http::header::CONTENT_TYPE,
    hyper::Body,
    reply::{json, Response},
};

use super::models::{
    DeviceView, DevicesResponse, StatusResponse, ThresholdRequest, ThresholdResponse,
};
use crate::{
    modules::{command::CommandPublisher, ingest::IngestionStore},
    shared::errors::{AppError, ErrorMessage, ErrorType},
};

#[utoipa::path(
        get,
        path = "/status",
        responses(
            (status = 200, description = "Broker connection and danger summary", body = StatusResponse),
        )
    )
]
pub async fn status_handler(store: Arc<IngestionStore>) -> Result<impl warp::Reply, warp::Rejection> {
    let snapshot = store.snapshot();
    Ok(json(&StatusResponse {
        connection: (&snapshot.connection).into(),
        danger_count: snapshot.danger_count,
        device_count: snapshot.devices.len(),
    }))
}

#[utoipa::path(
        get,
        path = "/devices",
        responses(
            (status = 200, description = "Every known device with its latest reading and history", body = DevicesResponse),
        )
    )
]
pub async fn devices_handler(store: Arc<IngestionStore>) -> Result<impl warp::Reply, warp::Rejection> {
    let snapshot = store.snapshot();
    Ok(json(&DevicesResponse::from(&snapshot)))
}

#[utoipa::path(
        get,
        path = "/devices/{device_id}",
        params(("device_id" = String, Path, description = "Device id")),
        responses(
            (status = 200, description = "Device state", body = DeviceView),
            (status = 404, description = "Unknown device", body = ErrorMessage),
        )
    )
]
pub async fn device_handler(
    device_id: String,
    store: Arc<IngestionStore>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let state = store.device(&device_id).ok_or_else(|| unknown_device(&device_id))?;
    Ok(json(&DeviceView::new(&device_id, &state)))
}

#[utoipa::path(
        get,
        path = "/devices/{device_id}/image",
        params(("device_id" = String, Path, description = "Device id")),
        responses(
            (status = 200, description = "Last camera snapshot as raw image bytes"),
            (status = 404, description = "Unknown device or no snapshot yet", body = ErrorMessage),
        )
    )
]
pub async fn device_image_handler(
    device_id: String,
    store: Arc<IngestionStore>,
) -> Result<Response, warp::Rejection> {
    let state = store.device(&device_id).ok_or_else(|| unknown_device(&device_id))?;
    let frame = state.last_image().ok_or_else(|| {
        warp::reject::custom(AppError::new(
            &format!("No snapshot received from device '{}' yet", device_id),
            ErrorType::NotFound,
        ))
    })?;

    let mut res = Response::new(Body::from(frame.bytes.clone()));
    res.headers_mut().insert(
        CONTENT_TYPE,
        warp::http::HeaderValue::from_static(frame.mime_type()),
    );
    Ok(res)
}

#[utoipa::path(
        post,
        path = "/devices/{device_id}/threshold",
        params(("device_id" = String, Path, description = "Device id, or `all` for every known device")),
        request_body = ThresholdRequest,
        responses(
            (status = 200, description = "Threshold handed to the broker", body = ThresholdResponse),
            (status = 400, description = "Threshold out of range or invalid device", body = ErrorMessage),
            (status = 502, description = "Broker client rejected the publish", body = ErrorMessage),
            (status = 503, description = "Broker connection is down", body = ErrorMessage),
        )
    )
]
pub async fn threshold_handler(
    device_id: String,
    body: ThresholdRequest,
    publisher: Arc<CommandPublisher>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let published = publisher
        .set_threshold(&device_id, body.threshold)
        .map_err(|err| warp::reject::custom(AppError::from(err)))?;

    Ok(json(&ThresholdResponse {
        target: device_id,
        threshold: body.threshold,
        published,
    }))
}

fn unknown_device(device_id: &str) -> warp::Rejection {
    warp::reject::custom(AppError::new(
        &format!("Unknown device '{}'", device_id),
        ErrorType::NotFound,
    ))
}
