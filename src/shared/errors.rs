use serde::Serialize;
use std::convert::Infallible;
use utoipa::ToSchema;
use warp::{http::StatusCode, reject::Reject, Rejection, Reply};

/// Reasons an inbound device message is dropped. None of these are fatal:
/// the transport callback logs them and keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("cannot determine device for topic '{0}'")]
    UnroutableMessage(String),

    #[error("image decode failed: {0}")]
    ImageDecodeFailed(String),
}

/// Errors surfaced synchronously to whoever asked for a configuration change.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PublishError {
    #[error("threshold {value} outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("broker connection is not established")]
    NotConnected,

    #[error("invalid target device '{0}'")]
    InvalidTarget(String),

    #[error("transport rejected publish: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("failed to read certificate '{path}': {source}")]
    Certificate {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to subscribe: {0}")]
    Subscribe(#[from] rumqttc::ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    NotFound,
    BadRequest,
    Unavailable,
    BadGateway,
    Internal,
}

/// Error carried through warp rejections and rendered by `handle_rejection`.
#[derive(Debug)]
pub struct AppError {
    pub message: String,
    pub err_type: ErrorType,
}

impl AppError {
    pub fn new(message: &str, err_type: ErrorType) -> AppError {
        AppError {
            message: message.to_string(),
            err_type,
        }
    }

    pub fn to_http_status(&self) -> StatusCode {
        match self.err_type {
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorType::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorType::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Reject for AppError {}

impl From<PublishError> for AppError {
    fn from(err: PublishError) -> Self {
        let err_type = match err {
            PublishError::OutOfRange { .. } | PublishError::InvalidTarget(_) => {
                ErrorType::BadRequest
            }
            PublishError::NotConnected => ErrorType::Unavailable,
            PublishError::Transport(_) => ErrorType::BadGateway,
        };
        AppError::new(&err.to_string(), err_type)
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorMessage {
    pub code: u16,
    pub message: String,
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(app_err) = err.find::<AppError>() {
        (app_err.to_http_status(), app_err.message.clone())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid body: {}", e))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    };

    let json = warp::reply::json(&ErrorMessage {
        code: code.as_u16(),
        message,
    });

    Ok(warp::reply::with_status(json, code))
}
