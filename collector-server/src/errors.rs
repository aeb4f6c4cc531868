use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use std::fmt;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_IMPLEMENTED, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));
        (self.status, body).into_response()
    }
}

/// Maps the orchestrator's typed errors onto the HTTP status vocabulary
/// from §7: input errors are `400`, state conflicts `409`, transient
/// remote failures surface as `502` (the run itself already retried),
/// and fatal errors as `500`.
impl From<collector_core::CollectorError> for AppError {
    fn from(err: collector_core::CollectorError) -> Self {
        use collector_core::CollectorError;
        match err {
            CollectorError::Input(msg) => Self::bad_request(msg),
            CollectorError::StateConflict(msg) => Self::conflict(msg),
            CollectorError::TransientRemote(msg) => Self::new(StatusCode::BAD_GATEWAY, msg),
            CollectorError::Remote(msg) => Self::new(StatusCode::BAD_GATEWAY, msg),
            CollectorError::Parse(msg) => Self::bad_request(msg),
            CollectorError::Fatal(msg) => Self::internal(msg),
        }
    }
}
