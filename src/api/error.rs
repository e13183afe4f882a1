use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Engine error: {0}")]
    EngineError(#[from] crate::engine::EngineError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<crate::config::ConfigError> for ApiError {
    fn from(err: crate::config::ConfigError) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code) = match self {
            ApiError::EngineError(e @ crate::engine::EngineError::AlreadyRunning(_)) => {
                (StatusCode::CONFLICT, e.to_string(), "ALREADY_RUNNING")
            }
            ApiError::EngineError(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "ENGINE_ERROR")
            }
            ApiError::InvalidRequest(e) => (StatusCode::BAD_REQUEST, e, "INVALID_REQUEST"),
        };

        let body = Json(json!({
            "error": error_message,
            "code": error_code,
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
