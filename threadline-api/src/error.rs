use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use threadline_common::ThreadlineError;

pub const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub message: String,
}

impl From<ThreadlineError> for ApiError {
    fn from(err: ThreadlineError) -> Self {
        match err {
            ThreadlineError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            ThreadlineError::InvalidInput(msg) => ApiError::BadRequest(msg),
            unavailable @ (ThreadlineError::Transport(_) | ThreadlineError::Timeout) => {
                ApiError::Unavailable(unavailable.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(detail) => {
                tracing::warn!(%detail, "api.storage.unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage unavailable".to_string(),
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "api.internal_error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_MESSAGE.to_string(),
                )
            }
        };

        (status, Json(ErrorBody { message })).into_response()
    }
}
