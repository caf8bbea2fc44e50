//! API errors and their JSON responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use indexer_storage::StorageError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors returned by the read API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested entry is not stored.
    #[error("not found: {0}")]
    NotFound(String),
    /// A path parameter could not be parsed.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Storage failed to answer.
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", what),
            Self::BadRequest(why) => (StatusCode::BAD_REQUEST, "bad_request", why),
            Self::Storage(err) => {
                error!(target: "api", %err, "Storage query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "A storage error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error, message })).into_response()
    }
}
