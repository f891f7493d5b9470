//! Error type returned by every handler.
//!
//! Validation failures carry a stable message key for the client. Internal
//! failures are logged in full but only a short message reaches the caller.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::params::ErrorResponse;
use crate::pipeline::PipelineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Pipeline(e) => match e.message_key() {
                Some(key) => (StatusCode::BAD_REQUEST, key.to_owned()),
                None => {
                    error!(error = ?e, "Conversion pipeline failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, e.public_message())
                }
            },
            ApiError::Multipart(e) => {
                let status = e.status();
                warn!(%status, error = %e, "Rejected multipart body");
                let key = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "payload_too_large"
                } else {
                    "invalid_upload"
                };
                (status, key.to_owned())
            }
            ApiError::Internal(m) => {
                error!(message = %m, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error".to_owned(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_message();
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("conversion task failed: {e}"))
    }
}

impl From<tokio::sync::AcquireError> for ApiError {
    fn from(e: tokio::sync::AcquireError) -> Self {
        ApiError::Internal(format!("conversion permits closed: {e}"))
    }
}
