use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::api::ErrorBody;
use crate::models::task::TaskId;
use crate::services::{queue::QueueError, store::StoreError};

/// Errors surfaced synchronously by the HTTP endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image field")]
    MissingImage,

    #[error("No selected file")]
    EmptyFilename,

    #[error("File extension not allowed: {0}")]
    DisallowedExtension(String),

    #[error("Uploaded image is empty")]
    EmptyPayload,

    #[error("Uploaded image exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Malformed task id: {0}")]
    InvalidTaskId(String),

    #[error("Task not finished")]
    NotReady,

    #[error("Invalid multipart request: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Task queue unavailable")]
    Queue(#[from] QueueError),

    #[error("Task store unavailable")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingImage
            | ApiError::EmptyFilename
            | ApiError::DisallowedExtension(_)
            | ApiError::EmptyPayload
            | ApiError::InvalidTaskId(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotReady => StatusCode::NOT_FOUND,
            // Body limit overruns surface here as 413.
            ApiError::Multipart(e) => e.status(),
            ApiError::Queue(_) | ApiError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Queue(e) => tracing::error!(error = %e, "Task queue request failed"),
            ApiError::Store(e) => tracing::error!(error = %e, "Task store request failed"),
            _ => tracing::debug!(error = %self, status = status.as_u16(), "Rejected request"),
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Ids are minted as UUIDs at submission, so text that is not a UUID can never
/// name a task and is a client error. Well-formed unknown ids still read as pending.
pub fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::InvalidTaskId(raw.to_string()))
}
