use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::app_state::AppState;
use crate::routes::error::{parse_task_id, ApiError};

/// GET /processed/:task_id — Download the upscaled PNG.
///
/// Reads never consume the result; every call returns the same bytes until
/// the store's retention expires.
pub async fn download_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let record = state.store.get(&task_id).await?;
    let image = record.result_image().cloned().ok_or(ApiError::NotReady)?;

    tracing::debug!(task_id = %task_id, bytes = image.len(), "Serving processed image");

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.png\"", task_id),
            ),
        ],
        image,
    )
        .into_response())
}
