use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use std::path::Path;

use crate::app_state::AppState;
use crate::models::api::SubmitResponse;
use crate::models::task::QueuedTask;
use crate::routes::error::ApiError;

/// Extensions accepted for the `image` field, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif", "tif", "tiff"];

/// POST /upscale — Submit an image for upscaling.
///
/// Validation happens before anything is enqueued; the image itself is only
/// decoded later by a worker.
pub async fn submit_upscale(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        validate_filename(&filename)?;

        let data = field.bytes().await?;
        upload = Some((filename, data));
        break;
    }

    let (filename, data) = upload.ok_or(ApiError::MissingImage)?;
    if data.is_empty() {
        return Err(ApiError::EmptyPayload);
    }
    if data.len() > state.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(state.max_upload_bytes));
    }

    let task = QueuedTask::new(filename, data);
    state.queue.enqueue(&task).await?;

    metrics::counter!("upscale_tasks_submitted_total").increment(1);
    if let Ok(depth) = state.queue.depth().await {
        metrics::gauge!("upscale_queue_depth").set(depth as f64);
    }

    tracing::info!(
        task_id = %task.task_id,
        filename = %task.filename,
        bytes = task.image.len(),
        "Upscale task enqueued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id: task.task_id,
        }),
    ))
}

fn validate_filename(filename: &str) -> Result<(), ApiError> {
    if filename.trim().is_empty() {
        return Err(ApiError::EmptyFilename);
    }

    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(ApiError::DisallowedExtension(filename.to_string()))
    }
}
