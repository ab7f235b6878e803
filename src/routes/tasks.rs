use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::TaskStatusResponse;
use crate::models::task::{TaskOutcome, TaskRecord};
use crate::routes::error::{parse_task_id, ApiError};

/// GET /tasks/:task_id — Check upscale task status.
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<(StatusCode, Json<TaskStatusResponse>), ApiError> {
    let task_id = parse_task_id(&task_id)?;
    let record = state.store.get(&task_id).await?;
    let (status, body) = status_response(&record);
    Ok((status, Json(body)))
}

/// Map a stored record to its HTTP status and body.
///
/// Undecodable input is the submitter's fault and reported as 400; every other
/// outcome, failures included, is a successful status lookup.
pub fn status_response(record: &TaskRecord) -> (StatusCode, TaskStatusResponse) {
    let mut body = TaskStatusResponse {
        task_id: record.id,
        status: record.state,
        file_url: None,
        error: None,
    };

    let status = match &record.outcome {
        None => StatusCode::OK,
        Some(TaskOutcome::Success { .. }) => {
            body.file_url = Some(format!("/processed/{}", record.id));
            StatusCode::OK
        }
        Some(outcome @ TaskOutcome::InvalidInput { .. }) => {
            body.error = outcome.error_message();
            StatusCode::BAD_REQUEST
        }
        Some(outcome @ (TaskOutcome::TransformError { .. } | TaskOutcome::TimedOut { .. })) => {
            body.error = outcome.error_message();
            StatusCode::OK
        }
    };

    (status, body)
}
