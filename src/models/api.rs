use serde::{Deserialize, Serialize};

use crate::models::task::{TaskId, TaskState};

/// Response after submitting an image for upscaling.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
}

/// Response for querying task status.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: TaskId,
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
