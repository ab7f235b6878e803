use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque task identifier, shared by the queue, the store and both polling endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Coarse task state exposed to clients.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Success,
    Failure,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskState::Pending)
    }
}

/// Terminal outcome written by a worker, exactly one per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Upscaled image, PNG encoded.
    Success {
        #[serde(with = "base64_bytes")]
        image: Bytes,
    },
    /// The submitted payload could not be decoded as an image.
    InvalidInput { reason: String },
    /// Decoding succeeded but upscaling or re-encoding did not.
    TransformError { reason: String },
    /// Processing exceeded the configured deadline.
    TimedOut { after_secs: u64 },
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Success { .. } => TaskState::Success,
            _ => TaskState::Failure,
        }
    }

    /// Short label used for logs and the `reason` metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskOutcome::Success { .. } => "success",
            TaskOutcome::InvalidInput { .. } => "invalid_input",
            TaskOutcome::TransformError { .. } => "transform_error",
            TaskOutcome::TimedOut { .. } => "timed_out",
        }
    }

    /// Client-facing failure message, `None` for success.
    pub fn error_message(&self) -> Option<String> {
        match self {
            TaskOutcome::Success { .. } => None,
            TaskOutcome::InvalidInput { reason } => Some(format!("Invalid input: {}", reason)),
            TaskOutcome::TransformError { reason } => {
                Some(format!("Processing failed: {}", reason))
            }
            TaskOutcome::TimedOut { after_secs } => Some(format!(
                "Processing exceeded the {}s deadline",
                after_secs
            )),
        }
    }
}

/// Current view of a task as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: TaskId,
    pub state: TaskState,
    pub outcome: Option<TaskOutcome>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Record reported for tasks with no stored outcome, known or not.
    pub fn pending(id: TaskId) -> Self {
        Self {
            id,
            state: TaskState::Pending,
            outcome: None,
            completed_at: None,
        }
    }

    pub fn completed(id: TaskId, outcome: TaskOutcome, completed_at: DateTime<Utc>) -> Self {
        Self {
            id,
            state: outcome.state(),
            outcome: Some(outcome),
            completed_at: Some(completed_at),
        }
    }

    /// Result bytes, present only once the task has succeeded.
    pub fn result_image(&self) -> Option<&Bytes> {
        match &self.outcome {
            Some(TaskOutcome::Success { image }) => Some(image),
            _ => None,
        }
    }
}

/// Task payload serialized onto the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task_id: TaskId,
    pub filename: String,
    #[serde(with = "base64_bytes")]
    pub image: Bytes,
    pub submitted_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(filename: impl Into<String>, image: Bytes) -> Self {
        Self {
            task_id: TaskId::new(),
            filename: filename.into(),
            image,
            submitted_at: Utc::now(),
        }
    }
}

/// Binary payloads travel as base64 inside JSON documents.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
