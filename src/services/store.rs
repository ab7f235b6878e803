use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::task::{TaskId, TaskOutcome, TaskRecord};

const TASK_KEY_PREFIX: &str = "upscale:task";

/// Result of a [`TaskStore::set_result`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// A terminal outcome was already recorded; the new one was discarded.
    AlreadyTerminal,
}

/// Keyed record of task outcomes, independent of the queue.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Look up a task. Ids with no stored outcome, including ids never
    /// submitted, are reported as pending.
    async fn get(&self, id: &TaskId) -> Result<TaskRecord, StoreError>;

    /// Record the terminal outcome of a task. The first write wins.
    async fn set_result(&self, id: &TaskId, outcome: TaskOutcome)
        -> Result<WriteOutcome, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Document persisted per completed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTask {
    outcome: TaskOutcome,
    completed_at: DateTime<Utc>,
}

impl StoredTask {
    fn into_record(self, id: TaskId) -> TaskRecord {
        TaskRecord::completed(id, self.outcome, self.completed_at)
    }
}

/// Redis-backed result store. Each outcome expires after the retention TTL.
pub struct RedisTaskStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisTaskStore {
    pub fn new(redis_url: &str, ttl_secs: u64) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(StoreError::Redis)?;
        Ok(Self { client, ttl_secs })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(StoreError::Redis)
    }
}

fn task_key(id: &TaskId) -> String {
    format!("{}:{}", TASK_KEY_PREFIX, id)
}

#[async_trait]
impl TaskStore for RedisTaskStore {
    async fn get(&self, id: &TaskId) -> Result<TaskRecord, StoreError> {
        let mut conn = self.connection().await?;
        let stored: Option<String> = conn.get(task_key(id)).await.map_err(StoreError::Redis)?;

        match stored {
            Some(json) => {
                let stored: StoredTask =
                    serde_json::from_str(&json).map_err(StoreError::Serialize)?;
                Ok(stored.into_record(*id))
            }
            None => Ok(TaskRecord::pending(*id)),
        }
    }

    async fn set_result(
        &self,
        id: &TaskId,
        outcome: TaskOutcome,
    ) -> Result<WriteOutcome, StoreError> {
        let mut conn = self.connection().await?;
        let document = serde_json::to_string(&StoredTask {
            outcome,
            completed_at: Utc::now(),
        })
        .map_err(StoreError::Serialize)?;

        // SET NX returns nil when the key already exists.
        let written: Option<String> = redis::cmd("SET")
            .arg(task_key(id))
            .arg(document)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::Redis)?;

        Ok(match written {
            Some(_) => WriteOutcome::Written,
            None => WriteOutcome::AlreadyTerminal,
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(StoreError::Redis)?;
        Ok(())
    }
}

/// Process-local result store. Outcomes are kept for the life of the process.
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, StoredTask>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get(&self, id: &TaskId) -> Result<TaskRecord, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(match tasks.get(id) {
            Some(stored) => stored.clone().into_record(*id),
            None => TaskRecord::pending(*id),
        })
    }

    async fn set_result(
        &self,
        id: &TaskId,
        outcome: TaskOutcome,
    ) -> Result<WriteOutcome, StoreError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(id) {
            return Ok(WriteOutcome::AlreadyTerminal);
        }
        tasks.insert(
            *id,
            StoredTask {
                outcome,
                completed_at: Utc::now(),
            },
        );
        Ok(WriteOutcome::Written)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
