use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use crate::models::task::QueuedTask;

const QUEUE_KEY: &str = "upscale:tasks";
const PROCESSING_KEY_PREFIX: &str = "upscale:processing";

/// A dequeued payload together with the receipt needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub task: QueuedTask,
    receipt: String,
}

/// At-least-once delivery channel between the submission endpoint and workers.
///
/// A dequeued payload stays claimed by its consumer until [`TaskQueue::complete`]
/// is called. Claims abandoned by a crash are put back by
/// [`TaskQueue::recover_in_flight`], so a task may be delivered more than once.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task payload. Never waits for a worker.
    async fn enqueue(&self, task: &QueuedTask) -> Result<(), QueueError>;

    /// Claim the oldest pending payload, if any.
    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a delivery once its outcome is stored.
    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Give a claimed payload back without an outcome; it is the next one delivered.
    async fn release(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Return every claimed but unacknowledged payload to the pending queue.
    async fn recover_in_flight(&self) -> Result<usize, QueueError>;

    /// Number of payloads waiting for a worker.
    async fn depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis-backed task queue.
///
/// Pending payloads live in a list; `dequeue` moves one atomically into a
/// per-consumer processing list, which is what survives a worker crash.
pub struct RedisTaskQueue {
    client: redis::Client,
    processing_key: String,
}

impl RedisTaskQueue {
    pub fn new(redis_url: &str, consumer_id: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            processing_key: processing_key(consumer_id),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

fn processing_key(consumer_id: &str) -> String {
    format!("{}:{}", PROCESSING_KEY_PREFIX, consumer_id)
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, task: &QueuedTask) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(task).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, &self.processing_key)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => match serde_json::from_str::<QueuedTask>(&payload) {
                Ok(task) => Ok(Some(Delivery {
                    task,
                    receipt: payload,
                })),
                Err(e) => {
                    // Unparseable payloads can never produce an outcome; drop them
                    // from the processing list so recovery does not loop on them.
                    conn.lrem::<_, _, ()>(&self.processing_key, 1, &payload)
                        .await
                        .map_err(QueueError::Redis)?;
                    Err(QueueError::Serialize(e))
                }
            },
            None => Ok(None),
        }
    }

    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(&self.processing_key, 1, &delivery.receipt)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn release(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        // RPUSH puts it at the end RPOPLPUSH reads from.
        redis::pipe()
            .atomic()
            .lrem(&self.processing_key, 1, &delivery.receipt)
            .ignore()
            .rpush(QUEUE_KEY, &delivery.receipt)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut conn = self.connection().await?;
        let mut recovered = 0;
        loop {
            let moved: Option<String> = conn
                .rpoplpush(&self.processing_key, QUEUE_KEY)
                .await
                .map_err(QueueError::Redis)?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

/// Process-local task queue for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryTaskQueue {
    inner: Mutex<MemoryQueue>,
}

#[derive(Default)]
struct MemoryQueue {
    pending: VecDeque<QueuedTask>,
    in_flight: HashMap<String, QueuedTask>,
    next_receipt: u64,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of claimed, unacknowledged payloads.
    pub async fn in_flight(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: &QueuedTask) -> Result<(), QueueError> {
        self.inner.lock().await.pending.push_back(task.clone());
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        let mut queue = self.inner.lock().await;
        let Some(task) = queue.pending.pop_front() else {
            return Ok(None);
        };
        queue.next_receipt += 1;
        let receipt = queue.next_receipt.to_string();
        queue.in_flight.insert(receipt.clone(), task.clone());
        Ok(Some(Delivery { task, receipt }))
    }

    async fn complete(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.inner.lock().await.in_flight.remove(&delivery.receipt);
        Ok(())
    }

    async fn release(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut queue = self.inner.lock().await;
        if let Some(task) = queue.in_flight.remove(&delivery.receipt) {
            queue.pending.push_front(task);
        }
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut queue = self.inner.lock().await;
        let mut recovered: Vec<(u64, QueuedTask)> = queue
            .in_flight
            .drain()
            .map(|(receipt, task)| (receipt.parse().unwrap_or(0), task))
            .collect();
        // Oldest claim goes back to the head of the queue.
        recovered.sort_by_key(|(receipt, _)| *receipt);
        let count = recovered.len();
        for (_, task) in recovered.into_iter().rev() {
            queue.pending.push_front(task);
        }
        Ok(count)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.inner.lock().await.pending.len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
