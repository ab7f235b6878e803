use std::sync::Arc;

use crate::config::{AppConfig, Backend};
use crate::services::{
    queue::{InMemoryTaskQueue, QueueError, RedisTaskQueue, TaskQueue},
    store::{InMemoryTaskStore, RedisTaskStore, StoreError, TaskStore},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn TaskQueue>,
    pub store: Arc<dyn TaskStore>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(queue: Arc<dyn TaskQueue>, store: Arc<dyn TaskStore>, max_upload_bytes: usize) -> Self {
        Self {
            queue,
            store,
            max_upload_bytes,
        }
    }

    /// Connect the queue and store selected by `config.backend`.
    pub fn from_config(config: &AppConfig) -> Result<Self, BackendError> {
        let (queue, store): (Arc<dyn TaskQueue>, Arc<dyn TaskStore>) = match config.backend {
            Backend::Redis => (
                Arc::new(RedisTaskQueue::new(&config.broker_url, &config.worker_id)?),
                Arc::new(RedisTaskStore::new(
                    &config.result_backend_url,
                    config.result_ttl_secs,
                )?),
            ),
            Backend::Memory => (
                Arc::new(InMemoryTaskQueue::new()),
                Arc::new(InMemoryTaskStore::new()),
            ),
        };
        Ok(Self::new(queue, store, config.max_upload_bytes))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Failed to initialize task queue: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to initialize task store: {0}")]
    Store(#[from] StoreError),
}
