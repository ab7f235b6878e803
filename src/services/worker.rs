use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::models::task::{TaskId, TaskOutcome};
use crate::services::processor::run_processing;
use crate::services::queue::{Delivery, QueueError, TaskQueue};
use crate::services::store::{StoreError, TaskStore, WriteOutcome};
use crate::services::upscaler::Upscaler;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Sleep between polls when the queue is empty or unreachable.
    pub poll_interval: Duration,
    /// Optional processing deadline. `None` waits for the upscaler indefinitely.
    pub task_timeout: Option<Duration>,
    /// First backoff between outcome writes; doubles on each further attempt.
    pub store_retry_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            task_timeout: None,
            store_retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Outcome writes attempted before the delivery is handed back to the queue.
const STORE_WRITE_ATTEMPTS: u32 = 3;

/// Pulls task payloads off the queue and records exactly one outcome per task.
#[derive(Clone)]
pub struct Worker {
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn TaskStore>,
    upscaler: Arc<dyn Upscaler>,
    settings: WorkerSettings,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn TaskStore>,
        upscaler: Arc<dyn Upscaler>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            store,
            upscaler,
            settings,
        }
    }

    /// Process the next task from the queue.
    /// Returns Ok(true) if a task was handled, Ok(false) if the queue was empty.
    ///
    /// The delivery is acknowledged only after its outcome is stored. When the
    /// store stays unreachable the delivery is released back to the queue, so
    /// another loop picks it up once the store recovers.
    pub async fn process_next(&self) -> Result<bool, WorkerError> {
        let delivery = match self.queue.dequeue().await? {
            Some(d) => d,
            None => return Ok(false),
        };
        let task = &delivery.task;

        // Redelivered after a crash that happened between the store write and the ack.
        let existing = match self.store.get(&task.task_id).await {
            Ok(record) => record,
            Err(e) => {
                self.release(&delivery).await;
                return Err(e.into());
            }
        };
        if existing.state.is_terminal() {
            tracing::info!(
                task_id = %task.task_id,
                state = %existing.state,
                "Task already has a terminal outcome, skipping redelivery"
            );
            self.queue.complete(&delivery).await?;
            return Ok(true);
        }

        tracing::info!(
            task_id = %task.task_id,
            filename = %task.filename,
            bytes = task.image.len(),
            "Processing upscale task"
        );

        let start = Instant::now();
        let outcome = run_processing(
            self.upscaler.clone(),
            task.image.clone(),
            self.settings.task_timeout,
        )
        .await;
        let elapsed = start.elapsed();

        metrics::histogram!("upscale_processing_seconds").record(elapsed.as_secs_f64());
        record_outcome(&task.task_id.to_string(), &outcome, elapsed);

        match self.store_outcome(&task.task_id, outcome).await {
            Ok(WriteOutcome::Written) => {}
            Ok(WriteOutcome::AlreadyTerminal) => {
                tracing::warn!(
                    task_id = %task.task_id,
                    "Another delivery stored an outcome first, keeping the existing one"
                );
            }
            Err(e) => {
                self.release(&delivery).await;
                return Err(e.into());
            }
        }

        self.queue.complete(&delivery).await?;
        Ok(true)
    }

    /// Write the outcome, retrying transient store failures with doubling backoff.
    async fn store_outcome(
        &self,
        task_id: &TaskId,
        outcome: TaskOutcome,
    ) -> Result<WriteOutcome, StoreError> {
        let mut backoff = self.settings.store_retry_backoff;
        let mut attempt = 1;
        loop {
            match self.store.set_result(task_id, outcome.clone()).await {
                Ok(written) => return Ok(written),
                Err(e) if attempt < STORE_WRITE_ATTEMPTS => {
                    tracing::warn!(
                        task_id = %task_id,
                        attempt,
                        error = %e,
                        "Failed to store task outcome, retrying"
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Hand an unfinished delivery back to the queue. A failed release leaves
    /// the claim for `recover_in_flight`.
    async fn release(&self, delivery: &Delivery) {
        match self.queue.release(delivery).await {
            Ok(()) => {
                tracing::warn!(
                    task_id = %delivery.task.task_id,
                    "Released task back to the queue"
                );
            }
            Err(e) => {
                tracing::error!(
                    task_id = %delivery.task.task_id,
                    error = %e,
                    "Failed to release task, it stays claimed until recovery"
                );
            }
        }
    }

    /// Main processing loop. Returns once `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_next().await {
                Ok(true) => {
                    tracing::debug!("Task processed, checking for next task");
                }
                Ok(false) => {
                    tracing::trace!("No tasks available, sleeping");
                    if self.pause(&mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Error processing task, will retry");
                    if self.pause(&mut shutdown).await {
                        break;
                    }
                }
            }
        }
        tracing::info!("Worker loop stopped");
    }

    /// Spawn `concurrency` processing loops sharing this worker's handles.
    pub fn spawn_pool(
        &self,
        concurrency: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        (0..concurrency.max(1))
            .map(|_| tokio::spawn(self.clone().run(shutdown.clone())))
            .collect()
    }

    /// Sleep for the poll interval. Returns true if shutdown was requested meanwhile.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = sleep(self.settings.poll_interval) => false,
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }
}

fn record_outcome(task_id: &str, outcome: &TaskOutcome, elapsed: Duration) {
    match outcome {
        TaskOutcome::Success { image } => {
            metrics::counter!("upscale_tasks_completed_total").increment(1);
            tracing::info!(
                task_id = %task_id,
                output_bytes = image.len(),
                duration_ms = elapsed.as_millis() as u64,
                "Task completed successfully"
            );
        }
        failure => {
            metrics::counter!("upscale_tasks_failed_total", "reason" => failure.kind())
                .increment(1);
            tracing::warn!(
                task_id = %task_id,
                reason = failure.kind(),
                error = %failure.error_message().unwrap_or_default(),
                duration_ms = elapsed.as_millis() as u64,
                "Task failed"
            );
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
