use tracing_subscriber::EnvFilter;

/// Initialize structured JSON logging, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// Register application metrics with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_histogram!(
        "upscale_processing_seconds",
        "Time to decode, upscale and encode one image"
    );
    metrics::describe_counter!(
        "upscale_tasks_submitted_total",
        "Total upscale tasks accepted"
    );
    metrics::describe_counter!(
        "upscale_tasks_completed_total",
        "Total upscale tasks that succeeded"
    );
    metrics::describe_counter!(
        "upscale_tasks_failed_total",
        "Total upscale tasks that reached a failure state"
    );
    metrics::describe_gauge!(
        "upscale_queue_depth",
        "Current number of tasks waiting for a worker"
    );
}
