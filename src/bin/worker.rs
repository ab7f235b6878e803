use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::watch;

use upscale_service::{
    app_state::AppState,
    config::{AppConfig, Backend},
    services::{
        upscaler::{ResampleUpscaler, Upscaler},
        worker::Worker,
    },
    telemetry,
};

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    tracing::info!("Starting upscale worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    if config.backend == Backend::Memory {
        tracing::error!("BACKEND=memory is process-local; the server runs its own workers");
        std::process::exit(1);
    }

    // Workers have no HTTP router, so the exporter serves its own scrape listener.
    let metrics_addr = config
        .metrics_socket_addr()
        .expect("METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus metrics exporter");
    telemetry::describe_metrics();
    tracing::info!(%metrics_addr, "Metrics exporter listening");

    tracing::info!(
        broker = %config.broker_url,
        result_backend = %config.result_backend_url,
        "Connecting to Redis"
    );
    let state = AppState::from_config(&config).expect("Failed to initialize task backends");

    // Loaded once and shared by every task this process handles.
    let upscaler = ResampleUpscaler::new(config.upscale_filter, config.upscale_scale)
        .expect("Failed to initialize upscaler");
    tracing::info!(
        filter = %upscaler.filter(),
        scale = upscaler.scale(),
        "Upscaler ready"
    );

    // Payloads this worker claimed before a crash go back on the queue.
    match state.queue.recover_in_flight().await {
        Ok(0) => {}
        Ok(recovered) => {
            tracing::warn!(
                worker_id = %config.worker_id,
                recovered,
                "Re-queued tasks left in flight by a previous run"
            )
        }
        Err(e) => tracing::error!(error = %e, "Failed to recover in-flight tasks"),
    }

    let worker = Worker::new(
        state.queue.clone(),
        state.store.clone(),
        Arc::new(upscaler),
        config.worker_settings(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = worker.spawn_pool(config.worker_concurrency, shutdown_rx);

    tracing::info!(
        worker_id = %config.worker_id,
        concurrency = config.worker_concurrency,
        "Worker ready, starting task processing loop"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    // In-progress tasks finish and are stored before the loops exit.
    tracing::info!("Shutting down worker");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker loop ended abnormally");
        }
    }
}
