use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::watch;

use upscale_service::{
    app_state::AppState,
    config::{AppConfig, Backend},
    routes,
    services::{
        upscaler::{ResampleUpscaler, Upscaler},
        worker::Worker,
    },
    telemetry,
};

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(backend = ?config.backend, "Initializing upscale-service server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    telemetry::describe_metrics();

    tracing::info!("Connecting task queue and result store");
    let state = AppState::from_config(&config).expect("Failed to initialize task backends");

    // A process-local queue is invisible to standalone workers, so run them here.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();
    if config.backend == Backend::Memory {
        let upscaler = ResampleUpscaler::new(config.upscale_filter, config.upscale_scale)
            .expect("Failed to initialize upscaler");
        tracing::info!(
            concurrency = config.worker_concurrency,
            filter = %upscaler.filter(),
            scale = upscaler.scale(),
            "Running worker pool in-process"
        );
        let worker = Worker::new(
            state.queue.clone(),
            state.store.clone(),
            Arc::new(upscaler),
            config.worker_settings(),
        );
        workers = worker.spawn_pool(config.worker_concurrency, shutdown_rx);
    }

    let app = routes::router(state).merge(routes::metrics::metrics_router(prometheus_handle));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "Worker task ended abnormally");
        }
    }
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
