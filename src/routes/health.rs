use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize, Deserialize)]
pub struct HealthChecks {
    pub queue: ComponentHealth,
    pub store: ComponentHealth,
}

#[derive(Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn from_check<E>(result: Result<(), E>, started: std::time::Instant) -> Self {
        match result {
            Ok(()) => ComponentHealth {
                status: "ok".to_string(),
                latency_ms: Some(started.elapsed().as_millis() as u64),
            },
            Err(_) => ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
            },
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health — health check with queue and store status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let queue_start = std::time::Instant::now();
    let queue_check = ComponentHealth::from_check(state.queue.health_check().await, queue_start);

    let store_start = std::time::Instant::now();
    let store_check = ComponentHealth::from_check(state.store.health_check().await, store_start);

    if let Ok(depth) = state.queue.depth().await {
        metrics::gauge!("upscale_queue_depth").set(depth as f64);
    }

    let all_healthy = queue_check.is_ok() && store_check.is_ok();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            queue: queue_check,
            store: store_check,
        },
    };

    (status_code, Json(response))
}
