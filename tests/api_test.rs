//! In-process API tests over the memory backends.
//!
//! The router is driven with `tower::ServiceExt::oneshot`; the worker is
//! stepped explicitly with `process_next` so every PENDING window is observable.

mod helpers;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::GenericImageView;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use helpers::{multipart_body, sample_png};
use upscale_service::app_state::AppState;
use upscale_service::models::api::{ErrorBody, SubmitResponse, TaskStatusResponse};
use upscale_service::models::task::{QueuedTask, TaskId, TaskOutcome, TaskRecord, TaskState};
use upscale_service::routes;
use upscale_service::services::queue::{Delivery, InMemoryTaskQueue, QueueError, TaskQueue};
use upscale_service::services::store::{InMemoryTaskStore, StoreError, TaskStore, WriteOutcome};
use upscale_service::services::upscaler::{ResampleFilter, ResampleUpscaler};
use upscale_service::services::worker::{Worker, WorkerSettings};

const MAX_UPLOAD: usize = 1024 * 1024;

struct TestApp {
    router: Router,
    queue: Arc<InMemoryTaskQueue>,
    worker: Worker,
}

fn test_app() -> TestApp {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let store = Arc::new(InMemoryTaskStore::new());
    let state = AppState::new(queue.clone(), store.clone(), MAX_UPLOAD);
    let upscaler = ResampleUpscaler::new(ResampleFilter::Lanczos3, 2).unwrap();
    let worker = Worker::new(
        queue.clone(),
        store,
        Arc::new(upscaler),
        WorkerSettings {
            poll_interval: Duration::from_millis(10),
            task_timeout: None,
            store_retry_backoff: Duration::from_millis(1),
        },
    );

    TestApp {
        router: routes::router(state),
        queue,
        worker,
    }
}

fn redis_down() -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"))
}

/// Queue whose broker is unreachable.
struct UnreachableQueue;

#[async_trait]
impl TaskQueue for UnreachableQueue {
    async fn enqueue(&self, _task: &QueuedTask) -> Result<(), QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn dequeue(&self) -> Result<Option<Delivery>, QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn complete(&self, _delivery: &Delivery) -> Result<(), QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn release(&self, _delivery: &Delivery) -> Result<(), QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Err(QueueError::Redis(redis_down()))
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Err(QueueError::Redis(redis_down()))
    }
}

/// Store whose result backend is unreachable.
struct UnreachableStore;

#[async_trait]
impl TaskStore for UnreachableStore {
    async fn get(&self, _id: &TaskId) -> Result<TaskRecord, StoreError> {
        Err(StoreError::Redis(redis_down()))
    }

    async fn set_result(
        &self,
        _id: &TaskId,
        _outcome: TaskOutcome,
    ) -> Result<WriteOutcome, StoreError> {
        Err(StoreError::Redis(redis_down()))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Err(StoreError::Redis(redis_down()))
    }
}

fn unreachable_app() -> Router {
    let state = AppState::new(
        Arc::new(UnreachableQueue),
        Arc::new(UnreachableStore),
        MAX_UPLOAD,
    );
    routes::router(state)
}

struct TestResponse {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Response body is not the expected JSON")
    }
}

async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

async fn submit(router: &Router, field: &str, filename: &str, data: &[u8]) -> TestResponse {
    let (content_type, body) = multipart_body(field, filename, data);
    let request = Request::post("/upscale")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap();
    send(router, request).await
}

async fn get(router: &Router, uri: &str) -> TestResponse {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

#[tokio::test]
async fn test_submitted_task_is_pending_until_processed() {
    let app = test_app();

    let response = submit(&app.router, "image", "cat.png", &sample_png(4, 4)).await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    let task_id = response.json::<SubmitResponse>().task_id;

    let status = get(&app.router, &format!("/tasks/{}", task_id)).await;
    assert_eq!(status.status, StatusCode::OK);
    let body = status.json::<TaskStatusResponse>();
    assert_eq!(body.task_id, task_id);
    assert_eq!(body.status, TaskState::Pending);
    assert!(body.file_url.is_none());

    assert_eq!(app.queue.depth().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_task_is_pending() {
    let app = test_app();

    let response = get(&app.router, &format!("/tasks/{}", TaskId::new())).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json::<TaskStatusResponse>().status,
        TaskState::Pending
    );
}

#[tokio::test]
async fn test_malformed_task_id_is_rejected() {
    let app = test_app();

    for uri in ["/tasks/invalid_id", "/processed/invalid_id"] {
        let response = get(&app.router, uri).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(response.json::<ErrorBody>().error.contains("invalid_id"));
    }
}

#[tokio::test]
async fn test_missing_image_field_creates_no_task() {
    let app = test_app();

    let response = submit(&app.router, "photo", "cat.png", &sample_png(2, 2)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<ErrorBody>().error, "No image field");
    assert_eq!(app.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_uploads_are_rejected_before_enqueue() {
    let app = test_app();

    let empty_name = submit(&app.router, "image", "", &sample_png(2, 2)).await;
    assert_eq!(empty_name.status, StatusCode::BAD_REQUEST);

    let bad_extension = submit(&app.router, "image", "notes.txt", b"hello").await;
    assert_eq!(bad_extension.status, StatusCode::BAD_REQUEST);
    assert!(bad_extension
        .json::<ErrorBody>()
        .error
        .contains("notes.txt"));

    let empty_payload = submit(&app.router, "image", "cat.png", b"").await;
    assert_eq!(empty_payload.status, StatusCode::BAD_REQUEST);

    assert_eq!(app.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let app = test_app();

    let response = submit(&app.router, "image", "big.png", &vec![0u8; MAX_UPLOAD + 1]).await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.queue.depth().await.unwrap(), 0);

    let far_over = submit(&app.router, "image", "big.png", &vec![0u8; 2 * MAX_UPLOAD]).await;
    assert_eq!(far_over.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_upload_of_exactly_max_size_is_accepted() {
    let app = test_app();

    // Multipart framing pushes the request body past the image ceiling.
    let response = submit(&app.router, "image", "big.png", &vec![0u8; MAX_UPLOAD]).await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(app.queue.depth().await.unwrap(), 1);
}

#[tokio::test]
async fn test_result_is_not_found_until_success() {
    let app = test_app();

    let response = submit(&app.router, "image", "cat.png", &sample_png(4, 4)).await;
    let task_id = response.json::<SubmitResponse>().task_id;

    let early = get(&app.router, &format!("/processed/{}", task_id)).await;
    assert_eq!(early.status, StatusCode::NOT_FOUND);
    assert_eq!(early.json::<ErrorBody>().error, "Task not finished");

    let unknown = get(&app.router, &format!("/processed/{}", TaskId::new())).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_valid_image_flows_to_downloadable_upscaled_png() {
    let app = test_app();

    let response = submit(&app.router, "image", "lama.png", &sample_png(6, 5)).await;
    let task_id = response.json::<SubmitResponse>().task_id;

    assert!(app.worker.process_next().await.unwrap());

    let status = get(&app.router, &format!("/tasks/{}", task_id)).await;
    assert_eq!(status.status, StatusCode::OK);
    let body = status.json::<TaskStatusResponse>();
    assert_eq!(body.status, TaskState::Success);
    let file_url = body.file_url.expect("Success must carry a file_url");
    assert_eq!(file_url, format!("/processed/{}", task_id));

    let download = get(&app.router, &file_url).await;
    assert_eq!(download.status, StatusCode::OK);
    assert_eq!(download.headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        download.headers[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{}.png\"", task_id).as_str()
    );

    let image = image::load_from_memory(&download.body).unwrap();
    assert_eq!(image.dimensions(), (12, 10));

    let again = get(&app.router, &file_url).await;
    assert_eq!(again.body, download.body);
}

#[tokio::test]
async fn test_garbage_payload_reports_invalid_input() {
    let app = test_app();

    let response = submit(&app.router, "image", "garbage.png", b"\x01\x02\x03").await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    let task_id = response.json::<SubmitResponse>().task_id;

    app.worker.process_next().await.unwrap();

    let status = get(&app.router, &format!("/tasks/{}", task_id)).await;
    assert_eq!(status.status, StatusCode::BAD_REQUEST);
    let body = status.json::<TaskStatusResponse>();
    assert_eq!(body.status, TaskState::Failure);
    assert!(body.file_url.is_none());
    assert!(body.error.is_some());

    let download = get(&app.router, &format!("/processed/{}", task_id)).await;
    assert_eq!(download.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_concurrent_downloads_return_identical_bytes() {
    let app = test_app();

    let response = submit(&app.router, "image", "cat.jpeg", &sample_png(3, 3)).await;
    let task_id = response.json::<SubmitResponse>().task_id;
    app.worker.process_next().await.unwrap();

    let uri = format!("/processed/{}", task_id);
    let (first, second) = futures::join!(get(&app.router, &uri), get(&app.router, &uri));

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(first.body, second.body);
    // Reads never trigger another round of processing.
    assert!(!app.worker.process_next().await.unwrap());
}

#[tokio::test]
async fn test_health_reports_ok_for_memory_backends() {
    let app = test_app();

    let response = get(&app.router, "/health").await;
    assert_eq!(response.status, StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["queue"]["status"], "ok");
    assert_eq!(body["checks"]["store"]["status"], "ok");
}

#[tokio::test]
async fn test_unreachable_store_reports_service_unavailable() {
    let router = unreachable_app();
    let task_id = TaskId::new();

    for uri in [
        format!("/tasks/{}", task_id),
        format!("/processed/{}", task_id),
    ] {
        let response = get(&router, &uri).await;
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        assert_eq!(response.json::<ErrorBody>().error, "Task store unavailable");
    }
}

#[tokio::test]
async fn test_unreachable_queue_rejects_submission() {
    let router = unreachable_app();

    let response = submit(&router, "image", "cat.png", &sample_png(2, 2)).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<ErrorBody>().error, "Task queue unavailable");
}

#[tokio::test]
async fn test_health_reports_unavailable_backends() {
    let router = unreachable_app();

    let response = get(&router, "/health").await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["checks"]["queue"]["status"], "error");
    assert_eq!(body["checks"]["store"]["status"], "error");
}
