//! Router tests against in-memory collaborators.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use reel_api::{create_router, ApiConfig, AppState};
use reel_firestore::{InMemoryJobStatusStore, JobStatusStore};
use reel_models::{JobId, JobPhase};
use reel_render::{RenderMode, RenderOutcome, RenderRequest, Renderer, RendererConfig};
use reel_storage::{ArtifactStore, StorageError, StorageResult, StoreEntry};
use reel_worker::{AdmissionController, JobOrchestrator, StatusReporter, WorkerConfig};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn upload_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<()> {
        let bytes = std::fs::read(path)?;
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<StoreEntry>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, bytes)| StoreEntry::File {
                key: key.clone(),
                size: bytes.len() as u64,
            })
            .collect())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/{}", key)
    }
}

struct StubRenderer {
    crash: bool,
}

#[async_trait]
impl Renderer for StubRenderer {
    async fn render(&self, request: &RenderRequest) -> RenderOutcome {
        if self.crash {
            panic!("renderer crashed");
        }
        match request.mode {
            RenderMode::Movie => match std::fs::write(&request.desired_output, b"mp4") {
                Ok(()) => RenderOutcome::Success {
                    artifact: request.desired_output.clone(),
                },
                Err(e) => RenderOutcome::failure(e.to_string()),
            },
            _ => RenderOutcome::failure("preview rendering is not stubbed"),
        }
    }
}

struct TestApp {
    _root: tempfile::TempDir,
    router: Router,
    admission: AdmissionController,
    statuses: Arc<InMemoryJobStatusStore>,
}

fn app(crash: bool) -> TestApp {
    let root = tempfile::TempDir::new().unwrap();
    let config = WorkerConfig::new(RendererConfig::new(root.path()));
    let statuses = Arc::new(InMemoryJobStatusStore::new());
    let orchestrator = JobOrchestrator::new(
        config,
        Arc::new(MemoryStore::default()),
        Arc::new(StubRenderer { crash }),
        StatusReporter::new(statuses.clone(), None),
    );
    let admission = AdmissionController::new(1);
    let state = AppState::from_parts(ApiConfig::default(), Arc::new(orchestrator), admission.clone());

    TestApp {
        _root: root,
        router: create_router(state, None),
        admission,
        statuses,
    }
}

fn envelope(event_type: &str, job_id: &str) -> Value {
    json!({
        "type": event_type,
        "payload": {
            "jobId": job_id,
            "parentId": Uuid::new_v4().to_string(),
            "ownerId": Uuid::new_v4().to_string(),
            "title": "Harbor at dawn",
            "script": {
                "beats": [
                    {"speaker": "Narrator", "text": "The boats come in.", "imagePrompt": "fishing boats at dawn"}
                ]
            }
        }
    })
}

async fn post_webhook(router: Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn phase(app: &TestApp, job_id: &str) -> Option<JobPhase> {
    app.statuses
        .get(&JobId::parse(job_id).unwrap())
        .await
        .unwrap()
        .map(|r| r.phase)
}

#[tokio::test]
async fn health_returns_ok() {
    let app = app(false);
    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = app(false);
    let response = app
        .router
        .oneshot(Request::builder().uri("/jobs").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let app = app(false);
    let (status, body) = post_webhook(app.router.clone(), "{\"type\": ").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid JSON"));
}

#[tokio::test]
async fn unknown_type_is_400() {
    let app = app(false);
    let id = Uuid::new_v4().to_string();
    let (status, body) = post_webhook(app.router.clone(), envelope("podcast", &id).to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("podcast"));
    assert_eq!(phase(&app, &id).await, None);
}

#[tokio::test]
async fn busy_server_rejects_and_fails_job() {
    let app = app(false);
    let _busy = app.admission.try_acquire().unwrap();
    let id = Uuid::new_v4().to_string();

    let (status, body) =
        post_webhook(app.router.clone(), envelope("video_generation", &id).to_string()).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["activeRequests"], 1);
    assert_eq!(body["maxRequests"], 1);
    assert!(body["error"].is_string());
    assert_eq!(phase(&app, &id).await, Some(JobPhase::Failed));
}

#[tokio::test]
async fn video_webhook_completes() {
    let app = app(false);
    let id = Uuid::new_v4().to_string();

    let (status, body) =
        post_webhook(app.router.clone(), envelope("video_generation", &id).to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true, "{}", body);
    assert_eq!(body["completed"], true);
    assert_eq!(
        body["result"]["artifactUrl"],
        format!("https://cdn.test/videos/{}.mp4", id)
    );
    assert_eq!(phase(&app, &id).await, Some(JobPhase::Completed));
    assert_eq!(app.admission.active(), 0);
}

#[tokio::test]
async fn invalid_payload_reports_failure_with_200() {
    let app = app(false);
    let id = Uuid::new_v4().to_string();
    let mut body = envelope("image_preview", &id);
    body["payload"]["ownerId"] = json!("someone");

    let (status, body) = post_webhook(app.router.clone(), body.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["completed"], false);
    assert!(body["error"].as_str().unwrap().contains("ownerId"));
    assert_eq!(phase(&app, &id).await, Some(JobPhase::Failed));
}

#[tokio::test]
async fn crashed_job_is_failed_and_frees_slot() {
    let app = app(true);
    let id = Uuid::new_v4().to_string();

    let (status, body) =
        post_webhook(app.router.clone(), envelope("video_generation", &id).to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["completed"], true);
    assert_eq!(phase(&app, &id).await, Some(JobPhase::Failed));
    tokio_test::assert_ok!(app.admission.try_acquire());
}
