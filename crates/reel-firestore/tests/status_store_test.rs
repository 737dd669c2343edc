//! Firestore-backed job status store against a mocked REST endpoint.

use std::time::Duration;

use reel_firestore::{
    FirestoreClient, FirestoreConfig, FirestoreError, FirestoreJobStatusStore, JobStatusStore,
    RetryConfig,
};
use reel_models::{JobId, JobKind, JobPhase, JobStatusRecord};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOCS: &str = "/v1/projects/test-project/databases/(default)/documents";

async fn store_for(server: &MockServer) -> FirestoreJobStatusStore {
    let config = FirestoreConfig {
        project_id: "test-project".to_string(),
        database_id: "(default)".to_string(),
        emulator_host: Some(server.address().to_string()),
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
    };
    let client = FirestoreClient::new(config).await.unwrap();
    FirestoreJobStatusStore::new(client, "generation_jobs")
}

fn doc_path(job_id: &JobId) -> String {
    format!("{}/generation_jobs/{}", DOCS, job_id)
}

fn stored_doc(job_id: &JobId, phase: &str) -> serde_json::Value {
    json!({
        "name": format!("projects/test-project/databases/(default)/documents/generation_jobs/{}", job_id),
        "fields": {
            "jobId": {"stringValue": job_id.to_string()},
            "kind": {"stringValue": "image_preview"},
            "phase": {"stringValue": phase},
            "artifactUrl": {"stringValue": "https://cdn.example.com/videos/x/image-preview/output/"},
            "errorMessage": {"nullValue": null},
            "metrics": {"mapValue": {"fields": {
                "renderAttempts": {"integerValue": "1"},
                "replacedBeats": {"arrayValue": {}},
                "reused": {"booleanValue": false},
                "fileCount": {"integerValue": "3"},
                "totalBytes": {"integerValue": "4096"}
            }}},
            "updatedAt": {"timestampValue": "2026-01-02T03:04:05Z"}
        },
        "updateTime": "2026-01-02T03:04:05.000001Z"
    })
}

#[tokio::test]
async fn put_patches_document_with_emulator_token() {
    let server = MockServer::start().await;
    let job_id = JobId::new();

    Mock::given(method("PATCH"))
        .and(path(doc_path(&job_id)))
        .and(header("authorization", "Bearer owner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_doc(&job_id, "processing")))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let record = JobStatusRecord::new(job_id, Some(JobKind::ImagePreview), JobPhase::Processing);
    store.put(&record).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["fields"]["phase"], json!({"stringValue": "processing"}));
    assert_eq!(body["fields"]["kind"], json!({"stringValue": "image_preview"}));
    assert_eq!(body["fields"]["metrics"], json!({"nullValue": null}));
}

#[tokio::test]
async fn get_returns_none_for_missing_document() {
    let server = MockServer::start().await;
    let job_id = JobId::new();

    Mock::given(method("GET"))
        .and(path(doc_path(&job_id)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": {"code": 404}})))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    assert!(store.get(&job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn get_decodes_stored_record() {
    let server = MockServer::start().await;
    let job_id = JobId::new();

    Mock::given(method("GET"))
        .and(path(doc_path(&job_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_doc(&job_id, "completed")))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let record = store.get(&job_id).await.unwrap().unwrap();

    assert_eq!(record.job_id, job_id);
    assert_eq!(record.phase, JobPhase::Completed);
    assert_eq!(record.kind, Some(JobKind::ImagePreview));
    assert_eq!(record.error_message, None);
    let metrics = record.metrics.unwrap();
    assert_eq!(metrics.file_count, 3);
    assert_eq!(metrics.total_bytes, 4096);
    assert!(metrics.replaced_beats.is_empty());
}

#[tokio::test]
async fn transient_server_errors_are_retried() {
    let server = MockServer::start().await;
    let job_id = JobId::new();

    Mock::given(method("GET"))
        .and(path(doc_path(&job_id)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(doc_path(&job_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_doc(&job_id, "failed")))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let record = store.get(&job_id).await.unwrap().unwrap();
    assert_eq!(record.phase, JobPhase::Failed);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    let job_id = JobId::new();

    Mock::given(method("PATCH"))
        .and(path(doc_path(&job_id)))
        .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let record = JobStatusRecord::new(job_id, None, JobPhase::Failed);
    let err = store.put(&record).await.unwrap_err();
    assert!(matches!(err, FirestoreError::PermissionDenied(_)));
}
