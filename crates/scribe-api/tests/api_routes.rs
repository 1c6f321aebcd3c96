//! Route-level tests through the full router.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use scribe_api::build_router;
use scribe_autoscale::{AutoScaler, ScalingPolicy, SystemSnapshot, TelemetrySource};
use scribe_core::config::SchedulerConfig;
use scribe_core::{TranscriptionRequest, TranscriptionResult};
use scribe_executor::{
    BoxFuture, ExecutionError, ExecutionOutput, ExecutionResult, InferenceExecutor,
};
use scribe_scheduler::Scheduler;
use scribe_state::StatusStore;

/// Fails any input containing "bad", transcribes the rest.
struct FakeWhisper;

impl InferenceExecutor for FakeWhisper {
    fn name(&self) -> &str {
        "fake-whisper"
    }

    fn transcribe<'a>(&'a self, request: &'a TranscriptionRequest) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            if request.input.contains("bad") {
                return Err(ExecutionError::Failed("unsupported codec".to_string()));
            }
            let mut result = TranscriptionResult::from_text("hello world");
            result.language = request.options.language.clone();
            Ok(ExecutionOutput {
                result,
                processing_time: 0.25,
            })
        })
    }
}

struct FixedTelemetry;

impl TelemetrySource for FixedTelemetry {
    fn sample(&self) -> SystemSnapshot {
        SystemSnapshot {
            cpu_count: 4,
            memory_total: 16 * 1024 * 1024 * 1024,
            memory_free: 8 * 1024 * 1024 * 1024,
            memory_used_percent: 50.0,
            load_average: 0.5,
            gpu_count: 0,
            degraded: false,
            sampled_at: 0,
        }
    }
}

fn test_router() -> Router {
    let store = StatusStore::open_in_memory().unwrap();
    let (scheduler, _task) =
        Scheduler::spawn(&SchedulerConfig::default(), Arc::new(FakeWhisper), store, 2);
    let autoscaler = Arc::new(AutoScaler::new(
        Arc::new(FixedTelemetry),
        ScalingPolicy::default(),
        Duration::from_secs(30),
    ));
    build_router(scheduler, autoscaler)
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(router: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let (status, bytes) = send(router, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn wait_terminal(router: &Router, id: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (_, body) = send_json(router, "GET", &format!("/api/v1/jobs/{id}"), None).await;
            let status = body["data"]["status"].as_str().unwrap_or_default().to_string();
            if status == "completed" || status == "failed" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not finish")
}

#[tokio::test]
async fn submit_and_complete_job() {
    let router = test_router();

    let (status, body) = send_json(
        &router,
        "POST",
        "/api/v1/jobs",
        Some(r#"{"input":"/uploads/talk.wav","options":{"language":"en","diarize":true}}"#),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let body = wait_terminal(&router, &id).await;
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["name"], "talk.wav");
    assert_eq!(body["data"]["result"]["text"], "hello world");
    assert_eq!(body["data"]["result"]["language"], "en");
    assert_eq!(body["data"]["retries"], 0);

    let (status, body) = send_json(&router, "GET", "/api/v1/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body["data"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], id.as_str());
}

#[tokio::test]
async fn failing_job_reports_error() {
    let router = test_router();

    let (_, body) = send_json(
        &router,
        "POST",
        "/api/v1/jobs",
        Some(r#"{"input":"/uploads/bad.ogg","name":"broken upload"}"#),
    )
    .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let body = wait_terminal(&router, &id).await;
    assert_eq!(body["data"]["status"], "failed");
    assert_eq!(body["data"]["name"], "broken upload");
    assert_eq!(body["data"]["error"], "unsupported codec");
    assert_eq!(body["data"]["retries"], 3);

    let (_, body) = send_json(&router, "GET", "/api/v1/jobs", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_job_is_404() {
    let router = test_router();
    let (status, body) = send_json(&router, "GET", "/api/v1/jobs/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));
}

#[tokio::test]
async fn malformed_submit_is_rejected() {
    let router = test_router();
    let (status, _) = send(&router, "POST", "/api/v1/jobs", Some(r#"{"name":"no input"}"#)).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn queue_stats_route() {
    let router = test_router();
    let (status, body) = send_json(&router, "GET", "/api/v1/queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pending_jobs"], 0);
    assert_eq!(body["data"]["total_workers"], 2);
    assert_eq!(body["data"]["available_workers"], 2);
    assert_eq!(body["data"]["estimated_wait_time"], 0.0);
}

#[tokio::test]
async fn system_route_reports_recommendation() {
    let router = test_router();
    let (status, body) = send_json(&router, "GET", "/api/v1/system", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["snapshot"]["cpu_count"], 4);
    assert_eq!(body["data"]["recommendation"]["factors"]["cpu_base"], 3);
    assert_eq!(body["data"]["recommendation"]["recommended"], 3);
}

#[tokio::test]
async fn metrics_route_renders_prometheus() {
    let router = test_router();
    let (status, bytes) = send(&router, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("scribe_workers_total 2\n"));
    assert!(text.contains("scribe_workers_recommended 3\n"));
}
