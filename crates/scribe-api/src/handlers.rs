//! REST API handlers.
//!
//! Each handler talks to the scheduler through its handle and returns JSON
//! in the shared envelope.

use std::path::Path as FsPath;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scribe_core::{JobId, TranscriptionOptions};
use scribe_scheduler::SchedulerError;

use crate::ApiState;
use crate::prometheus::render_prometheus;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn scheduler_error(e: SchedulerError) -> Response {
    let status = match &e {
        SchedulerError::JobNotFound(_) => StatusCode::NOT_FOUND,
        SchedulerError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        SchedulerError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

// ── Jobs ───────────────────────────────────────────────────────

/// Submit request body.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Path of the audio file on the server.
    pub input: String,
    /// Display name; defaults to the input's file name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: TranscriptionOptions,
}

#[derive(Debug, Serialize)]
struct Submitted {
    id: JobId,
}

fn display_name(input: &str) -> String {
    FsPath::new(input)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string())
}

/// POST /api/v1/jobs
pub async fn submit_job(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> Response {
    let input = req.input.trim();
    if input.is_empty() {
        return error_response("input must not be empty", StatusCode::BAD_REQUEST);
    }
    let name = req
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| display_name(input));

    match state.scheduler.submit(input, name.as_str(), req.options) {
        Ok(id) => {
            info!(job_id = %id, %name, "job accepted");
            (StatusCode::ACCEPTED, ApiResponse::ok(Submitted { id })).into_response()
        }
        Err(e) => scheduler_error(e),
    }
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.scheduler.status(&id).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// GET /api/v1/jobs
pub async fn list_jobs(State(state): State<ApiState>) -> Response {
    match state.scheduler.completed_jobs() {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(e) => scheduler_error(e),
    }
}

// ── Queue & system ─────────────────────────────────────────────

/// GET /api/v1/queue
pub async fn queue_stats(State(state): State<ApiState>) -> Response {
    match state.scheduler.queue_stats().await {
        Ok(stats) => ApiResponse::ok(stats).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// GET /api/v1/system
pub async fn system_report(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.autoscaler.system_report(false).await).into_response()
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> Response {
    let stats = match state.scheduler.queue_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "metrics scrape without scheduler");
            return error_response(&e.to_string(), StatusCode::SERVICE_UNAVAILABLE);
        }
    };
    let report = state.autoscaler.system_report(false).await;

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        render_prometheus(&stats, &report),
    )
        .into_response()
}
