//! scribe-api — REST API for the transcription scheduler.
//!
//! Thin axum layer over `SchedulerHandle` and `AutoScaler`. Every JSON
//! response uses the `{success, data?, error?}` envelope.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/jobs` | Submit a job (202 + id) |
//! | GET | `/api/v1/jobs` | List completed jobs from the status store |
//! | GET | `/api/v1/jobs/{id}` | Job status |
//! | GET | `/api/v1/queue` | Queue statistics |
//! | GET | `/api/v1/system` | Telemetry snapshot and worker recommendation |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;
pub mod prometheus;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use scribe_autoscale::AutoScaler;
use scribe_scheduler::SchedulerHandle;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: SchedulerHandle,
    pub autoscaler: Arc<AutoScaler>,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(scheduler: SchedulerHandle, autoscaler: Arc<AutoScaler>) -> Router {
    let state = ApiState {
        scheduler,
        autoscaler,
    };

    let api_routes = Router::new()
        .route("/jobs", get(handlers::list_jobs).post(handlers::submit_job))
        .route("/jobs/{id}", get(handlers::get_job))
        .route("/queue", get(handlers::queue_stats))
        .route("/system", get(handlers::system_report))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
