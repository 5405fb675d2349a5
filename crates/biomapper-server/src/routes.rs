// biomapper-server/src/routes.rs
// ============================================================================
// Module: HTTP Routes
// Description: Axum router and handlers for the job API surface.
// Purpose: Expose strategies, submissions, status, results, and events.
// Dependencies: axum, biomapper-core, crate::{error, jobs}, tokio-stream
// ============================================================================

//! ## Overview
//! The HTTP surface is a thin layer over the job manager: list strategies,
//! submit a job, poll revisioned status, fetch the terminal result, cancel
//! cooperatively, and stream per-step events over SSE. Every handler calls
//! into the manager; no handler touches an execution context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::response::Sse;
use axum::response::sse::Event;
use axum::routing::get;
use axum::routing::post;
use biomapper_core::JobId;
use biomapper_core::JobRecord;
use serde::Deserialize;
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::ApiError;
use crate::jobs::CancelOutcome;
use crate::jobs::JobManager;

// ============================================================================
// SECTION: State and Router
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Job manager owning executors and the strategy library.
    pub manager: Arc<JobManager>,
}

/// Builds the API router over the manager.
#[must_use]
pub fn router(manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/strategies", get(list_strategies))
        .route("/jobs", post(submit_job))
        .route("/jobs/{job_id}", get(job_status))
        .route("/jobs/{job_id}/result", get(job_result))
        .route("/jobs/{job_id}/cancel", post(cancel_job))
        .route("/jobs/{job_id}/events", get(job_events))
        .with_state(AppState { manager })
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Submission payload.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// Strategy to execute.
    pub strategy_name: String,
    /// Parameter overrides merged over strategy defaults.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// Submission response.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// Assigned job identifier.
    pub job_id: String,
}

/// Status response with monotonic revision.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Job identifier.
    pub job_id: String,
    /// Current lifecycle status.
    pub status: String,
    /// Monotonically increasing revision for change detection.
    pub revision: u64,
    /// Step currently executing, while running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Steps completed so far.
    pub completed_steps: u64,
    /// Condensed metrics snapshot.
    pub metrics_snapshot: BTreeMap<String, serde_json::Value>,
    /// Step the job failed on, for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    /// Error payload, for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

impl StatusResponse {
    /// Builds the status payload from a record.
    fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.as_str().to_string(),
            status: record.status.as_str().to_string(),
            revision: record.revision,
            current_step: record.current_step.clone(),
            completed_steps: record.completed_steps,
            metrics_snapshot: record.metrics.clone(),
            failed_step: record.failed_step.clone(),
            error: record.error.as_ref().map(|error| {
                serde_json::json!({
                    "error_kind": error.kind.code(),
                    "message": error.message,
                })
            }),
        }
    }
}

/// Terminal result response.
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    /// Job identifier.
    pub job_id: String,
    /// Terminal status.
    pub status: String,
    /// Steps completed.
    pub completed_steps: u64,
    /// Condensed metrics snapshot.
    pub metrics: BTreeMap<String, serde_json::Value>,
    /// Produced output files keyed by purpose.
    pub output_files: BTreeMap<String, String>,
    /// Error payload, for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Health probe with the loaded strategy count.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "strategies": state.manager.library().len(),
    }))
}

/// Lists loaded strategies.
async fn list_strategies(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.manager.library().list()))
}

/// Accepts a submission and enqueues execution.
async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let job_id = state.manager.submit(&request.strategy_name, request.parameters)?;
    state.manager.start_detached(job_id.clone());
    Ok(Json(SubmitResponse { job_id: job_id.as_str().to_string() }))
}

/// Returns revisioned job status.
async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let record = state.manager.load_record(&JobId::new(job_id))?;
    Ok(Json(StatusResponse::from_record(&record)))
}

/// Returns the terminal result summary.
async fn job_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ResultResponse>, ApiError> {
    let record = state.manager.load_record(&JobId::new(job_id))?;
    if !record.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "job {} is still {}",
            record.job_id,
            record.status.as_str()
        )));
    }
    Ok(Json(ResultResponse {
        job_id: record.job_id.as_str().to_string(),
        status: record.status.as_str().to_string(),
        completed_steps: record.completed_steps,
        metrics: record.metrics.clone(),
        output_files: record.output_files.clone(),
        error: record.error.as_ref().map(|error| {
            serde_json::json!({
                "error_kind": error.kind.code(),
                "message": error.message,
            })
        }),
    }))
}

/// Requests cooperative cancellation.
async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.manager.cancel(&JobId::new(job_id))?;
    let label = match outcome {
        CancelOutcome::Ok => "ok",
        CancelOutcome::NotCancellable => "not_cancellable",
    };
    Ok(Json(serde_json::json!({ "result": label })))
}

/// Streams per-step events over SSE.
async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job_id = JobId::new(job_id);
    // Subscribing validates existence so dead job ids fail fast.
    let _ = state.manager.load_record(&job_id)?;
    let receiver = state.manager.hub().subscribe(&job_id);
    let stream = BroadcastStream::new(receiver).filter_map(|event| {
        event.ok().map(|step_event| {
            let payload = serde_json::json!({
                "step_name": step_event.step_name.as_str(),
                "event": step_event.event,
                "metrics": step_event.metrics,
            });
            Ok(Event::default().event("step").data(payload.to_string()))
        })
    });
    Ok(Sse::new(stream))
}
