use std::collections::HashSet;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::broker::{Job, JobStatus, ReportOutcome, SharedStore};
use crate::error::BrokerError;

#[derive(Clone)]
pub struct ApiState {
    pub store: SharedStore,
    /// Lease granted to every claim.
    pub lease: chrono::Duration,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub command: String,
    pub payload: String,
    #[serde(default)]
    pub requires: HashSet<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub id: Uuid,
    pub status: JobStatus,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    #[serde(default)]
    pub capabilities: HashSet<String>,
    #[serde(default)]
    pub worker_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub job: Option<Job>,
}

#[derive(Debug, Deserialize)]
pub struct ResultRequest {
    pub result: String,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportAck {
    pub ok: bool,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<JobStatus>,
}

/// Build the broker's HTTP surface over a shared store.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/claim", post(claim_job))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/result", post(report_result))
        .route("/jobs/{id}/fail", post(report_failure))
        .layer(cors)
        .with_state(state)
}

fn error_response(err: &BrokerError) -> Response {
    let status = match err {
        BrokerError::JobNotFound(_) => StatusCode::NOT_FOUND,
        BrokerError::StaleReport { .. } => StatusCode::CONFLICT,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn create_job(
    State(state): State<ApiState>,
    Json(req): Json<CreateJobRequest>,
) -> Json<CreateJobResponse> {
    let job = state
        .store
        .write()
        .await
        .create(req.command, req.payload, req.requires);

    Json(CreateJobResponse {
        id: job.id,
        status: job.status,
    })
}

async fn get_job(State(state): State<ApiState>, Path(id): Path<Uuid>) -> Response {
    let store = state.store.read().await;
    match store.get(&id) {
        Some(job) => Json(job.clone()).into_response(),
        None => error_response(&BrokerError::JobNotFound(id)),
    }
}

async fn list_jobs(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Job>> {
    let store = state.store.read().await;
    let jobs: Vec<Job> = store
        .jobs()
        .into_iter()
        .filter(|job| query.status.is_none_or(|s| job.status == s))
        .cloned()
        .collect();
    Json(jobs)
}

/// Hand the oldest eligible job to the calling worker, or `{"job": null}`
/// when nothing matches its capabilities. A single attempt; polling cadence
/// is the worker's responsibility.
async fn claim_job(
    State(state): State<ApiState>,
    Json(req): Json<ClaimRequest>,
) -> Json<ClaimResponse> {
    let job = state.store.write().await.claim_one(
        &req.capabilities,
        req.worker_id.as_deref(),
        state.lease,
        Utc::now(),
    );
    Json(ClaimResponse { job })
}

async fn report_result(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResultRequest>,
) -> Response {
    let outcome = state
        .store
        .write()
        .await
        .complete(&id, req.result, Utc::now());

    match outcome {
        Ok(ReportOutcome::Applied(job)) => Json(ReportAck {
            ok: true,
            status: job.status,
            note: None,
        })
        .into_response(),
        Ok(ReportOutcome::AlreadyTerminal(job)) => {
            let note = match job.status {
                JobStatus::Failed => Some("already failed; result ignored".to_string()),
                _ => None,
            };
            Json(ReportAck {
                ok: true,
                status: job.status,
                note,
            })
            .into_response()
        }
        Err(err) => error_response(&err),
    }
}

async fn report_failure(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FailRequest>,
) -> Response {
    let error = match req.error.trim() {
        "" => "unknown".to_string(),
        trimmed => trimmed.to_string(),
    };

    let outcome = state.store.write().await.fail(&id, error, Utc::now());

    match outcome {
        Ok(ReportOutcome::Applied(job)) => Json(ReportAck {
            ok: true,
            status: job.status,
            note: None,
        })
        .into_response(),
        Ok(ReportOutcome::AlreadyTerminal(job)) => {
            let note = match job.status {
                JobStatus::Done => Some("already done; fail ignored".to_string()),
                _ => None,
            };
            Json(ReportAck {
                ok: true,
                status: job.status,
                note,
            })
            .into_response()
        }
        Err(err) => error_response(&err),
    }
}
