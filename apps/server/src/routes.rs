//! HTTP surface (§6.1): `/v1/generations` CRUD-ish lifecycle plus download.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use docforge_jobs::{CancelOutcome, DownloadOutcome};
use docforge_shared::{ArtifactKind, Job, JobId, JobInputs, JobPhase, JobStatus};

use crate::error::ApiError;
use crate::job_runner::run_job;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/generations", post(create_generation))
        .route("/v1/generations/:job_id", get(get_generation).delete(cancel_generation))
        .route("/v1/generations/:job_id/download/:kind", get(download_generation))
}

#[derive(Debug, Deserialize)]
pub struct CreateGenerationRequest {
    pub url: String,
    pub max_pages: Option<u32>,
    pub max_depth: Option<u32>,
    pub max_kb: Option<u64>,
    pub full_version: Option<bool>,
    pub respect_robots: Option<bool>,
    pub language: Option<String>,
}

impl CreateGenerationRequest {
    fn into_job_inputs(self, defaults: &docforge_shared::ServiceDefaults) -> JobInputs {
        JobInputs {
            root_url: self.url,
            max_pages: self.max_pages.unwrap_or(defaults.max_pages),
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            max_kb: self.max_kb.unwrap_or(defaults.max_kb),
            respect_robots: self.respect_robots.unwrap_or(true),
            request_full: self.full_version.unwrap_or(false),
            language: self.language,
            user_agent: defaults.user_agent.clone(),
            request_delay_secs: defaults.request_delay_secs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateGenerationResponse {
    pub job_id: String,
    pub status: &'static str,
    pub message: String,
}

async fn create_generation(
    State(state): State<AppState>,
    Json(body): Json<CreateGenerationRequest>,
) -> Result<(StatusCode, Json<CreateGenerationResponse>), ApiError> {
    let inputs = body.into_job_inputs(&state.defaults);
    let job_id = state.job_manager.create(inputs).await.map_err(ApiError::from)?;

    tokio::spawn(run_job(job_id, state.clone()));

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateGenerationResponse {
            job_id: job_id.to_string(),
            status: "pending",
            message: "generation accepted".to_string(),
        }),
    ))
}

/// Job view returned by `GET /v1/generations/{job_id}` (§6.1).
#[derive(Debug, Serialize)]
pub struct JobView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub message: String,
    pub current_phase: JobPhase,
    pub current_page_url: Option<String>,
    pub pages_discovered: u32,
    pub pages_processed: u32,
    pub processing_logs: Vec<String>,
    pub pages_crawled: u32,
    pub total_size_kb: Option<u64>,
    pub llm_txt_url: Option<String>,
    pub llms_full_txt_url: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            progress: job.progress,
            message: job.message,
            current_phase: job.phase,
            current_page_url: job.current_page_url,
            pages_discovered: job.counters.pages_discovered,
            pages_processed: job.counters.pages_processed,
            processing_logs: job.processing_logs.lines().map(str::to_string).collect(),
            pages_crawled: job.counters.pages_crawled,
            total_size_kb: job.total_size_kb,
            llm_txt_url: job.llm_txt_url,
            llms_full_txt_url: job.llms_full_txt_url,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse().map_err(|_| ApiError::not_found("job"))
}

async fn get_generation(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<JobView>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.job_manager.get(&job_id).await.ok_or_else(|| ApiError::not_found("job"))?;
    Ok(Json(JobView::from(job)))
}

async fn cancel_generation(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    match state.job_manager.cancel(&job_id).await {
        CancelOutcome::Ack => Ok(Json(json!({ "message": "cancellation requested" }))),
        CancelOutcome::NotFound => Err(ApiError::not_found("job")),
        CancelOutcome::AlreadyTerminal => Err(ApiError::conflict("job is already in a terminal state")),
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    pub raw: Option<u8>,
}

async fn download_generation(
    State(state): State<AppState>,
    Path((job_id, kind)): Path<(String, String)>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let kind: ArtifactKind = kind.parse().map_err(|_| ApiError::bad_request("invalid_input", "unknown artifact kind"))?;

    match state.job_manager.store().get_artifact(&job_id, kind).await.map_err(ApiError::from)? {
        DownloadOutcome::Found(artifact) => {
            if params.raw.unwrap_or(0) == 1 {
                let headers = [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", kind.storage_key())),
                ];
                Ok((headers, artifact.content).into_response())
            } else {
                Ok(Json(json!({ "content": artifact.content })).into_response())
            }
        }
        DownloadOutcome::NotReady => Err(ApiError::not_ready()),
        DownloadOutcome::NotFound => Err(ApiError::not_found("job")),
    }
}
