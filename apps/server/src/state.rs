//! Shared application state handed to every axum handler.

use std::sync::Arc;
use std::time::Duration;

use docforge_core::DEFAULT_JOB_CEILING_SECS;
use docforge_jobs::JobManager;
use docforge_shared::ServiceDefaults;
use docforge_summarizer::SummarizerConfig;

/// State cloned into every request. Cloning is cheap — everything
/// behind it is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub job_manager: Arc<JobManager>,
    pub defaults: Arc<ServiceDefaults>,
    pub summarizer_config: Arc<SummarizerConfig>,
    pub job_ceiling: Duration,
}

impl AppState {
    pub fn new(job_manager: Arc<JobManager>, defaults: Arc<ServiceDefaults>, summarizer_config: Arc<SummarizerConfig>) -> Self {
        Self {
            job_manager,
            defaults,
            summarizer_config,
            job_ceiling: Duration::from_secs(DEFAULT_JOB_CEILING_SECS),
        }
    }

    pub fn download_url(&self, job_id: docforge_shared::JobId, kind: docforge_shared::ArtifactKind) -> String {
        format!("/v1/generations/{job_id}/download/{}", kind.storage_key())
    }
}
