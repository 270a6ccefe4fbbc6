//! Job Manager (C7, spec.md §4.7): lifecycle, progress, cancellation.
//!
//! Holds one [`Job`] per in-flight or recently finished job in memory,
//! each behind its own `Mutex` so progress updates from one job's
//! orchestrator never contend with another's — only the outer registry
//! lock is shared, and only briefly, on `create`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use docforge_shared::error::DocforgeError;
use docforge_shared::types::{Job, JobId, JobInputs, JobPhase, JobStatus};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use crate::store::ArtifactStore;

/// Outcome of a [`JobManager::cancel`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Ack,
    NotFound,
    AlreadyTerminal,
}

/// In-process job registry plus the durable store it mirrors status to.
pub struct JobManager {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<Job>>>>,
    store: Arc<dyn ArtifactStore>,
}

impl JobManager {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Validate `inputs` and register a new job in `pending`. Validation
    /// errors are reported synchronously; the job never enters `running`
    /// (spec.md §4.7 failure semantics).
    #[instrument(skip(self, inputs), fields(root_url = %inputs.root_url))]
    pub async fn create(&self, inputs: JobInputs) -> Result<JobId, DocforgeError> {
        inputs.validate().map_err(DocforgeError::input)?;

        let job = Job::new(JobId::new(), inputs, Utc::now().timestamp());
        let job_id = job.id;

        self.store.put_status(&job).await.map_err(|e| DocforgeError::Store(e.to_string()))?;
        self.jobs.write().await.insert(job_id, Arc::new(Mutex::new(job)));

        info!(%job_id, "job created");
        Ok(job_id)
    }

    /// Current view of a job, preferring the in-memory registry (fresher
    /// than the durable store while a job is running).
    pub async fn get(&self, job_id: &JobId) -> Option<Job> {
        if let Some(handle) = self.jobs.read().await.get(job_id) {
            return Some(handle.lock().await.clone());
        }
        self.store.get_status(job_id).await.ok().flatten()
    }

    /// Request cancellation. The orchestrator observes the flag at the
    /// next checkpoint (spec.md §5 "suspension points").
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: &JobId) -> CancelOutcome {
        let Some(handle) = self.jobs.read().await.get(job_id).cloned() else {
            return CancelOutcome::NotFound;
        };

        let mut job = handle.lock().await;
        if job.status.is_terminal() {
            return CancelOutcome::AlreadyTerminal;
        }
        job.cancelled = true;
        CancelOutcome::Ack
    }

    /// Whether cancellation has been requested for `job_id`. Orchestrators
    /// call this at each suspension point (spec.md §5).
    pub async fn is_cancelled(&self, job_id: &JobId) -> bool {
        match self.jobs.read().await.get(job_id) {
            Some(handle) => handle.lock().await.cancelled,
            None => false,
        }
    }

    /// Apply `mutate` to the job and persist the resulting status.
    /// Progress is clamped non-decreasing within the mutation (spec.md §3).
    pub async fn update<F>(&self, job_id: &JobId, mutate: F) -> Result<(), DocforgeError>
    where
        F: FnOnce(&mut Job),
    {
        let Some(handle) = self.jobs.read().await.get(job_id).cloned() else {
            return Err(DocforgeError::Store(format!("unknown job {job_id}")));
        };

        let snapshot = {
            let mut job = handle.lock().await;
            let progress_before = job.progress;
            mutate(&mut job);
            if job.progress < progress_before {
                job.progress = progress_before;
            }
            job.clone()
        };

        self.store
            .put_status(&snapshot)
            .await
            .map_err(|e| DocforgeError::Store(e.to_string()))
    }

    /// Move to `phase`, bumping progress to at least the phase's base
    /// fraction (spec.md §4.9).
    pub async fn set_phase(&self, job_id: &JobId, phase: JobPhase) -> Result<(), DocforgeError> {
        self.update(job_id, |job| {
            job.phase = phase;
            job.progress = job.progress.max(phase.base_fraction());
        })
        .await
    }

    /// Append a line to the job's bounded processing log.
    pub async fn log(&self, job_id: &JobId, line: impl Into<String>) -> Result<(), DocforgeError> {
        let line = line.into();
        self.update(job_id, |job| job.processing_logs.push(line)).await
    }

    /// Transition to `running`.
    pub async fn start(&self, job_id: &JobId) -> Result<(), DocforgeError> {
        self.update(job_id, |job| {
            job.status = JobStatus::Running;
            job.message = "running".to_string();
        })
        .await
    }

    /// Terminal transition to `completed`. The caller must have already
    /// finalized both artifact blobs in the store (write-ordering
    /// invariant, spec.md §4.8).
    #[instrument(skip(self))]
    pub async fn complete(&self, job_id: &JobId, llm_txt_url: String, llms_full_txt_url: Option<String>, total_size_kb: u64) -> Result<(), DocforgeError> {
        let now = Utc::now().timestamp();
        self.update(job_id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 1.0;
            job.completed_at = Some(now);
            job.llm_txt_url = Some(llm_txt_url);
            job.llms_full_txt_url = llms_full_txt_url;
            job.total_size_kb = Some(total_size_kb);
            job.message = "completed".to_string();
        })
        .await
    }

    /// Terminal transition to `failed`.
    #[instrument(skip(self))]
    pub async fn fail(&self, job_id: &JobId, error_code: &str, message: impl Into<String>) -> Result<(), DocforgeError> {
        let message = message.into();
        let now = Utc::now().timestamp();
        warn!(%job_id, error_code, %message, "job failed");
        let error_code = error_code.to_string();
        self.update(job_id, |job| {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            job.error_code = Some(error_code);
            job.message = message;
        })
        .await
    }

    /// Terminal transition to `cancelled`. Any partial artifacts must not
    /// be published (spec.md §7).
    #[instrument(skip(self))]
    pub async fn mark_cancelled(&self, job_id: &JobId) -> Result<(), DocforgeError> {
        let now = Utc::now().timestamp();
        self.update(job_id, |job| {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(now);
            job.message = "cancelled".to_string();
        })
        .await
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }
}
