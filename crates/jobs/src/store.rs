//! Artifact Store (C8, spec.md §4.8).
//!
//! A key-value interface keyed by `job_id`, with sub-keys `status.json`,
//! `llm.txt`, `llms-full.txt`. Two backends share the same trait and the
//! same write-ordering invariant: blobs are finalized before `status.json`
//! is rewritten with `status: completed`, so a reader that observes
//! `completed` can always read both artifacts (spec.md §4.8, §3 invariant).

use async_trait::async_trait;
use docforge_shared::types::{Artifact, ArtifactKind, Job, JobId};
use futures::StreamExt;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore as ObjectStoreBackendTrait, PutPayload};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact store backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Outcome of a download request (spec.md §4.7 `download`).
#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    Found(Artifact),
    NotReady,
    NotFound,
}

/// Shared contract between the memory and object-store backends.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist the current job view. Called on every material change.
    async fn put_status(&self, job: &Job) -> Result<(), StoreError>;

    /// Read back the most recently persisted job view, if any.
    async fn get_status(&self, job_id: &JobId) -> Result<Option<Job>, StoreError>;

    /// Finalize an artifact blob. Must be called, and succeed, before the
    /// caller writes a `completed` status (write-ordering invariant).
    async fn put_artifact(&self, artifact: &Artifact) -> Result<(), StoreError>;

    /// Read an artifact, distinguishing "job unknown" from "not produced yet".
    async fn get_artifact(&self, job_id: &JobId, kind: ArtifactKind) -> Result<DownloadOutcome, StoreError>;

    /// Reclaim all state for jobs whose `completed_at` is older than `ttl_days`
    /// relative to `now` (both in seconds since epoch). Returns the number of
    /// jobs reclaimed.
    async fn reclaim_expired(&self, ttl_days: i64, now: i64) -> Result<u64, StoreError>;
}

/// Process-wide in-memory backend. Suitable only for single-instance
/// deployments (spec.md §4.8).
#[derive(Debug, Default)]
pub struct MemoryStore {
    statuses: RwLock<HashMap<JobId, Job>>,
    artifacts: RwLock<HashMap<(JobId, ArtifactKind), Artifact>>,
    write_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn put_status(&self, job: &Job) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.statuses.write().await.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_status(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.statuses.read().await.get(job_id).cloned())
    }

    #[instrument(skip(self, artifact), fields(job_id = %artifact.job_id, kind = ?artifact.kind))]
    async fn put_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.artifacts
            .write()
            .await
            .insert((artifact.job_id.clone(), artifact.kind), artifact.clone());
        Ok(())
    }

    async fn get_artifact(&self, job_id: &JobId, kind: ArtifactKind) -> Result<DownloadOutcome, StoreError> {
        let has_job = self.statuses.read().await.contains_key(job_id);
        if !has_job {
            return Ok(DownloadOutcome::NotFound);
        }
        match self.artifacts.read().await.get(&(job_id.clone(), kind)) {
            Some(artifact) => Ok(DownloadOutcome::Found(artifact.clone())),
            None => Ok(DownloadOutcome::NotReady),
        }
    }

    async fn reclaim_expired(&self, ttl_days: i64, now: i64) -> Result<u64, StoreError> {
        let ttl_secs = ttl_days * 24 * 3600;
        let mut statuses = self.statuses.write().await;
        let expired: Vec<JobId> = statuses
            .values()
            .filter_map(|job| {
                job.completed_at
                    .filter(|&completed| now - completed >= ttl_secs)
                    .map(|_| job.id.clone())
            })
            .collect();

        let mut artifacts = self.artifacts.write().await;
        for job_id in &expired {
            statuses.remove(job_id);
            artifacts.retain(|(id, _), _| id != job_id);
        }
        Ok(expired.len() as u64)
    }
}

/// Durable backend writing to a shared object store under `jobs/<job_id>/`
/// (spec.md §6.3). Reads consult the store directly; writes are the source
/// of truth, there is no local cache.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStoreBackendTrait>,
    prefix: String,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStoreBackendTrait>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn status_path(&self, job_id: &JobId) -> StorePath {
        StorePath::from(format!("{}/jobs/{job_id}/status.json", self.prefix))
    }

    fn artifact_path(&self, job_id: &JobId, kind: ArtifactKind) -> StorePath {
        StorePath::from(format!("{}/jobs/{job_id}/{}", self.prefix, kind.storage_key()))
    }

    fn job_prefix(&self) -> StorePath {
        StorePath::from(format!("{}/jobs/", self.prefix))
    }
}

#[async_trait]
impl ArtifactStore for ObjectStoreBackend {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn put_status(&self, job: &Job) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(job)?;
        self.store
            .put(&self.status_path(&job.id), PutPayload::from(bytes))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_status(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        match self.store.get(&self.status_path(job_id)).await {
            Ok(result) => {
                let bytes = result.bytes().await.map_err(|e| StoreError::Backend(e.to_string()))?;
                let job: Job = serde_json::from_slice(&bytes)?;
                Ok(Some(job))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    #[instrument(skip(self, artifact), fields(job_id = %artifact.job_id, kind = ?artifact.kind))]
    async fn put_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let path = self.artifact_path(&artifact.job_id, artifact.kind);
        self.store
            .put(&path, PutPayload::from(artifact.content.clone().into_bytes()))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_artifact(&self, job_id: &JobId, kind: ArtifactKind) -> Result<DownloadOutcome, StoreError> {
        if self.get_status(job_id).await?.is_none() {
            return Ok(DownloadOutcome::NotFound);
        }

        match self.store.get(&self.artifact_path(job_id, kind)).await {
            Ok(result) => {
                let bytes = result.bytes().await.map_err(|e| StoreError::Backend(e.to_string()))?;
                let content = String::from_utf8_lossy(&bytes).into_owned();
                let produced_at = self
                    .get_status(job_id)
                    .await?
                    .and_then(|j| j.completed_at)
                    .unwrap_or(0);
                Ok(DownloadOutcome::Found(Artifact::new(kind, content, job_id.clone(), produced_at)))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(DownloadOutcome::NotReady),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn reclaim_expired(&self, ttl_days: i64, now: i64) -> Result<u64, StoreError> {
        let ttl_secs = ttl_days * 24 * 3600;
        let mut listing = self.store.list(Some(&self.job_prefix()));
        let mut job_ids: std::collections::HashSet<String> = std::collections::HashSet::new();

        while let Some(meta) = listing.next().await {
            let meta = meta.map_err(|e| StoreError::Backend(e.to_string()))?;
            if let Some(job_id) = extract_job_id(meta.location.as_ref(), &self.prefix) {
                job_ids.insert(job_id);
            }
        }

        let mut reclaimed = 0u64;
        for job_id_str in job_ids {
            let job_id: JobId = match job_id_str.parse() {
                Ok(id) => id,
                Err(_) => continue,
            };
            let Some(job) = self.get_status(&job_id).await? else {
                continue;
            };
            let Some(completed_at) = job.completed_at else {
                continue;
            };
            if now - completed_at < ttl_secs {
                continue;
            }

            for kind in [ArtifactKind::LlmTxt, ArtifactKind::LlmsFullTxt] {
                let path = self.artifact_path(&job_id, kind);
                if let Err(e) = self.store.delete(&path).await {
                    if !matches!(e, object_store::Error::NotFound { .. }) {
                        warn!(%job_id, error = %e, "failed to delete expired artifact");
                    }
                }
            }
            if let Err(e) = self.store.delete(&self.status_path(&job_id)).await {
                warn!(%job_id, error = %e, "failed to delete expired status");
            } else {
                reclaimed += 1;
            }
        }

        info!(reclaimed, ttl_days, "reclaimed expired jobs");
        Ok(reclaimed)
    }
}

fn extract_job_id(location: &str, prefix: &str) -> Option<String> {
    let needle = format!("{prefix}/jobs/");
    let rest = location.strip_prefix(needle.trim_start_matches('/'))?;
    rest.split('/').next().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_shared::types::{JobInputs, JobStatus};
    use object_store::memory::InMemory;

    fn sample_job() -> Job {
        let inputs = JobInputs {
            root_url: "https://docs.example.com/".to_string(),
            max_pages: 100,
            max_depth: 3,
            max_kb: 500,
            respect_robots: true,
            request_full: false,
            language: None,
            user_agent: "docforge/1.0".to_string(),
            request_delay_secs: 0.5,
        };
        Job::new(JobId::new(), inputs, 1_000)
    }

    #[tokio::test]
    async fn memory_store_round_trips_status() {
        let store = MemoryStore::new();
        let job = sample_job();
        store.put_status(&job).await.unwrap();
        let loaded = store.get_status(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
    }

    #[tokio::test]
    async fn memory_store_distinguishes_not_found_from_not_ready() {
        let store = MemoryStore::new();
        let job = sample_job();

        assert!(matches!(
            store.get_artifact(&job.id, ArtifactKind::LlmTxt).await.unwrap(),
            DownloadOutcome::NotFound
        ));

        store.put_status(&job).await.unwrap();
        assert!(matches!(
            store.get_artifact(&job.id, ArtifactKind::LlmTxt).await.unwrap(),
            DownloadOutcome::NotReady
        ));

        let artifact = Artifact::new(ArtifactKind::LlmTxt, "content".to_string(), job.id.clone(), 2_000);
        store.put_artifact(&artifact).await.unwrap();
        assert!(matches!(
            store.get_artifact(&job.id, ArtifactKind::LlmTxt).await.unwrap(),
            DownloadOutcome::Found(_)
        ));
    }

    #[tokio::test]
    async fn memory_store_reclaims_only_jobs_past_ttl() {
        let store = MemoryStore::new();
        let mut old_job = sample_job();
        old_job.status = JobStatus::Completed;
        old_job.completed_at = Some(0);
        store.put_status(&old_job).await.unwrap();

        let mut fresh_job = sample_job();
        fresh_job.status = JobStatus::Completed;
        fresh_job.completed_at = Some(900_000);
        store.put_status(&fresh_job).await.unwrap();

        let reclaimed = store.reclaim_expired(1, 1_000_000).await.unwrap();
        assert_eq!(reclaimed, 1);
        assert!(store.get_status(&old_job.id).await.unwrap().is_none());
        assert!(store.get_status(&fresh_job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn object_store_backend_enforces_blob_before_status_completed() {
        let backend = ObjectStoreBackend::new(Arc::new(InMemory::new()), "test-prefix");
        let mut job = sample_job();

        let artifact = Artifact::new(ArtifactKind::LlmTxt, "hello".to_string(), job.id.clone(), 2_000);
        backend.put_artifact(&artifact).await.unwrap();
        job.status = JobStatus::Completed;
        job.completed_at = Some(2_000);
        backend.put_status(&job).await.unwrap();

        match backend.get_artifact(&job.id, ArtifactKind::LlmTxt).await.unwrap() {
            DownloadOutcome::Found(found) => assert_eq!(found.content, "hello"),
            other => panic!("expected Found, got {other:?}"),
        }
    }
}
