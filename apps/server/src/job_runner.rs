//! Drives one job's [`docforge_core::run_generation`] to completion and
//! reconciles the result with the Job Manager + Artifact Store, honoring
//! the write-ordering invariant (§4.8: blobs before `status=completed`).

use chrono::Utc;
use docforge_shared::{Artifact, ArtifactKind, DocforgeError, JobId};
use tracing::{info, instrument, warn};

use crate::progress::JobManagerProgress;
use crate::state::AppState;

#[instrument(skip(state), fields(%job_id))]
pub async fn run_job(job_id: JobId, state: AppState) {
    let Some(job) = state.job_manager.get(&job_id).await else {
        warn!(%job_id, "job vanished before it could start");
        return;
    };

    if let Err(e) = state.job_manager.start(&job_id).await {
        warn!(%job_id, error = %e, "failed to transition job to running");
        return;
    }

    let (progress, tasks) = JobManagerProgress::spawn(job_id, state.job_manager.clone());
    let result = docforge_core::run_generation(&job.inputs, &state.summarizer_config, state.job_ceiling, &progress).await;
    drop(progress);
    tasks.finish().await;

    match result {
        Ok(output) => finish_success(&state, job_id, output).await,
        Err(DocforgeError::Cancelled(reason)) => {
            info!(%job_id, %reason, "job cancelled");
            let _ = state.job_manager.mark_cancelled(&job_id).await;
        }
        Err(e) => {
            let _ = state.job_manager.fail(&job_id, e.code(), e.to_string()).await;
        }
    }
}

async fn finish_success(state: &AppState, job_id: JobId, output: docforge_core::GenerationOutput) {
    let now = Utc::now().timestamp();

    let llm_artifact = Artifact::new(ArtifactKind::LlmTxt, output.llm_txt, job_id, now);
    if let Err(e) = state.job_manager.store().put_artifact(&llm_artifact).await {
        let _ = state.job_manager.fail(&job_id, "store_error", e.to_string()).await;
        return;
    }

    let mut llms_full_txt_url = None;
    if let Some(full_markdown) = output.llms_full_txt {
        let full_artifact = Artifact::new(ArtifactKind::LlmsFullTxt, full_markdown, job_id, now);
        if let Err(e) = state.job_manager.store().put_artifact(&full_artifact).await {
            let _ = state.job_manager.fail(&job_id, "store_error", e.to_string()).await;
            return;
        }
        llms_full_txt_url = Some(state.download_url(job_id, ArtifactKind::LlmsFullTxt));
    }

    let llm_txt_url = state.download_url(job_id, ArtifactKind::LlmTxt);
    if let Err(e) = state
        .job_manager
        .complete(&job_id, llm_txt_url, llms_full_txt_url, output.total_size_kb)
        .await
    {
        warn!(%job_id, error = %e, "failed to flip job to completed after artifacts were written");
    }
}
