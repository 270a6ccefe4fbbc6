//! HTTP API (§6.1): the only external surface the job manager exposes.
//! The front-end, MCP adapter, and CLI are all clients of this service.

mod error;
mod job_runner;
mod progress;
mod rate_limit;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use color_eyre::eyre::{Context, Result, eyre};
use docforge_jobs::{ArtifactStore, JobManager, MemoryStore, ObjectStoreBackend};
use docforge_shared::ServiceDefaults;
use docforge_shared::config::StorageBackend;
use docforge_summarizer::SummarizerConfig;
use rate_limit::RateLimiter;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use state::AppState;

/// Build the Artifact Store backend named by `defaults.storage_backend`
/// (§4.8, §6.2).
pub fn build_store(defaults: &ServiceDefaults) -> Result<Arc<dyn ArtifactStore>> {
    match defaults.storage_backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::ObjectStore => {
            let bucket = defaults
                .object_store_bucket
                .clone()
                .ok_or_else(|| eyre!("OBJECT_STORE_BUCKET is required when STORAGE_BACKEND=object_store"))?;

            let mut builder = object_store::aws::AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(region) = &defaults.object_store_region {
                builder = builder.with_region(region.clone());
            }
            let backend = builder.build().context("failed to build object-store backend")?;
            Ok(Arc::new(ObjectStoreBackend::new(Arc::new(backend), defaults.object_store_prefix.clone())))
        }
    }
}

/// Assemble the axum [`Router`], ready for `axum::serve`. Applies per-IP
/// rate limiting (§6.1 `429`), request tracing, and a permissive CORS
/// policy (the front-end is a separate origin and out of scope here).
pub fn build_app(state: AppState) -> Router {
    let limiter = Arc::new(RateLimiter::new());
    routes::router()
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit::enforce))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Periodically reclaim artifact-store entries past `job_ttl_days`
/// (§4.8 "Optional TTL policy"). Runs until the process exits.
pub async fn spawn_ttl_reclaimer(store: Arc<dyn ArtifactStore>, job_ttl_days: u32) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        interval.tick().await;
        let now = chrono::Utc::now().timestamp();
        match store.reclaim_expired(job_ttl_days as i64, now).await {
            Ok(reclaimed) if reclaimed > 0 => info!(reclaimed, "reclaimed expired jobs"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "TTL reclamation pass failed"),
        }
    }
}

/// Bind and serve the HTTP API on `addr`. Runs until the process is killed.
pub async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind HTTP listener")?;
    info!(%addr, "docforge HTTP API listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("HTTP server error")?;
    Ok(())
}

/// Build the default [`JobManager`] from process-wide [`ServiceDefaults`].
pub fn build_job_manager(store: Arc<dyn ArtifactStore>) -> Arc<JobManager> {
    Arc::new(JobManager::new(store))
}

/// Build the [`SummarizerConfig`] from process-wide defaults.
pub fn build_summarizer_config(defaults: &ServiceDefaults) -> SummarizerConfig {
    SummarizerConfig::new(defaults.llm_api_base.clone(), defaults.llm_api_key.clone(), defaults.llm_model_id.clone())
}
