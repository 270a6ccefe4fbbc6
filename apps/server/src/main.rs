//! docforge HTTP API entry point (§6.1).
//!
//! Binds `HOST:PORT` (defaults `0.0.0.0:8080`) and serves
//! `/v1/generations*` against an in-process [`docforge_jobs::JobManager`].

use std::net::SocketAddr;
use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use docforge_server::{AppState, build_app, build_job_manager, build_store, build_summarizer_config, serve, spawn_ttl_reclaimer};
use docforge_shared::ServiceDefaults;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let defaults = ServiceDefaults::from_env().context("invalid service configuration")?;
    let store = build_store(&defaults)?;
    let job_manager = build_job_manager(store.clone());
    let summarizer_config = build_summarizer_config(&defaults);
    let job_ttl_days = defaults.job_ttl_days;

    let state = AppState::new(job_manager, Arc::new(defaults), Arc::new(summarizer_config));
    let app = build_app(state);

    tokio::spawn(spawn_ttl_reclaimer(store, job_ttl_days));

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
    let addr: SocketAddr = format!("{host}:{port}").parse().context("invalid HOST/PORT")?;

    serve(addr, app).await
}

/// Same `EnvFilter` + switchable text/JSON convention as the CLI (§B),
/// driven by `RUST_LOG` and `LOG_FORMAT=json|text` since the server has
/// no CLI flags of its own.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docforge=info"));
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    if json {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
}
