//! Bounded headless-rendering fallback (SPEC_FULL §F, spec.md §4.2).
//!
//! Only reached when static extraction yields too little meaningful text
//! from a page that also carries substantial inline script. Disabled at
//! compile time unless the `render` feature is enabled, and bounded by a
//! strict wall-clock limit so one stuck page cannot stall a job.

use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tracing::{instrument, warn};
use url::Url;

use crate::fetcher::FetchError;

/// Wall-clock ceiling for a single rendering attempt (§4.2).
const RENDER_TIMEOUT_SECS: u64 = 20;

/// Render `url` in a headless Chromium instance and return the resulting
/// DOM's serialized HTML, or a [`FetchError`] if rendering failed or
/// timed out.
#[instrument(skip_all, fields(%url))]
pub async fn render_page(url: &Url) -> Result<String, FetchError> {
    let attempt = tokio::time::timeout(Duration::from_secs(RENDER_TIMEOUT_SECS), render_inner(url));

    match attempt.await {
        Ok(Ok(html)) => Ok(html),
        Ok(Err(message)) => Err(FetchError::Network {
            url: url.to_string(),
            message,
        }),
        Err(_) => {
            warn!(%url, "headless render exceeded wall-clock limit");
            Err(FetchError::Timeout { url: url.to_string() })
        }
    }
}

async fn render_inner(url: &Url) -> Result<String, String> {
    let config = BrowserConfig::builder()
        .build()
        .map_err(|e| format!("failed to build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| format!("failed to launch browser: {e}"))?;

    let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

    let page = browser
        .new_page(url.as_str())
        .await
        .map_err(|e| format!("failed to open page: {e}"))?;
    page.wait_for_navigation()
        .await
        .map_err(|e| format!("navigation failed: {e}"))?;

    let html = page
        .content()
        .await
        .map_err(|e| format!("failed to read rendered content: {e}"))?;

    handler_task.abort();
    Ok(html)
}
