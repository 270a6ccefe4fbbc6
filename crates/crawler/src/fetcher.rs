//! Polite HTTP fetching (C1, §4.2).
//!
//! Per-host concurrency is capped and every host observes a minimum
//! inter-request delay (the max of the configured delay and any
//! `Crawl-delay` the caller supplies). Retries are bounded and happen
//! entirely inside [`Fetcher::fetch`] — they never span a component
//! boundary.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, instrument, warn};
use url::Url;

/// Per-host fetch concurrency ceiling (§4.2).
const MAX_PER_HOST_CONCURRENCY: usize = 4;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const TOTAL_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 2;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(8);
/// Page size cap (§4.2): 5 MiB.
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
/// Heuristic threshold for "substantial" inline script, above which the
/// Orchestrator may attempt the rendering fallback (§4.2).
const SUBSTANTIAL_INLINE_SCRIPT_CHARS: usize = 500;

/// Typed fetch failure (§4.2's contract: `network`, `timeout`,
/// `blocked_by_robots`, `non_html`, `too_large`).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("timeout fetching {url}")]
    Timeout { url: String },
    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: StatusCode },
    #[error("{url} blocked by robots.txt")]
    BlockedByRobots { url: String },
    #[error("{url} has unsupported content-type {content_type}")]
    NonHtml { url: String, content_type: String },
    #[error("{url} exceeded the {limit} byte size cap")]
    TooLarge { url: String, limit: usize },
    #[error("refused to fetch {url}: looks like an SSRF target")]
    SsrfBlocked { url: String },
}

/// A successfully fetched page, ready for the Extractor (C4).
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: Url,
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
    pub elapsed: Duration,
    pub links: Vec<Url>,
    pub content_hash: String,
    /// Set when the page carries a non-trivial amount of inline
    /// `<script>` text, a precondition for the rendering fallback.
    pub has_substantial_inline_script: bool,
}

struct HostState {
    semaphore: Arc<Semaphore>,
    last_fetch: Mutex<Option<Instant>>,
}

/// Politely fetches pages, enforcing per-host concurrency, minimum
/// inter-request delay, retries with backoff, and SSRF/content-type/size
/// gates (§4.2).
pub struct Fetcher {
    client: Client,
    hosts: Mutex<HashMap<String, Arc<HostState>>>,
    allow_private_hosts: bool,
}

impl Fetcher {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            hosts: Mutex::new(HashMap::new()),
            allow_private_hosts: false,
        })
    }

    /// Permit crawling localhost/private IPs — used by integration tests
    /// that point at a `wiremock` server. Not wired into any CLI/API flag;
    /// real deployments never call this.
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }

    /// Fetch `url`, honoring `min_delay` as the floor for this host's
    /// inter-request spacing (the caller combines the configured delay
    /// with any `Crawl-delay` before calling).
    #[instrument(skip(self), fields(%url))]
    pub async fn fetch(&self, url: &Url, min_delay: Duration) -> Result<FetchedPage, FetchError> {
        if !self.allow_private_hosts && is_ssrf_target(url) {
            warn!(%url, "SSRF protection: refusing to fetch");
            return Err(FetchError::SsrfBlocked {
                url: url.to_string(),
            });
        }

        let host_state = self.host_state(url).await;
        let _permit = host_state.semaphore.acquire().await.expect("semaphore closed");
        self.wait_for_host_slot(&host_state, min_delay).await;

        let mut attempt = 0u32;
        loop {
            let start = Instant::now();
            match self.try_fetch_once(url).await {
                Ok(page) => return Ok(page),
                Err(err) if attempt < MAX_RETRIES && is_retryable(&err) => {
                    let backoff = retry_after(&err).unwrap_or_else(|| backoff_with_jitter(attempt));
                    debug!(%url, attempt, backoff_ms = backoff.as_millis(), "retrying fetch");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                    let _ = start.elapsed();
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn host_state(&self, url: &Url) -> Arc<HostState> {
        let host = url.host_str().unwrap_or("").to_string();
        let mut hosts = self.hosts.lock().await;
        hosts
            .entry(host)
            .or_insert_with(|| {
                Arc::new(HostState {
                    semaphore: Arc::new(Semaphore::new(MAX_PER_HOST_CONCURRENCY)),
                    last_fetch: Mutex::new(None),
                })
            })
            .clone()
    }

    async fn wait_for_host_slot(&self, host_state: &HostState, min_delay: Duration) {
        let mut last = host_state.last_fetch.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < min_delay {
                tokio::time::sleep(min_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn try_fetch_once(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let start = Instant::now();
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| to_fetch_error(url, e))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if status.as_u16() == 429 || status.is_server_error() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FetchError::Network {
                url: url.to_string(),
                message: format!(
                    "HTTP {status}{}",
                    retry_after
                        .map(|d| format!(" (retry-after {}s)", d.as_secs()))
                        .unwrap_or_default()
                ),
            });
        }

        if !status.is_success() {
            // Non-429/5xx client errors are not retried (§4.2).
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        if let Some(ct) = &content_type {
            if !is_supported_content_type(ct) {
                return Err(FetchError::NonHtml {
                    url: url.to_string(),
                    content_type: ct.clone(),
                });
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| to_fetch_error(url, e))?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: MAX_BODY_BYTES,
            });
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();
        let doc = Html::parse_document(&body);
        let links = extract_links(&doc, url);
        let content_hash = compute_hash(&body);
        let has_substantial_inline_script = inline_script_chars(&doc) > SUBSTANTIAL_INLINE_SCRIPT_CHARS;

        Ok(FetchedPage {
            url: url.clone(),
            status,
            content_type,
            body,
            elapsed: start.elapsed(),
            links,
            content_hash,
            has_substantial_inline_script,
        })
    }
}

fn to_fetch_error(url: &Url, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout { url: url.to_string() }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Network { .. } | FetchError::Timeout { .. } => true,
        FetchError::HttpStatus { status, .. } => {
            status.as_u16() == 429 || status.is_server_error()
        }
        _ => false,
    }
}

fn retry_after(err: &FetchError) -> Option<Duration> {
    if let FetchError::Network { message, .. } = err {
        let start = message.find("retry-after ")? + "retry-after ".len();
        let rest = &message[start..];
        let end = rest.find('s')?;
        rest[..end].parse::<u64>().ok().map(Duration::from_secs)
    } else {
        None
    }
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE * 2u32.saturating_pow(attempt);
    let capped = exp.min(BACKOFF_CAP);
    let jitter_ms = (capped.as_millis() as u64 / 4).max(1);
    let jitter = Duration::from_millis(deterministic_jitter(attempt) % jitter_ms);
    capped + jitter
}

/// A small, non-cryptographic jitter source. Retries are already rare and
/// bounded; this just avoids perfectly lockstepped retries across hosts
/// without pulling in a random number generator crate.
fn deterministic_jitter(attempt: u32) -> u64 {
    let nanos = Instant::now().elapsed().subsec_nanos() as u64;
    nanos.wrapping_add(attempt as u64 * 2654435761)
}

fn is_supported_content_type(content_type: &str) -> bool {
    let base = content_type.split(';').next().unwrap_or("").trim();
    matches!(base, "text/html" | "application/xhtml+xml" | "text/plain")
}

fn inline_script_chars(doc: &Html) -> usize {
    let sel = Selector::parse("script:not([src])").unwrap();
    doc.select(&sel)
        .map(|el| el.text().collect::<String>().len())
        .sum()
}

/// Extract all links from a document, resolved against the base URL.
fn extract_links(doc: &Html, base_url: &Url) -> Vec<Url> {
    let link_sel = Selector::parse("a[href]").unwrap();
    let mut links = Vec::new();

    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
                continue;
            }
            if let Ok(mut resolved) = base_url.join(href) {
                resolved.set_fragment(None);
                links.push(resolved);
            }
        }
    }

    links
}

fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check if a URL targets a potentially dangerous resource (SSRF guard).
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn ssrf_blocks_non_http_scheme() {
        let url = Url::parse("file:///etc/passwd").unwrap();
        assert!(is_ssrf_target(&url));
    }

    #[test]
    fn ssrf_blocks_private_ip() {
        assert!(is_ssrf_target(&Url::parse("http://192.168.1.1/admin").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://10.0.0.1/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://127.0.0.1:8080/").unwrap()));
    }

    #[test]
    fn ssrf_blocks_localhost_hostname() {
        assert!(is_ssrf_target(&Url::parse("http://localhost:3000/api").unwrap()));
    }

    #[test]
    fn ssrf_allows_public_host() {
        assert!(!is_ssrf_target(&Url::parse("https://docs.example.com/page").unwrap()));
    }

    #[test]
    fn content_type_gate_accepts_html_and_rejects_json() {
        assert!(is_supported_content_type("text/html; charset=utf-8"));
        assert!(is_supported_content_type("text/plain"));
        assert!(!is_supported_content_type("application/json"));
    }

    #[test]
    fn extract_links_resolves_and_skips_noise() {
        let html = r##"<html><body>
            <a href="/page2">Page 2</a>
            <a href="https://external.com">External</a>
            <a href="#section">Anchor</a>
            <a href="mailto:a@b.com">Mail</a>
        </body></html>"##;
        let doc = Html::parse_document(html);
        let base = Url::parse("https://docs.example.com/page1").unwrap();
        let links = extract_links(&doc, &base);

        assert!(links.iter().any(|l| l.as_str() == "https://docs.example.com/page2"));
        assert!(links.iter().any(|l| l.as_str() == "https://external.com/"));
        assert_eq!(links.len(), 2);
    }

    #[tokio::test]
    async fn fetch_retrieves_page_and_extracts_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><main><h1>Hi</h1><a href="/docs/next">Next</a></main></body></html>"#,
            ))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("docforge-test/1.0").unwrap().allow_private_hosts();
        let url = Url::parse(&server.uri()).unwrap();
        let page = fetcher.fetch(&url, Duration::ZERO).await.unwrap();

        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.links.len(), 1);
        assert!(!page.content_hash.is_empty());
    }

    #[tokio::test]
    async fn fetch_rejects_oversized_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("{}")
                    .insert_header("content-type", "application/json"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("docforge-test/1.0").unwrap().allow_private_hosts();
        let url = Url::parse(&server.uri()).unwrap();
        let err = fetcher.fetch(&url, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, FetchError::NonHtml { .. }));
    }

    #[tokio::test]
    async fn fetch_does_not_retry_plain_4xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("docforge-test/1.0").unwrap().allow_private_hosts();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = fetcher.fetch(&url, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { .. }));
    }
}
