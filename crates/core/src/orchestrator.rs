//! Orchestrator (C9, spec.md §4.9): wires C1-C8 into the end-to-end
//! pipeline for one job.
//!
//! `run_generation` is storage-agnostic: it returns finished artifact
//! bytes and counters rather than writing them anywhere itself. Callers
//! decide what "durable" means — `apps/server` persists through a
//! [`docforge_jobs::JobManager`]; `apps/cli` writes straight to disk.
//! This mirrors the teacher's `add_kb`/`ProgressReporter` split, widened
//! from one-shot KB assembly to the job pipeline described in SPEC_FULL.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use docforge_composer::{ComposeContext, compose_llms_full_txt, compose_llms_txt};
use docforge_crawler::{FetchError, FetchedPage, Fetcher, Frontier, score_url};
use docforge_shared::error::{DocforgeError, Result};
use docforge_shared::types::{CodeBlock, ExtractionStatus, Heading, JobInputs, JobPhase, Page};
use docforge_summarizer::SummarizerConfig;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use url::Url;

/// Default per-job wall-clock ceiling (spec.md §5), used by callers that
/// don't have a more specific configured value.
pub const DEFAULT_JOB_CEILING_SECS: u64 = 180;

/// Global crawl concurrency ceiling (spec.md §5: "global concurrency limit
/// (configurable, default 16)"). The per-host cap of 4 lives in
/// [`Fetcher`] itself; this bounds how many fetches the orchestrator keeps
/// in flight across all hosts at once.
const GLOBAL_FETCH_CONCURRENCY: usize = 16;

/// Progress sink the orchestrator drives as it works. Implementations
/// translate these calls into whatever the caller actually persists —
/// a [`docforge_jobs::JobManager`] for the server, a spinner for the CLI.
pub trait ProgressReporter: Send + Sync {
    /// Entering a new pipeline phase (spec.md §4.9 phase list).
    fn phase(&self, phase: JobPhase);
    /// Counter/progress update, emitted after each crawl step.
    fn record(&self, pages_discovered: u32, pages_processed: u32, pages_crawled: u32, current_page_url: Option<&str>);
    /// Append a line to the job's processing log.
    fn log(&self, line: &str);
    /// Polled at each suspension point (spec.md §5). Default: never cancelled.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// No-op progress sink for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: JobPhase) {}
    fn record(&self, _pages_discovered: u32, _pages_processed: u32, _pages_crawled: u32, _current_page_url: Option<&str>) {}
    fn log(&self, _line: &str) {}
}

/// Finished output of one generation run.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub llm_txt: String,
    pub llms_full_txt: Option<String>,
    pub pages_discovered: u32,
    pub pages_processed: u32,
    pub pages_crawled: u32,
    pub total_size_kb: u64,
}

/// Run one job's generation pipeline end to end, bounded by `ceiling`
/// (spec.md §5 "per-job wall-clock ceiling"). On timeout, returns
/// [`DocforgeError::Timeout`] — the caller maps this to `failed` with
/// reason `timeout`, per spec.md §5.
#[instrument(skip(inputs, summarizer_config, progress), fields(root_url = %inputs.root_url))]
pub async fn run_generation(
    inputs: &JobInputs,
    summarizer_config: &SummarizerConfig,
    ceiling: Duration,
    progress: &dyn ProgressReporter,
) -> Result<GenerationOutput> {
    let fetcher = Fetcher::new(&inputs.user_agent).map_err(|e| DocforgeError::Fetch(e.to_string()))?;
    match tokio::time::timeout(ceiling, run_inner(inputs, summarizer_config, progress, fetcher)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("job exceeded wall-clock ceiling of {:?}", ceiling);
            Err(DocforgeError::Timeout("job exceeded wall-clock ceiling".to_string()))
        }
    }
}

async fn run_inner(inputs: &JobInputs, summarizer_config: &SummarizerConfig, progress: &dyn ProgressReporter, fetcher: Fetcher) -> Result<GenerationOutput> {
    let seed = Url::parse(&inputs.root_url).map_err(|e| DocforgeError::input(format!("invalid root url: {e}")))?;

    progress.phase(JobPhase::Initializing);
    let discovery_client = reqwest::Client::builder()
        .user_agent(inputs.user_agent.clone())
        .build()
        .map_err(|e| DocforgeError::Fetch(format!("failed to build HTTP client: {e}")))?;

    let fetched_robots = docforge_robots::fetch_robots(&discovery_client, &seed, &inputs.user_agent).await;
    let sitemap_urls = docforge_robots::discover_sitemap_urls(&discovery_client, &seed, &fetched_robots)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "sitemap discovery failed, continuing without it");
            Vec::new()
        });
    let robots = if inputs.respect_robots {
        fetched_robots
    } else {
        docforge_robots::RobotsRules::allow_all()
    };

    let mut frontier = Frontier::new(&seed, inputs.max_pages, inputs.max_depth);
    frontier.enqueue(&seed, 0, false, &robots);
    let mut seeded: HashSet<String> = HashSet::new();
    for url in &sitemap_urls {
        if seeded.insert(url.to_string()) {
            frontier.enqueue(url, 1, true, &robots);
        }
    }

    progress.phase(JobPhase::Crawling);
    let min_delay = Duration::from_secs_f64(inputs.request_delay_secs.max(0.0))
        .max(robots.crawl_delay().unwrap_or(Duration::ZERO));

    let mut pages: Vec<Page> = Vec::new();
    let mut pages_processed = 0u32;
    let mut pages_crawled = 0u32;

    // Fetches run concurrently, bounded by a global ceiling on top of the
    // per-host semaphore inside `Fetcher` (spec.md §5). The frontier itself
    // stays single-threaded: only this loop pops from or enqueues onto it,
    // so newly discovered links are folded back in between completions.
    let fetcher = Arc::new(fetcher);
    let mut in_flight: JoinSet<(Url, u32, bool, std::result::Result<FetchedPage, FetchError>)> = JoinSet::new();

    loop {
        if progress.is_cancelled() {
            return Err(DocforgeError::Cancelled("cancelled during crawl".to_string()));
        }

        while in_flight.len() < GLOBAL_FETCH_CONCURRENCY {
            let Some((url, depth, in_sitemap)) = frontier.pop() else {
                break;
            };
            let fetcher = Arc::clone(&fetcher);
            let fetch_url = url.clone();
            in_flight.spawn(async move {
                let result = fetcher.fetch(&fetch_url, min_delay).await;
                (url, depth, in_sitemap, result)
            });
        }

        let Some(joined) = in_flight.join_next().await else {
            break;
        };
        let (url, depth, in_sitemap, fetch_result) =
            joined.map_err(|e| DocforgeError::Fetch(format!("fetch task panicked: {e}")))?;

        match fetch_result {
            Ok(fetched) => {
                pages_processed += 1;
                let extracted = extract_with_fallback(&url, &fetched).await;

                if matches!(extracted.status, ExtractionStatus::Ok | ExtractionStatus::RenderedFallback) {
                    pages_crawled += 1;
                }

                let priority_score = score_url(&url, depth, in_sitemap);
                pages.push(Page {
                    url: url.to_string(),
                    depth,
                    content_type: fetched.content_type.clone(),
                    title: extracted.title,
                    markdown: extracted.markdown,
                    headings: extracted.headings,
                    code_blocks: extracted.code_blocks,
                    status: extracted.status,
                    priority_score,
                    in_sitemap,
                });

                for link in &fetched.links {
                    frontier.enqueue(link, depth + 1, false, &robots);
                }
            }
            Err(err) => {
                pages_processed += 1;
                progress.log(&format!("fetch failed for {url}: {err}"));
                record_fetch_error(&mut pages, &url, depth, in_sitemap, &err);
            }
        }

        progress.record(frontier.discovered(), pages_processed, pages_crawled, Some(url.as_str()));
    }

    progress.phase(JobPhase::Extracting);
    progress.phase(JobPhase::Composing);
    if progress.is_cancelled() {
        return Err(DocforgeError::Cancelled("cancelled before composition".to_string()));
    }

    let usable_pages: Vec<Page> = pages
        .into_iter()
        .filter(|p| matches!(p.status, ExtractionStatus::Ok | ExtractionStatus::RenderedFallback) && !p.markdown.trim().is_empty())
        .collect();

    if usable_pages.is_empty() {
        return Err(DocforgeError::Composition("no page yielded usable content".to_string()));
    }

    let site_title = seed.host_str().unwrap_or("Documentation").to_string();
    let compose_ctx = ComposeContext {
        site_title,
        root_url: inputs.root_url.clone(),
        size_cap_kb: inputs.max_kb.min(u32::MAX as u64) as u32,
    };

    let summarizer_client = reqwest::Client::new();
    let llm_txt = compose_llms_txt(&compose_ctx, &usable_pages, &summarizer_client, summarizer_config)
        .await
        .map_err(|e| DocforgeError::Composition(e.to_string()))?;

    let llms_full_txt = if inputs.request_full {
        Some(compose_llms_full_txt(&compose_ctx, &usable_pages).map_err(|e| DocforgeError::Composition(e.to_string()))?)
    } else {
        None
    };

    let total_size_kb = ((llm_txt.markdown.len() + llms_full_txt.as_ref().map(|o| o.markdown.len()).unwrap_or(0)) as u64) / 1024;

    info!(
        pages_discovered = frontier.discovered(),
        pages_processed,
        pages_crawled,
        total_size_kb,
        "generation complete"
    );

    Ok(GenerationOutput {
        llm_txt: llm_txt.markdown,
        llms_full_txt: llms_full_txt.map(|o| o.markdown),
        pages_discovered: frontier.discovered(),
        pages_processed,
        pages_crawled,
        total_size_kb,
    })
}

struct Extracted {
    title: Option<String>,
    markdown: String,
    headings: Vec<Heading>,
    code_blocks: Vec<CodeBlock>,
    status: ExtractionStatus,
}

/// Extract static content, falling back to headless rendering when the
/// static pass yields nothing and the page carries substantial inline
/// script (spec.md §4.2). The rendering attempt itself is compiled in
/// only when the `render` feature is enabled.
async fn extract_with_fallback(url: &Url, fetched: &docforge_crawler::FetchedPage) -> Extracted {
    let result = docforge_markdown::extract(&fetched.body, url.as_str());

    if matches!(result.status, ExtractionStatus::Empty) && fetched.has_substantial_inline_script {
        #[cfg(feature = "render")]
        {
            if let Ok(html) = docforge_crawler::render::render_page(url).await {
                let rendered = docforge_markdown::extract(&html, url.as_str());
                if matches!(rendered.status, ExtractionStatus::Ok) {
                    return Extracted {
                        title: rendered.title,
                        markdown: rendered.markdown,
                        headings: rendered.headings,
                        code_blocks: rendered.code_blocks,
                        status: ExtractionStatus::RenderedFallback,
                    };
                }
            }
        }
    }

    Extracted {
        title: result.title,
        markdown: result.markdown,
        headings: result.headings,
        code_blocks: result.code_blocks,
        status: result.status,
    }
}

fn record_fetch_error(pages: &mut Vec<Page>, url: &Url, depth: u32, in_sitemap: bool, err: &FetchError) {
    let status = match err {
        FetchError::BlockedByRobots { .. } => ExtractionStatus::SkippedByRobots,
        _ => ExtractionStatus::FetchError,
    };
    pages.push(Page {
        url: url.to_string(),
        depth,
        content_type: None,
        title: None,
        markdown: String::new(),
        headings: Vec::new(),
        code_blocks: Vec::new(),
        status,
        priority_score: score_url(url, depth, in_sitemap),
        in_sitemap,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_shared::types::JobInputs;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn inputs_for(root_url: String) -> JobInputs {
        JobInputs {
            root_url,
            max_pages: 10,
            max_depth: 2,
            max_kb: 50,
            respect_robots: true,
            request_full: true,
            language: None,
            user_agent: "docforge-test/1.0".to_string(),
            request_delay_secs: 0.0,
        }
    }

    #[tokio::test]
    async fn run_generation_composes_artifacts_from_a_small_site() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap_index.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><main><h1>Guide</h1><p>Enough words to pass the minimum content length threshold required by the extractor before it marks a page as usable rather than empty, over and over.</p></main></body></html>",
            ).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "summary"}}]
            })))
            .mount(&server)
            .await;

        let inputs = inputs_for(server.uri());
        let summarizer_config = SummarizerConfig::new(server.uri(), None, "test-model");
        let fetcher = Fetcher::new(&inputs.user_agent).unwrap().allow_private_hosts();

        let result = run_inner(&inputs, &summarizer_config, &SilentProgress, fetcher).await;
        let output = result.expect("generation should succeed against a minimal mocked site");
        assert!(output.llm_txt.contains("Guide") || !output.llm_txt.is_empty());
        assert_eq!(output.pages_crawled, 1);
    }

    #[tokio::test]
    async fn run_generation_times_out_under_a_tight_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let inputs = inputs_for(server.uri());
        let summarizer_config = SummarizerConfig::new(server.uri(), None, "test-model");

        let result = run_generation(&inputs, &summarizer_config, Duration::from_millis(50), &SilentProgress).await;
        assert!(matches!(result, Err(DocforgeError::Timeout(_))));
    }

    #[tokio::test]
    async fn run_generation_fails_with_no_usable_content_on_empty_site() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>").insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let inputs = inputs_for(server.uri());
        let summarizer_config = SummarizerConfig::new(server.uri(), None, "test-model");
        let fetcher = Fetcher::new(&inputs.user_agent).unwrap().allow_private_hosts();

        let result = run_inner(&inputs, &summarizer_config, &SilentProgress, fetcher).await;
        assert!(matches!(result, Err(DocforgeError::Composition(_))));
    }

    #[tokio::test]
    async fn crawl_fetches_discovered_links_concurrently() {
        let server = MockServer::start().await;
        let page_delay = Duration::from_millis(200);

        Mock::given(method("GET")).and(path("/robots.txt")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        Mock::given(method("GET")).and(path("/sitemap.xml")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        Mock::given(method("GET")).and(path("/sitemap_index.xml")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(page_delay)
                    .set_body_string(
                        "<html><body><main><h1>Root</h1><p>Enough words to clear the extractor's \
                         minimum content length before it is treated as usable rather than empty.</p>\
                         <a href=\"/page1\">1</a><a href=\"/page2\">2</a><a href=\"/page3\">3</a>\
                         <a href=\"/page4\">4</a></main></body></html>",
                    )
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
        for n in 1..=4 {
            Mock::given(method("GET"))
                .and(path(format!("/page{n}")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_delay(page_delay)
                        .set_body_string(format!(
                            "<html><body><main><h1>Page {n}</h1><p>Enough words to clear the \
                             extractor's minimum content length before it is treated as usable \
                             rather than empty, repeated for good measure here.</p></main></body></html>"
                        ))
                        .insert_header("content-type", "text/html"),
                )
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "summary"}}]
            })))
            .mount(&server)
            .await;

        let inputs = inputs_for(server.uri());
        let summarizer_config = SummarizerConfig::new(server.uri(), None, "test-model");
        let fetcher = Fetcher::new(&inputs.user_agent).unwrap().allow_private_hosts();

        let start = std::time::Instant::now();
        let result = run_inner(&inputs, &summarizer_config, &SilentProgress, fetcher).await;
        let elapsed = start.elapsed();

        let output = result.expect("generation should succeed against a 5-page mocked site");
        assert_eq!(output.pages_crawled, 5);
        // Five pages at 200ms each run sequentially in >= 1s; concurrent
        // fetching (per-host cap of 4) should finish well under that, in
        // roughly two delay rounds (root, then the four children at once).
        assert!(elapsed < Duration::from_millis(800), "crawl took {elapsed:?}, expected concurrent fetches to finish faster");
    }
}
