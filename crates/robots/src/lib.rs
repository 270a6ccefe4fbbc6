//! Robots & Sitemap (C2, §4.1): fetches and parses `robots.txt`, exposes
//! `is_allowed`/`crawl_delay`, and discovers sitemap URLs.
//!
//! Sitemap discovery order, per §4.1: `robots.txt` `Sitemap:` entries, then
//! `/sitemap.xml`, then `/sitemap_index.xml`. Sitemap index files are
//! expanded one level. Sitemap URLs are filtered to the seed's registrable
//! domain.

mod robots_txt;
mod sitemap;

use std::time::Duration;

use docforge_shared::{DocforgeError, Result};
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

pub use robots_txt::{parse as parse_robots_txt, RobotsRules};
pub use sitemap::SitemapKind;

const FETCH_TIMEOUT_SECS: u64 = 10;
/// Sitemap index files are expanded only one level deep (§4.1).
const MAX_INDEX_DEPTH: usize = 1;
/// Hard ceiling on discovered sitemap URLs, independent of `max_pages`,
/// so a pathological sitemap cannot balloon memory before the frontier
/// gets a chance to apply its own cap.
const MAX_SITEMAP_URLS: usize = 20_000;

/// Fetch and parse `robots.txt` for `seed`'s origin.
///
/// If the document cannot be fetched, returns [`RobotsRules::allow_all`]
/// and logs a warning, per §4.1 ("If robots cannot be fetched ... treat as
/// allow all but log a warning").
#[instrument(skip(client), fields(origin = %origin_of(seed)))]
pub async fn fetch_robots(client: &Client, seed: &Url, user_agent: &str) -> RobotsRules {
    let url = match robots_txt_url(seed) {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "cannot derive robots.txt URL; allowing all");
            return RobotsRules::allow_all();
        }
    };

    match fetch_text(client, &url).await {
        Ok(body) => robots_txt::parse(&body, user_agent),
        Err(e) => {
            warn!(%url, error = %e, "robots.txt unreachable; allowing all");
            RobotsRules::allow_all()
        }
    }
}

/// Discover sitemap page URLs reachable from `seed`, restricted to its
/// registrable domain (§4.1).
#[instrument(skip(client, robots))]
pub async fn discover_sitemap_urls(
    client: &Client,
    seed: &Url,
    robots: &RobotsRules,
) -> Result<Vec<Url>> {
    let mut candidate_sitemaps: Vec<String> = robots.sitemaps.clone();
    if candidate_sitemaps.is_empty() {
        let origin = origin_of(seed);
        candidate_sitemaps.push(format!("{origin}/sitemap.xml"));
        candidate_sitemaps.push(format!("{origin}/sitemap_index.xml"));
    }

    let domain = registrable_domain(seed);
    let mut urls = Vec::new();
    let mut seen_sitemaps = std::collections::HashSet::new();

    for sm_url in candidate_sitemaps {
        if urls.len() >= MAX_SITEMAP_URLS {
            break;
        }
        expand_sitemap(client, &sm_url, domain.as_deref(), 0, &mut urls, &mut seen_sitemaps).await;
    }

    Ok(urls)
}

/// Recursively expand a sitemap document, following one level of
/// sitemap-index nesting.
async fn expand_sitemap(
    client: &Client,
    sm_url: &str,
    domain: Option<&str>,
    depth: usize,
    out: &mut Vec<Url>,
    seen: &mut std::collections::HashSet<String>,
) {
    if !seen.insert(sm_url.to_string()) {
        return;
    }
    let Ok(body) = fetch_text(client, sm_url).await else {
        debug!(sm_url, "sitemap unreachable, skipping");
        return;
    };

    match sitemap::classify(&body) {
        SitemapKind::Index if depth < MAX_INDEX_DEPTH => {
            for loc in sitemap::extract_locs(&body) {
                if out.len() >= MAX_SITEMAP_URLS {
                    return;
                }
                Box::pin(expand_sitemap(client, &loc, domain, depth + 1, out, seen)).await;
            }
        }
        _ => {
            for loc in sitemap::extract_locs(&body) {
                if out.len() >= MAX_SITEMAP_URLS {
                    return;
                }
                if let Ok(url) = Url::parse(&loc) {
                    if domain.is_none() || registrable_domain(&url).as_deref() == domain {
                        out.push(url);
                    }
                }
            }
        }
    }
}

async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .send()
        .await
        .map_err(|e| DocforgeError::Discovery(format!("{url}: {e}")))?;

    if !resp.status().is_success() {
        return Err(DocforgeError::Discovery(format!(
            "{url}: HTTP {}",
            resp.status()
        )));
    }

    resp.text()
        .await
        .map_err(|e| DocforgeError::Discovery(format!("{url}: body read failed: {e}")))
}

fn robots_txt_url(seed: &Url) -> Result<String> {
    Ok(format!("{}/robots.txt", origin_of_checked(seed)?))
}

fn origin_of_checked(url: &Url) -> Result<String> {
    if url.host_str().is_none() {
        return Err(DocforgeError::input(format!("URL has no host: {url}")));
    }
    Ok(origin_of(url))
}

fn origin_of(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    }
}

/// Approximate registrable domain: the last two labels of the host
/// (`docs.example.com` → `example.com`). Good enough for same-site
/// sitemap/frontier scoping without pulling in a public-suffix list.
fn registrable_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        Some(host.to_ascii_lowercase())
    } else {
        Some(labels[labels.len() - 2..].join(".").to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> Client {
        Client::builder().build().unwrap()
    }

    #[test]
    fn registrable_domain_strips_subdomain() {
        let url = Url::parse("https://docs.example.com/guide").unwrap();
        assert_eq!(registrable_domain(&url).as_deref(), Some("example.com"));
    }

    #[tokio::test]
    async fn fetch_robots_falls_back_to_allow_all_when_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let seed = Url::parse(&server.uri()).unwrap();
        let rules = fetch_robots(&client(), &seed, "docforge/1.0").await;
        assert!(rules.is_allowed("/anything"));
    }

    #[tokio::test]
    async fn fetch_robots_parses_disallow() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /private/\n"),
            )
            .mount(&server)
            .await;

        let seed = Url::parse(&server.uri()).unwrap();
        let rules = fetch_robots(&client(), &seed, "docforge/1.0").await;
        assert!(!rules.is_allowed("/private/secret"));
        assert!(rules.is_allowed("/docs/guide"));
    }

    #[tokio::test]
    async fn discover_sitemap_urls_follows_robots_entry() {
        let server = MockServer::start().await;
        let sitemap_xml = format!(
            "<urlset><url><loc>{}/docs/a</loc></url><url><loc>{}/docs/b</loc></url></urlset>",
            server.uri(),
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/my-sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap_xml))
            .mount(&server)
            .await;

        let seed = Url::parse(&server.uri()).unwrap();
        let mut robots = RobotsRules::allow_all();
        robots.sitemaps = vec![format!("{}/my-sitemap.xml", server.uri())];

        let urls = discover_sitemap_urls(&client(), &seed, &robots).await.unwrap();
        assert_eq!(urls.len(), 2);
    }

    #[tokio::test]
    async fn discover_sitemap_urls_falls_back_to_default_paths() {
        let server = MockServer::start().await;
        let sitemap_xml = format!(
            "<urlset><url><loc>{}/docs/a</loc></url></urlset>",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap_xml))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap_index.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let seed = Url::parse(&server.uri()).unwrap();
        let robots = RobotsRules::allow_all();
        let urls = discover_sitemap_urls(&client(), &seed, &robots).await.unwrap();
        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn discover_sitemap_urls_expands_index_one_level() {
        let server = MockServer::start().await;
        let index_xml = format!(
            "<sitemapindex><sitemap><loc>{}/sitemap-a.xml</loc></sitemap></sitemapindex>",
            server.uri()
        );
        let leaf_xml = format!(
            "<urlset><url><loc>{}/docs/a</loc></url></urlset>",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap_index.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index_xml))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap-a.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(leaf_xml))
            .mount(&server)
            .await;

        let seed = Url::parse(&server.uri()).unwrap();
        let robots = RobotsRules::allow_all();
        let urls = discover_sitemap_urls(&client(), &seed, &robots).await.unwrap();
        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn discover_sitemap_urls_filters_off_domain() {
        let server = MockServer::start().await;
        let sitemap_xml = format!(
            "<urlset><url><loc>{}/docs/a</loc></url><url><loc>https://evil.test/x</loc></url></urlset>",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap_xml))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap_index.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let seed = Url::parse(&server.uri()).unwrap();
        let robots = RobotsRules::allow_all();
        let urls = discover_sitemap_urls(&client(), &seed, &robots).await.unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].as_str().contains("/docs/a"));
    }
}
