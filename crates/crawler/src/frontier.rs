//! Bounded, scored BFS queue (C3, §4.3).
//!
//! Keyed by canonical URL. Enqueue rejects URLs that are already seen,
//! too deep, off the seed's registrable domain, or disallowed by robots.
//! Pop order favors shallow, doc-ish, sitemap-listed pages; ties break on
//! enqueue order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use docforge_robots::RobotsRules;
use docforge_shared::types::Page;
use url::Url;

const DOC_KEYWORDS: &[&str] = &["doc", "docs", "guide", "reference", "api", "tutorial"];
const DEPRIORITIZED_KEYWORDS: &[&str] = &["blog", "changelog", "news", "release-notes", "archive"];

const DEPTH_PENALTY_WEIGHT: f64 = 2.0;
const DOC_KEYWORD_BONUS: f64 = 5.0;
const SITEMAP_BONUS: f64 = 3.0;
const DEPRIORITIZED_PENALTY: f64 = 5.0;

#[derive(Debug, Clone)]
struct FrontierEntry {
    url: Url,
    depth: u32,
    in_sitemap: bool,
    score: f64,
    seq: u64,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.seq == other.seq
    }
}
impl Eq for FrontierEntry {}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher score pops first; on a tie,
        // the earlier enqueue (lower seq) pops first, so we reverse seq.
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded, score-ordered crawl queue for a single job.
pub struct Frontier {
    heap: BinaryHeap<FrontierEntry>,
    seen: HashSet<String>,
    next_seq: u64,
    discovered: u32,
    max_pages: u32,
    max_depth: u32,
    seed_domain: Option<String>,
}

impl Frontier {
    /// Create a frontier scoped to `seed`'s registrable domain.
    pub fn new(seed: &Url, max_pages: u32, max_depth: u32) -> Self {
        Self {
            heap: BinaryHeap::new(),
            seen: HashSet::new(),
            next_seq: 0,
            discovered: 0,
            max_pages,
            max_depth,
            seed_domain: registrable_domain(seed),
        }
    }

    /// Attempt to enqueue `url` at `depth`. Returns `true` if accepted.
    pub fn enqueue(&mut self, url: &Url, depth: u32, in_sitemap: bool, robots: &RobotsRules) -> bool {
        if self.discovered >= self.max_pages || depth > self.max_depth {
            return false;
        }

        let canonical = Page::canonicalize(url);
        let key = canonical.to_string();
        if self.seen.contains(&key) {
            return false;
        }

        if self.seed_domain.is_some() && registrable_domain(&canonical) != self.seed_domain {
            return false;
        }

        if !robots.is_allowed(canonical.path()) {
            return false;
        }

        self.seen.insert(key);
        self.discovered += 1;
        let score = score_url(&canonical, depth, in_sitemap);
        self.heap.push(FrontierEntry {
            url: canonical,
            depth,
            in_sitemap,
            score,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        true
    }

    /// Pop the highest-scoring URL still queued, if any, along with its
    /// depth and whether it was discovered via the sitemap.
    pub fn pop(&mut self) -> Option<(Url, u32, bool)> {
        self.heap.pop().map(|e| (e.url, e.depth, e.in_sitemap))
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Total URLs ever accepted by [`enqueue`](Self::enqueue), including
    /// ones already popped.
    pub fn discovered(&self) -> u32 {
        self.discovered
    }

    /// Whether the frontier has hit its page budget.
    pub fn at_capacity(&self) -> bool {
        self.discovered >= self.max_pages
    }
}

/// Compute a pop-order priority score for `url` (§4.3). Exposed so callers
/// that need a page's priority outside the frontier itself — the
/// Composer's per-page budget allocation — can reuse the identical
/// formula instead of re-deriving it.
pub fn score_url(url: &Url, depth: u32, in_sitemap: bool) -> f64 {
    let path = url.path().to_ascii_lowercase();
    let mut score = -(depth as f64) * DEPTH_PENALTY_WEIGHT;

    if DOC_KEYWORDS.iter().any(|k| path.contains(k)) {
        score += DOC_KEYWORD_BONUS;
    }
    if in_sitemap {
        score += SITEMAP_BONUS;
    }
    if DEPRIORITIZED_KEYWORDS.iter().any(|k| path.contains(k)) {
        score -= DEPRIORITIZED_PENALTY;
    }

    score
}

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

    fn seed() -> Url {
        Url::parse("https://docs.example.com/guide/").unwrap()
    }

    #[test]
    fn enqueue_dedupes_on_canonical_form() {
        let mut frontier = Frontier::new(&seed(), 100, 5);
        let robots = RobotsRules::allow_all();
        assert!(frontier.enqueue(&Url::parse("https://docs.example.com/guide/intro").unwrap(), 1, false, &robots));
        assert!(!frontier.enqueue(&Url::parse("https://docs.example.com/guide/intro/").unwrap(), 1, false, &robots));
    }

    #[test]
    fn enqueue_rejects_off_domain() {
        let mut frontier = Frontier::new(&seed(), 100, 5);
        let robots = RobotsRules::allow_all();
        assert!(!frontier.enqueue(&Url::parse("https://other.example.com/x").unwrap(), 1, false, &robots));
    }

    #[test]
    fn enqueue_rejects_over_max_depth() {
        let mut frontier = Frontier::new(&seed(), 100, 2);
        let robots = RobotsRules::allow_all();
        assert!(!frontier.enqueue(&Url::parse("https://docs.example.com/a/b/c").unwrap(), 3, false, &robots));
    }

    #[test]
    fn enqueue_stops_at_max_pages() {
        let mut frontier = Frontier::new(&seed(), 1, 5);
        let robots = RobotsRules::allow_all();
        assert!(frontier.enqueue(&Url::parse("https://docs.example.com/a").unwrap(), 1, false, &robots));
        assert!(!frontier.enqueue(&Url::parse("https://docs.example.com/b").unwrap(), 1, false, &robots));
    }

    #[test]
    fn pop_prefers_shallower_and_doc_like_paths() {
        let mut frontier = Frontier::new(&seed(), 100, 5);
        let robots = RobotsRules::allow_all();
        frontier.enqueue(&Url::parse("https://docs.example.com/blog/post").unwrap(), 1, false, &robots);
        frontier.enqueue(&Url::parse("https://docs.example.com/guide/api").unwrap(), 1, false, &robots);

        let (first, _, _) = frontier.pop().unwrap();
        assert!(first.path().contains("api"));
    }

    #[test]
    fn pop_tie_breaks_on_enqueue_order() {
        let mut frontier = Frontier::new(&seed(), 100, 5);
        let robots = RobotsRules::allow_all();
        frontier.enqueue(&Url::parse("https://docs.example.com/alpha").unwrap(), 1, false, &robots);
        frontier.enqueue(&Url::parse("https://docs.example.com/beta").unwrap(), 1, false, &robots);

        let (first, _, _) = frontier.pop().unwrap();
        assert_eq!(first.path(), "/alpha");
    }

    #[test]
    fn enqueue_rejects_robots_disallowed_path() {
        let mut frontier = Frontier::new(&seed(), 100, 5);
        let robots = docforge_robots::parse_robots_txt("User-agent: *\nDisallow: /private/\n", "docforge/1.0");
        assert!(!frontier.enqueue(&Url::parse("https://docs.example.com/private/secret").unwrap(), 1, false, &robots));
    }
}
