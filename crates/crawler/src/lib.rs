//! Fetcher (C1) + URL Frontier (C3): polite, SSRF-guarded page fetching
//! and a bounded, scored BFS queue driving the crawl.

pub mod fetcher;
pub mod frontier;

#[cfg(feature = "render")]
pub mod render;

pub use fetcher::{FetchError, FetchedPage, Fetcher, is_ssrf_target};
pub use frontier::{Frontier, score_url};
