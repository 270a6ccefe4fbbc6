//! Sitemap XML parsing (§4.1).
//!
//! Sitemap and sitemap-index documents are both simple `<loc>`-bearing XML;
//! we extract `<loc>` text with a line-oriented regex rather than pulling in
//! a full XML parser, matching this crate's regex-parser idiom.

use std::sync::LazyLock;

use regex::Regex;

/// Matches the text content of a `<loc>...</loc>` element, across lines.
static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<loc>\s*([^<\s][^<]*?)\s*</loc>").expect("valid regex")
});

/// A parsed sitemap document: either a leaf sitemap (page URLs) or a
/// sitemap index (URLs pointing at other sitemaps).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    Urlset,
    Index,
}

/// Extract every `<loc>` URL from a sitemap or sitemap-index document.
pub fn extract_locs(xml: &str) -> Vec<String> {
    LOC_RE
        .captures_iter(xml)
        .map(|c| c[1].trim().to_string())
        .collect()
}

/// Classify a sitemap document as a leaf `urlset` or an `index` of other
/// sitemaps, by checking which root element is present.
pub fn classify(xml: &str) -> SitemapKind {
    if xml.contains("<sitemapindex") {
        SitemapKind::Index
    } else {
        SitemapKind::Urlset
    }
}
