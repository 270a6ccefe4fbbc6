//! Extractor (C4, §4.4): HTML page -> `{title, markdown, headings, code_blocks, status}`.
//!
//! Pipeline: platform-aware main-content selection, chrome/cookie-banner/
//! low-value-sidebar stripping, HTML table -> Markdown table conversion,
//! `htmd` HTML -> Markdown conversion, then the cleanup pass chain in
//! [`cleanup`]. Headings and code blocks are read back off the cleaned
//! Markdown rather than the DOM, since cleanup can reshape both.

mod adapters;
mod cleanup;

use std::sync::LazyLock;

use docforge_shared::types::{CodeBlock, ExtractionStatus, Heading};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

/// Cleaned-body length below which a page is considered to have yielded
/// nothing useful (§4.4).
const MIN_CONTENT_CHARS: usize = 200;

/// Minimum total text length a candidate sidebar must have before its
/// link density is even considered — guards against stripping short,
/// legitimately link-heavy paragraphs (e.g. "See also: A, B, C").
const SIDEBAR_MIN_TEXT_CHARS: usize = 40;

/// Link-text / total-text ratio above which an element is treated as
/// navigational chrome rather than content (§4.4).
const LINK_DENSITY_THRESHOLD: f64 = 0.5;

/// Result of extracting one page's main content.
#[derive(Debug, Clone)]
pub struct ExtractResult {
    pub title: Option<String>,
    pub markdown: String,
    pub headings: Vec<Heading>,
    pub code_blocks: Vec<CodeBlock>,
    pub status: ExtractionStatus,
}

/// Extract `{title, markdown, headings, code_blocks, status}` from a raw
/// HTML page fetched from `source_url`.
#[instrument(skip(html), fields(url = %source_url))]
pub fn extract(html: &str, source_url: &str) -> ExtractResult {
    let doc = Html::parse_document(html);
    let rule = adapters::detect(&doc);
    debug!(adapter = rule.name, "selected content adapter");

    let content_html = adapters::select_content_html(&doc, rule);
    let content_html = strip_cookie_banners(&content_html);
    let content_html = strip_low_value_sidebars(&content_html);
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "iframe", "noscript", "svg", "header", "footer", "aside",
        ])
        .build();

    let raw_markdown = converter.convert(&content_html).unwrap_or_default();

    let base_url = Url::parse(source_url).ok();
    let markdown = cleanup::run_pipeline(&raw_markdown, base_url.as_ref());

    let title = extract_title_from_markdown(&markdown);
    let headings = extract_headings(&markdown);
    let code_blocks = extract_code_blocks(&markdown);

    let status = if markdown.trim().len() < MIN_CONTENT_CHARS {
        ExtractionStatus::Empty
    } else {
        ExtractionStatus::Ok
    };

    debug!(
        title = ?title,
        headings = headings.len(),
        code_blocks = code_blocks.len(),
        status = ?status,
        "extraction complete"
    );

    ExtractResult {
        title,
        markdown,
        headings,
        code_blocks,
        status,
    }
}

// ---------------------------------------------------------------------------
// Chrome stripping
// ---------------------------------------------------------------------------

/// Strip elements that look like cookie/consent banners (§4.4): matched by
/// `class`/`id` substrings, not a fixed class list, since every CMP names
/// its markup differently.
fn strip_cookie_banners(html: &str) -> String {
    strip_selectors(
        html,
        &[
            r#"[class*="cookie"]"#,
            r#"[id*="cookie"]"#,
            r#"[class*="consent"]"#,
            r#"[id*="consent"]"#,
            r#"[class*="gdpr"]"#,
            r#"[id*="gdpr"]"#,
        ],
    )
}

/// Strip `div`/`aside`/`ul` elements whose text is mostly link text — the
/// signature of a leftover navigation sidebar or "related pages" block
/// that survived main-content selection (§4.4).
fn strip_low_value_sidebars(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let candidate_sel = Selector::parse("div, aside, ul").unwrap();
    let a_sel = Selector::parse("a").unwrap();

    let mut result = html.to_string();

    for el in doc.select(&candidate_sel) {
        let total_text: String = el.text().collect();
        let total_len = total_text.trim().len();
        if total_len < SIDEBAR_MIN_TEXT_CHARS {
            continue;
        }

        let link_len: usize = el
            .select(&a_sel)
            .map(|a| a.text().collect::<String>().trim().len())
            .sum();

        let density = link_len as f64 / total_len as f64;
        if density > LINK_DENSITY_THRESHOLD {
            let outer = el.html();
            result = result.replacen(&outer, "", 1);
        }
    }

    result
}

/// Remove every element matched by `selectors`, by string-replacing its
/// outer HTML with nothing. `scraper`'s parse tree has no node-removal
/// API, so this is the standard workaround for DOM-level stripping.
fn strip_selectors(html: &str, selectors: &[&str]) -> String {
    let doc = Html::parse_fragment(html);
    let mut result = html.to_string();

    for sel_str in selectors {
        let Ok(selector) = Selector::parse(sel_str) else {
            continue;
        };
        for el in doc.select(&selector) {
            let outer = el.html();
            result = result.replacen(&outer, "", 1);
        }
    }

    result
}

// ---------------------------------------------------------------------------
// Table pre-processing
// ---------------------------------------------------------------------------

/// Convert HTML `<table>` elements to Markdown table syntax before `htmd`
/// conversion; `htmd` has no table support of its own.
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let table_sel = Selector::parse("table").unwrap();

    if doc.select(&table_sel).next().is_none() {
        return html.to_string();
    }

    let mut result = html.to_string();
    for table_el in doc.select(&table_sel) {
        let table_html = table_el.html();
        let md_table = html_table_to_markdown(&table_el);
        result = result.replacen(&table_html, &md_table, 1);
    }

    result
}

fn html_table_to_markdown(table: &ElementRef) -> String {
    let tr_sel = Selector::parse("tr").unwrap();
    let th_sel = Selector::parse("th").unwrap();
    let td_sel = Selector::parse("td").unwrap();

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut has_header = false;

    for tr in table.select(&tr_sel) {
        let ths: Vec<String> = tr
            .select(&th_sel)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        if !ths.is_empty() {
            has_header = true;
            rows.push(ths);
            continue;
        }

        let tds: Vec<String> = tr
            .select(&td_sel)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        if !tds.is_empty() {
            rows.push(tds);
        }
    }

    if rows.is_empty() {
        return String::new();
    }

    let col_count = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }

    for row in &mut rows {
        while row.len() < col_count {
            row.push(String::new());
        }
    }

    let mut md = String::from("\n\n");

    let header = &rows[0];
    md.push_str("| ");
    md.push_str(&header.join(" | "));
    md.push_str(" |\n");

    md.push_str("| ");
    md.push_str(&(0..col_count).map(|_| "---").collect::<Vec<_>>().join(" | "));
    md.push_str(" |\n");

    let data_start = if has_header { 1 } else { 0 };
    for row in &rows[data_start..] {
        md.push_str("| ");
        md.push_str(&row.join(" | "));
        md.push_str(" |\n");
    }

    md.push('\n');
    md
}

// ---------------------------------------------------------------------------
// Markdown-level extraction
// ---------------------------------------------------------------------------

fn extract_title_from_markdown(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));
    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

/// Read back `{level, text}` for every heading in the cleaned Markdown.
fn extract_headings(md: &str) -> Vec<Heading> {
    static HEADING_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+)$").expect("valid regex"));

    HEADING_RE
        .captures_iter(md)
        .map(|c| Heading {
            level: c[1].len() as u8,
            text: c[2].trim().to_string(),
        })
        .collect()
}

/// Read back `{language, code}` for every fenced code block in the cleaned
/// Markdown.
fn extract_code_blocks(md: &str) -> Vec<CodeBlock> {
    static CODE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```([a-zA-Z0-9_+-]*)\n(.*?)```").expect("valid regex"));

    CODE_RE
        .captures_iter(md)
        .map(|c| {
            let lang = c[1].trim();
            CodeBlock {
                language: if lang.is_empty() { None } else { Some(lang.to_string()) },
                code: c[2].trim_end_matches('\n').to_string(),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn long_paragraph(words: &str) -> String {
        words.repeat(30)
    }

    #[test]
    fn extracts_title_headings_and_status_ok() {
        let body = long_paragraph("padding words to clear the minimum content threshold. ");
        let html = format!(
            "<html><body><main><h1>Hello World</h1><h2>Section</h2><p>{body}</p></main></body></html>"
        );
        let result = extract(&html, "https://example.com/page");

        assert_eq!(result.title.as_deref(), Some("Hello World"));
        assert_eq!(result.headings[0], Heading { level: 1, text: "Hello World".into() });
        assert_eq!(result.headings[1], Heading { level: 2, text: "Section".into() });
        assert_eq!(result.status, ExtractionStatus::Ok);
    }

    #[test]
    fn status_empty_below_min_content_chars() {
        let html = "<html><body><main><h1>Hi</h1><p>short</p></main></body></html>";
        let result = extract(html, "https://example.com/short");
        assert_eq!(result.status, ExtractionStatus::Empty);
    }

    #[test]
    fn strips_nav_and_footer_via_skip_tags() {
        let body = long_paragraph("padding words to clear the minimum content threshold. ");
        let html = format!(
            r#"<html><body>
                <nav><a href="/">Home</a></nav>
                <main><h1>Content</h1><p>{body}</p></main>
                <footer><p>Copyright 2024</p></footer>
            </body></html>"#
        );
        let result = extract(&html, "https://example.com/");
        assert!(!result.markdown.contains("Copyright 2024"));
        assert!(!result.markdown.contains("Home"));
    }

    #[test]
    fn strips_cookie_banner_by_class_substring() {
        let body = long_paragraph("padding words to clear the minimum content threshold. ");
        let html = format!(
            r#"<html><body><main>
                <div class="cookie-consent-banner"><p>We use cookies. Accept all cookies now.</p></div>
                <h1>Title</h1>
                <p>{body}</p>
            </main></body></html>"#
        );
        let result = extract(&html, "https://example.com/cookies");
        assert!(!result.markdown.to_lowercase().contains("we use cookies"));
    }

    #[test]
    fn strips_link_dense_sidebar() {
        let body = long_paragraph("padding words to clear the minimum content threshold. ");
        let html = format!(
            r#"<html><body><main>
                <h1>Title</h1>
                <div class="related-links">
                    <a href="/a">Related page one with a long link label</a>
                    <a href="/b">Related page two with a long link label</a>
                    <a href="/c">Related page three with a long link label</a>
                </div>
                <p>{body}</p>
            </main></body></html>"#
        );
        let result = extract(&html, "https://example.com/sidebar");
        assert!(!result.markdown.contains("Related page one"));
        assert!(result.markdown.contains("padding words"));
    }

    #[test]
    fn preserves_tables() {
        let body = long_paragraph("padding words to clear the minimum content threshold. ");
        let html = format!(
            r#"<html><body><main>
                <h1>Data</h1>
                <p>{body}</p>
                <table>
                    <thead><tr><th>Name</th><th>Value</th></tr></thead>
                    <tbody><tr><td>foo</td><td>bar</td></tr></tbody>
                </table>
            </main></body></html>"#
        );
        let result = extract(&html, "https://example.com/data");
        assert!(result.markdown.contains("| Name | Value |"));
        assert!(result.markdown.contains("| foo | bar |"));
    }

    #[test]
    fn extracts_code_blocks_with_language() {
        let body = long_paragraph("padding words to clear the minimum content threshold. ");
        let html = format!(
            r#"<html><body><main>
                <h1>Code</h1>
                <p>{body}</p>
                <pre><code class="language-rust">fn main() {{ println!("hi"); }}</code></pre>
            </main></body></html>"#
        );
        let result = extract(&html, "https://example.com/code");
        assert_eq!(result.code_blocks.len(), 1);
        assert_eq!(result.code_blocks[0].language.as_deref(), Some("rust"));
        assert!(result.code_blocks[0].code.contains("println!"));
    }

    #[test]
    fn uses_vitepress_adapter_selector() {
        let body = long_paragraph("padding words to clear the minimum content threshold. ");
        let html = format!(
            r#"<html><body>
                <div id="VPContent"><div class="vp-doc"><h1>Guide</h1><p>{body}</p></div></div>
            </body></html>"#
        );
        let result = extract(&html, "https://example.com/guide");
        assert_eq!(result.title.as_deref(), Some("Guide"));
        assert_eq!(result.status, ExtractionStatus::Ok);
    }

    #[test]
    fn no_title_yields_none() {
        let body = long_paragraph("padding words to clear the minimum content threshold. ");
        let html = format!("<html><body><main><p>{body}</p></main></body></html>");
        let result = extract(&html, "https://example.com/notitle");
        assert_eq!(result.title, None);
    }
}
