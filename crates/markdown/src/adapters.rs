//! Platform-aware main-content selection (SPEC_FULL §F).
//!
//! Documentation generators wrap the same prose in very different DOM
//! shells. Each rule below detects one generator and names the selector
//! chain that reliably isolates its content; `generic` always matches
//! last as the readability-style fallback.

use scraper::{Html, Selector};

pub struct AdapterRule {
    pub name: &'static str,
    detect: fn(&Html) -> bool,
    selectors: &'static [&'static str],
}

static ADAPTERS: &[AdapterRule] = &[
    AdapterRule {
        name: "docusaurus",
        detect: detect_docusaurus,
        selectors: &["article .markdown", "article", ".markdown", "main"],
    },
    AdapterRule {
        name: "vitepress",
        detect: detect_vitepress,
        selectors: &[".vp-doc", ".VPDoc", "#VPContent main", "main"],
    },
    AdapterRule {
        name: "gitbook",
        detect: detect_gitbook,
        selectors: &[".markdown-section", "main"],
    },
    AdapterRule {
        name: "readthedocs",
        detect: detect_readthedocs,
        selectors: &[r#"[role="main"]"#, ".document", "main"],
    },
    AdapterRule {
        name: "generic",
        detect: |_| true,
        selectors: &["article", "main", r#"[role="main"]"#, ".content", "body"],
    },
];

fn detect_docusaurus(doc: &Html) -> bool {
    let meta_sel = Selector::parse(r#"meta[name="generator"]"#).unwrap();
    let has_generator_meta = doc.select(&meta_sel).any(|el| {
        el.value()
            .attr("content")
            .is_some_and(|c| c.to_lowercase().contains("docusaurus"))
    });
    has_generator_meta || doc.select(&Selector::parse("[data-docusaurus-version]").unwrap()).next().is_some()
}

fn detect_vitepress(doc: &Html) -> bool {
    doc.select(&Selector::parse("#VPContent").unwrap()).next().is_some()
        || doc.select(&Selector::parse(".VPDoc").unwrap()).next().is_some()
}

fn detect_gitbook(doc: &Html) -> bool {
    doc.select(&Selector::parse(r#"meta[name="gitbook"]"#).unwrap()).next().is_some()
        || doc.select(&Selector::parse(".gitbook-root").unwrap()).next().is_some()
}

fn detect_readthedocs(doc: &Html) -> bool {
    doc.select(&Selector::parse(r#"meta[name="readthedocs"]"#).unwrap()).next().is_some()
        || doc.select(&Selector::parse(".wy-nav-side").unwrap()).next().is_some()
        || doc.select(&Selector::parse(".wy-body-for-nav").unwrap()).next().is_some()
        || doc.select(&Selector::parse(r#"link[href*="_static"]"#).unwrap()).next().is_some()
}

/// Detect which adapter applies, trying platform-specific rules before
/// the always-matching generic fallback.
pub fn detect(doc: &Html) -> &'static AdapterRule {
    ADAPTERS
        .iter()
        .find(|rule| (rule.detect)(doc))
        .expect("generic adapter always matches")
}

/// Select the main-content HTML for `doc` using `rule`'s selector chain,
/// falling back to `<body>` and finally the whole document.
pub fn select_content_html(doc: &Html, rule: &AdapterRule) -> String {
    for sel_str in rule.selectors {
        if let Ok(sel) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&sel).next() {
                return el.inner_html();
            }
        }
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            return body.inner_html();
        }
    }

    doc.root_element().inner_html()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_docusaurus_via_generator_meta() {
        let html = r#"<html><head><meta name="generator" content="Docusaurus v3.1"></head><body></body></html>"#;
        let doc = Html::parse_document(html);
        assert_eq!(detect(&doc).name, "docusaurus");
    }

    #[test]
    fn detects_vitepress_via_vp_content_id() {
        let html = r#"<html><body><div id="VPContent"><div class="vp-doc">x</div></div></body></html>"#;
        let doc = Html::parse_document(html);
        assert_eq!(detect(&doc).name, "vitepress");
    }

    #[test]
    fn detects_readthedocs_via_static_link() {
        let html = r#"<html><head><link href="/_static/theme.css" rel="stylesheet"></head><body></body></html>"#;
        let doc = Html::parse_document(html);
        assert_eq!(detect(&doc).name, "readthedocs");
    }

    #[test]
    fn falls_back_to_generic() {
        let html = "<html><body><main><h1>Hi</h1></main></body></html>";
        let doc = Html::parse_document(html);
        assert_eq!(detect(&doc).name, "generic");
    }

    #[test]
    fn select_content_html_prefers_platform_selector() {
        let html = r#"<html><body><div id="VPContent"><div class="vp-doc"><h1>Title</h1><p>Body</p></div></div></body></html>"#;
        let doc = Html::parse_document(html);
        let rule = detect(&doc);
        let content = select_content_html(&doc, rule);
        assert!(content.contains("Body"));
    }
}
