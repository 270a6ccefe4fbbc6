//! Section grouping by URL path prefix (C6, spec.md §4.6 step 1-2).

use docforge_shared::types::Page;
use url::Url;

/// A group of pages sharing a top-level URL path segment.
#[derive(Debug, Clone)]
pub struct Section<'a> {
    pub key: String,
    pub title: String,
    pub pages: Vec<&'a Page>,
    /// Aggregate priority: mean of member page priority scores.
    pub priority: f64,
    /// Total Markdown content length across member pages, used as a tie
    /// breaker when two sections share the same priority.
    pub total_len: usize,
}

/// Group `pages` by the first non-empty path segment of their URL, then
/// sort sections by aggregate priority descending, ties broken by total
/// content length descending (spec.md §4.6 step 2).
pub fn group_sections<'a>(pages: &'a [Page]) -> Vec<Section<'a>> {
    let mut keys: Vec<String> = Vec::new();
    let mut by_key: std::collections::HashMap<String, Vec<&'a Page>> = std::collections::HashMap::new();

    for page in pages {
        if page.markdown.trim().is_empty() {
            continue;
        }
        let key = section_key(&page.url);
        if !by_key.contains_key(&key) {
            keys.push(key.clone());
        }
        by_key.entry(key).or_default().push(page);
    }

    let mut sections: Vec<Section<'a>> = keys
        .into_iter()
        .map(|key| {
            let pages = by_key.remove(&key).unwrap_or_default();
            let priority = if pages.is_empty() {
                0.0
            } else {
                pages.iter().map(|p| p.priority_score).sum::<f64>() / pages.len() as f64
            };
            let total_len = pages.iter().map(|p| p.markdown.len()).sum();
            let title = title_from_key(&key);
            Section {
                key,
                title,
                pages,
                priority,
                total_len,
            }
        })
        .collect();

    sections.sort_by(|a, b| {
        b.priority
            .partial_cmp(&a.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.total_len.cmp(&a.total_len))
    });

    sections
}

/// First non-empty path segment of `url`, lowercased; the site root gets
/// the synthetic key `"root"`.
fn section_key(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "root".to_string();
    };
    parsed
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_else(|| "root".to_string())
}

/// Title-case a section key (e.g. `"getting-started"` -> `"Getting Started"`,
/// `"root"` -> `"Overview"`). Mirrors the teacher's `title_from_path`.
pub fn title_from_key(key: &str) -> String {
    if key == "root" {
        return "Overview".to_string();
    }
    key.replace(['-', '_'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => format!("{}{}", c.to_uppercase(), chars.as_str()),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Slug used for Markdown anchor links in the index (GitHub-flavored: lowercase,
/// spaces to dashes).
pub fn slugify_title(title: &str) -> String {
    title
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_shared::types::ExtractionStatus;

    fn page(url: &str, priority: f64, markdown: &str) -> Page {
        Page {
            url: url.to_string(),
            depth: 0,
            content_type: Some("text/html".to_string()),
            title: Some("Title".to_string()),
            markdown: markdown.to_string(),
            headings: vec![],
            code_blocks: vec![],
            status: ExtractionStatus::Ok,
            priority_score: priority,
            in_sitemap: false,
        }
    }

    #[test]
    fn groups_by_first_path_segment() {
        let pages = vec![
            page("https://docs.example.com/guide/a", 1.0, "guide a content"),
            page("https://docs.example.com/guide/b", 1.0, "guide b content"),
            page("https://docs.example.com/api/c", 2.0, "api c content"),
        ];
        let sections = group_sections(&pages);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].key, "api");
        assert_eq!(sections[0].pages.len(), 1);
    }

    #[test]
    fn root_page_gets_root_key() {
        let pages = vec![page("https://docs.example.com/", 1.0, "home content")];
        let sections = group_sections(&pages);
        assert_eq!(sections[0].key, "root");
        assert_eq!(sections[0].title, "Overview");
    }

    #[test]
    fn empty_pages_are_skipped() {
        let pages = vec![page("https://docs.example.com/empty", 1.0, "   ")];
        assert!(group_sections(&pages).is_empty());
    }

    #[test]
    fn title_from_key_title_cases_words() {
        assert_eq!(title_from_key("getting-started"), "Getting Started");
        assert_eq!(title_from_key("api_reference"), "Api Reference");
        assert_eq!(title_from_key("root"), "Overview");
    }

    #[test]
    fn slugify_title_produces_anchor_safe_string() {
        assert_eq!(slugify_title("Getting Started"), "getting-started");
    }
}
