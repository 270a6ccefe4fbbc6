//! Composer (C6, spec.md §4.6): assembles `llms.txt` and `llms-full.txt`
//! from crawled, extracted pages.
//!
//! Grouping and section ordering live in [`sections`]; this module owns
//! budget allocation, summarization dispatch, and the stable Markdown
//! layout both artifacts share.

pub mod sections;

use chrono::Utc;
use docforge_shared::types::Page;
use docforge_summarizer::{SummarizerConfig, summarize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument};

use sections::{Section, group_sections, slugify_title};

/// Header block reserves this fraction of the `llms.txt` size cap
/// (spec.md §4.6 step 3).
const HEADER_RESERVE_FRACTION: f64 = 0.05;
/// Minimum per-section allocation; sections that can't meet it are dropped.
const SECTION_FLOOR_KB: u32 = 1;
/// `llms-full.txt` has no proportional budget, only a safety multiple of
/// the `llms.txt` cap (spec.md §4.6 step 5, §9 open question 5).
const FULL_ARTIFACT_CAP_MULTIPLIER: u64 = 10;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("no page yielded usable content")]
    NoUsableContent,
}

/// Everything the composer needs about the job that isn't per-page.
#[derive(Debug, Clone)]
pub struct ComposeContext {
    pub site_title: String,
    pub root_url: String,
    pub size_cap_kb: u32,
}

/// Result of composing an artifact: the Markdown body plus which sections
/// (if any) were dropped for not meeting the per-section floor.
#[derive(Debug, Clone)]
pub struct ComposeOutput {
    pub markdown: String,
    pub trimmed_sections: Vec<String>,
    pub dropped_pages: Vec<String>,
}

/// A page's already-summarized Markdown, kept alongside its priority so the
/// final size-cap pass (spec.md §4.6 step 6) can drop individual pages
/// rather than whole sections.
struct RenderedPage {
    body: String,
    priority_score: f64,
    url: String,
}

struct RenderedSection {
    title: String,
    pages: Vec<RenderedPage>,
}

/// Build `llms.txt`: summarize every page to its budget allocation via the
/// Summarizer (C5), then emit the stable Markdown structure.
#[instrument(skip(pages, client, summarizer_config), fields(page_count = pages.len(), size_cap_kb = ctx.size_cap_kb))]
pub async fn compose_llms_txt(
    ctx: &ComposeContext,
    pages: &[Page],
    client: &reqwest::Client,
    summarizer_config: &SummarizerConfig,
) -> Result<ComposeOutput, ComposeError> {
    let sections = group_sections(pages);
    if sections.is_empty() {
        return Err(ComposeError::NoUsableContent);
    }

    let cap_bytes = (ctx.size_cap_kb as u64) * 1024;
    let header_bytes = ((cap_bytes as f64) * HEADER_RESERVE_FRACTION).round() as u64;
    let remaining_bytes = cap_bytes.saturating_sub(header_bytes);

    let total_priority: f64 = sections.iter().map(|s| s.priority.max(0.0) + 1.0).sum();
    let floor_bytes = (SECTION_FLOOR_KB as u64) * 1024;

    let mut trimmed_sections = Vec::new();
    let mut rendered_sections: Vec<RenderedSection> = Vec::new();

    for section in &sections {
        let weight = (section.priority.max(0.0) + 1.0) / total_priority;
        let allocation_bytes = ((remaining_bytes as f64) * weight).round() as u64;

        if allocation_bytes < floor_bytes {
            debug!(section = %section.key, allocation_bytes, "section dropped: below floor");
            trimmed_sections.push(section.title.clone());
            continue;
        }

        let pages = render_section_pages(section, allocation_bytes, client, summarizer_config).await;
        rendered_sections.push(RenderedSection {
            title: section.title.clone(),
            pages,
        });
    }

    if rendered_sections.is_empty() {
        return Err(ComposeError::NoUsableContent);
    }

    // Per-section/per-page budgeting assumes the Summarizer honors its
    // target_kb, but a persistently-failing summarizer falls back to the
    // raw page content (spec.md §4.5), which can blow past its allocation.
    // Enforce the cap here by dropping the lowest-priority page and
    // re-rendering until the document fits (spec.md §4.6 step 6, §8
    // property 3), mirroring compose_llms_full_txt's safety pass below.
    let mut dropped_pages = Vec::new();
    let mut markdown;
    loop {
        markdown = render_from_rendered_sections(&ctx.site_title, &ctx.root_url, &rendered_sections);
        if (markdown.len() as u64) <= cap_bytes {
            break;
        }
        match drop_lowest_priority_rendered_page(&mut rendered_sections) {
            Some(url) => dropped_pages.push(url),
            None => {
                info!(bytes = markdown.len(), "llms.txt exceeds size cap with no pages left to drop");
                break;
            }
        }
    }

    if !trimmed_sections.is_empty() {
        let comment = render_trimmed_comment(&trimmed_sections);
        if markdown.len() + comment.len() <= cap_bytes as usize {
            markdown.push_str(&comment);
        }
    }

    info!(
        sections = rendered_sections.len(),
        trimmed = trimmed_sections.len(),
        dropped = dropped_pages.len(),
        bytes = markdown.len(),
        "composed llms.txt"
    );

    Ok(ComposeOutput {
        markdown,
        trimmed_sections,
        dropped_pages,
    })
}

/// Build `llms-full.txt`: identical structure, but every page carries its
/// cleaned, un-summarized Markdown. Bounded only by a safety multiple of
/// `size_cap_kb`; if still over cap, drops the lowest-priority pages
/// wholesale rather than truncating mid-page (spec.md §4.6 step 6).
#[instrument(skip(pages), fields(page_count = pages.len(), size_cap_kb = ctx.size_cap_kb))]
pub fn compose_llms_full_txt(ctx: &ComposeContext, pages: &[Page]) -> Result<ComposeOutput, ComposeError> {
    let mut sections = group_sections(pages);
    if sections.is_empty() {
        return Err(ComposeError::NoUsableContent);
    }

    let cap_bytes = (ctx.size_cap_kb as u64) * FULL_ARTIFACT_CAP_MULTIPLIER * 1024;
    let mut dropped_pages = Vec::new();

    loop {
        let rendered: Vec<(String, String)> = sections
            .iter()
            .map(|s| (s.title.clone(), render_section_full(s)))
            .collect();
        let markdown = render_document(&ctx.site_title, &ctx.root_url, &rendered);

        if (markdown.len() as u64) <= cap_bytes {
            info!(bytes = markdown.len(), dropped = dropped_pages.len(), "composed llms-full.txt");
            return Ok(ComposeOutput {
                markdown,
                trimmed_sections: Vec::new(),
                dropped_pages,
            });
        }

        match drop_lowest_priority_page(&mut sections) {
            Some(url) => dropped_pages.push(url),
            None => {
                // Nothing left to drop but still over cap: return what we have.
                info!(bytes = markdown.len(), "llms-full.txt exceeds safety cap with no pages left to drop");
                return Ok(ComposeOutput {
                    markdown,
                    trimmed_sections: Vec::new(),
                    dropped_pages,
                });
            }
        }
    }
}

/// Remove the single lowest-priority page across all sections, dropping
/// any section left empty. Returns the removed page's URL.
fn drop_lowest_priority_page(sections: &mut Vec<Section<'_>>) -> Option<String> {
    let mut worst: Option<(usize, usize, f64)> = None;
    for (si, section) in sections.iter().enumerate() {
        for (pi, page) in section.pages.iter().enumerate() {
            if worst.is_none_or(|(_, _, score)| page.priority_score < score) {
                worst = Some((si, pi, page.priority_score));
            }
        }
    }

    let (si, pi, _) = worst?;
    let url = sections[si].pages[pi].url.clone();
    sections[si].pages.remove(pi);
    if sections[si].pages.is_empty() {
        sections.remove(si);
    }
    Some(url)
}

async fn render_section_pages(
    section: &Section<'_>,
    allocation_bytes: u64,
    client: &reqwest::Client,
    summarizer_config: &SummarizerConfig,
) -> Vec<RenderedPage> {
    let total_page_priority: f64 = section.pages.iter().map(|p| p.priority_score.max(0.0) + 1.0).sum();
    let mut rendered = Vec::with_capacity(section.pages.len());

    for page in &section.pages {
        let weight = (page.priority_score.max(0.0) + 1.0) / total_page_priority;
        let page_budget_bytes = ((allocation_bytes as f64) * weight).round() as u32;
        let target_kb = (page_budget_bytes / 1024).max(1);

        let outcome = summarize(client, summarizer_config, &page.markdown, target_kb).await;
        let title = page.title.clone().unwrap_or_else(|| page.url.clone());

        let mut body = format!("### {title}\n\n");
        if outcome.unsummarized {
            body.push_str("<!-- unsummarized -->\n");
        }
        body.push_str(outcome.markdown.trim());
        body.push_str("\n\n");

        rendered.push(RenderedPage {
            body,
            priority_score: page.priority_score,
            url: page.url.clone(),
        });
    }

    rendered
}

/// Remove the single lowest-priority page across all rendered sections,
/// dropping any section left empty. Returns the removed page's URL.
fn drop_lowest_priority_rendered_page(sections: &mut Vec<RenderedSection>) -> Option<String> {
    let mut worst: Option<(usize, usize, f64)> = None;
    for (si, section) in sections.iter().enumerate() {
        for (pi, page) in section.pages.iter().enumerate() {
            if worst.is_none_or(|(_, _, score)| page.priority_score < score) {
                worst = Some((si, pi, page.priority_score));
            }
        }
    }

    let (si, pi, _) = worst?;
    let url = sections[si].pages[pi].url.clone();
    sections[si].pages.remove(pi);
    if sections[si].pages.is_empty() {
        sections.remove(si);
    }
    Some(url)
}

/// Join each rendered section's per-page bodies and hand them to
/// [`render_document`] for the shared header/index/section layout.
fn render_from_rendered_sections(site_title: &str, root_url: &str, sections: &[RenderedSection]) -> String {
    let joined: Vec<(String, String)> = sections
        .iter()
        .map(|s| (s.title.clone(), s.pages.iter().map(|p| p.body.as_str()).collect::<String>()))
        .collect();
    render_document(site_title, root_url, &joined)
}

fn render_section_full(section: &Section<'_>) -> String {
    let mut body = String::new();
    for page in &section.pages {
        let title = page.title.clone().unwrap_or_else(|| page.url.clone());
        body.push_str(&format!("### {title}\n\n"));
        body.push_str(page.markdown.trim());
        body.push_str("\n\n");
    }
    body
}

fn render_document(site_title: &str, root_url: &str, sections: &[(String, String)]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {site_title}\n\n"));
    out.push_str(&format!("> Source: {root_url}\n"));
    out.push_str(&format!("> Generated: {}\n\n", Utc::now().to_rfc3339()));

    out.push_str("## Index\n\n");
    for (title, _) in sections {
        out.push_str(&format!("- [{title}](#{})\n", slugify_title(title)));
    }
    out.push('\n');

    for (title, body) in sections {
        out.push_str(&format!("## {title}\n\n"));
        out.push_str(body);
    }

    out
}

fn render_trimmed_comment(trimmed: &[String]) -> String {
    let mut out = String::from("\n<!-- trimmed sections (below size floor): ");
    out.push_str(&trimmed.join(", "));
    out.push_str(" -->\n");
    out
}

/// SHA-256 digest of an artifact's content, hex-encoded. Used for
/// determinism checks and logging (spec.md §4.6 determinism requirement).
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
