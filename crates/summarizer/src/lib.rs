//! Summarizer (C5, spec.md §4.5).
//!
//! A stateless function over an external LLM: compress a page or section of
//! Markdown down to a target size while preserving headings, code blocks,
//! and API/CLI signatures verbatim. Deterministic at temperature 0 — the
//! composer relies on identical input + model id producing identical output
//! for reproducible artifact builds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

const SYSTEM_PROMPT: &str = "You produce compact documentation summaries for \
large language model context windows. Preserve headings and code blocks \
verbatim. Compress prose aggressively. Omit marketing copy. Keep API and \
CLI signatures exact and complete.";

const MAX_RETRIES: u32 = 2;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(8);
const TRUNCATION_MARKER: &str = "\n\n<!-- unsummarized: truncated to fit budget -->\n";

/// Configuration for the LLM backend, resolved from [`docforge_shared::config::ServiceDefaults`]
/// (spec.md §9 open question 1 — backend choice is deployment configuration, not core logic).
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model_id: String,
}

impl SummarizerConfig {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, model_id: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            model_id: model_id.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("summarizer request failed: {0}")]
    Request(String),
    #[error("summarizer returned an unexpected response shape: {0}")]
    Shape(String),
}

/// Result of summarizing a single section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummarizeOutcome {
    pub markdown: String,
    /// Set when the LLM call failed persistently and the content was
    /// truncated locally instead (spec.md §4.5 failure mode).
    pub unsummarized: bool,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Summarize `content` to fit within `target_kb` kilobytes.
///
/// On transient failure (network error, rate limit, 5xx) retries twice with
/// exponential backoff. On persistent failure, returns the original content
/// truncated at `target_kb` with [`SummarizeOutcome::unsummarized`] set —
/// this function never returns an error to its caller, matching the
/// composer's expectation that every page gets *some* content back.
#[instrument(skip(client, config, content), fields(target_kb, content_len = content.len()))]
pub async fn summarize(
    client: &reqwest::Client,
    config: &SummarizerConfig,
    content: &str,
    target_kb: u32,
) -> SummarizeOutcome {
    if content.trim().is_empty() {
        return SummarizeOutcome {
            markdown: String::new(),
            unsummarized: false,
        };
    }

    let mut attempt = 0;
    loop {
        match try_summarize(client, config, content, target_kb).await {
            Ok(markdown) => {
                return SummarizeOutcome {
                    markdown,
                    unsummarized: false,
                };
            }
            Err(err) if attempt < MAX_RETRIES => {
                let delay = backoff_delay(attempt);
                warn!(attempt, %err, delay_ms = delay.as_millis() as u64, "summarizer attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                warn!(%err, "summarizer failed persistently, falling back to truncation");
                return SummarizeOutcome {
                    markdown: truncate_to_budget(content, target_kb),
                    unsummarized: true,
                };
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let scaled = BACKOFF_BASE.saturating_mul(1 << attempt);
    scaled.min(BACKOFF_CAP)
}

async fn try_summarize(
    client: &reqwest::Client,
    config: &SummarizerConfig,
    content: &str,
    target_kb: u32,
) -> Result<String, SummarizerError> {
    let user_prompt = format!(
        "Summarize the following documentation section to fit within {target_kb} KB. \
         Keep all code blocks and headings verbatim.\n\n---\n\n{content}"
    );

    let request = ChatRequest {
        model: &config.model_id,
        temperature: 0.0,
        messages: vec![
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: user_prompt,
            },
        ],
    };

    let url = format!("{}/chat/completions", config.api_base.trim_end_matches('/'));
    let mut req = client.post(&url).json(&request);
    if let Some(key) = &config.api_key {
        req = req.bearer_auth(key);
    }

    let response = req
        .send()
        .await
        .map_err(|e| SummarizerError::Request(e.to_string()))?;

    let status = response.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(SummarizerError::Request(format!("retryable status {status}")));
    }
    if !status.is_success() {
        return Err(SummarizerError::Shape(format!("non-success status {status}")));
    }

    let body: ChatResponse = response
        .json()
        .await
        .map_err(|e| SummarizerError::Shape(e.to_string()))?;

    let message = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| SummarizerError::Shape("empty choices array".to_string()))?;

    Ok(message.message.content)
}

/// Truncate `content` to `target_kb` kilobytes at a char boundary, appending
/// a marker comment (mirrors the teacher's enrichment truncation pattern,
/// generalized from a hard char budget to a target size in kilobytes).
fn truncate_to_budget(content: &str, target_kb: u32) -> String {
    let max_bytes = (target_kb as usize).saturating_mul(1024);
    if content.len() <= max_bytes {
        return content.to_string();
    }

    let marker_len = TRUNCATION_MARKER.len();
    let budget = max_bytes.saturating_sub(marker_len);
    let mut cut = budget.min(content.len());
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut truncated = content[..cut].to_string();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
