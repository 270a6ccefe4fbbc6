//! Domain types: [`Job`], [`Page`], [`Artifact`], and their identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique job identifier (UUIDv7 — time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Mint a fresh job id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Current lifecycle state of a [`Job`]. See §4.7's state machine:
/// `pending -> running -> {completed|failed|cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states are absorbing; no further transition is valid.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Current pipeline phase, used to derive the progress base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Initializing,
    Crawling,
    Extracting,
    Composing,
}

impl JobPhase {
    /// Base progress fraction for this phase (§4.9).
    pub fn base_fraction(self) -> f64 {
        match self {
            JobPhase::Initializing => 0.05,
            JobPhase::Crawling => 0.10,
            JobPhase::Extracting => 0.70,
            JobPhase::Composing => 0.90,
        }
    }
}

/// Per-job inputs, validated once at `create` (§3, §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInputs {
    pub root_url: String,
    pub max_pages: u32,
    pub max_depth: u32,
    pub max_kb: u64,
    pub respect_robots: bool,
    pub request_full: bool,
    pub language: Option<String>,
    pub user_agent: String,
    pub request_delay_secs: f64,
}

impl JobInputs {
    pub const MAX_PAGES_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;
    pub const MAX_DEPTH_RANGE: std::ops::RangeInclusive<u32> = 1..=10;

    /// Field-level validation. Returns the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if url::Url::parse(&self.root_url).is_err() {
            return Err(format!("invalid root url: {}", self.root_url));
        }
        if !Self::MAX_PAGES_RANGE.contains(&self.max_pages) {
            return Err(format!(
                "max_pages must be in {:?}, got {}",
                Self::MAX_PAGES_RANGE,
                self.max_pages
            ));
        }
        if !Self::MAX_DEPTH_RANGE.contains(&self.max_depth) {
            return Err(format!(
                "max_depth must be in {:?}, got {}",
                Self::MAX_DEPTH_RANGE,
                self.max_depth
            ));
        }
        if self.max_kb == 0 {
            return Err("max_kb must be positive".into());
        }
        if self.request_delay_secs < 0.0 {
            return Err("request_delay_secs must be non-negative".into());
        }
        Ok(())
    }
}

/// A bounded ring buffer of the most recent processing log lines (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingLog {
    lines: std::collections::VecDeque<String>,
    capacity: usize,
}

impl ProcessingLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: std::collections::VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Progress/state counters carried on a [`Job`] (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCounters {
    pub pages_discovered: u32,
    pub pages_processed: u32,
    pub pages_crawled: u32,
}

impl Default for JobCounters {
    fn default() -> Self {
        Self {
            pages_discovered: 0,
            pages_processed: 0,
            pages_crawled: 0,
        }
    }
}

/// The unit of work tracked end-to-end by the Job Manager (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub inputs: JobInputs,
    pub status: JobStatus,
    pub progress: f64,
    pub phase: JobPhase,
    pub current_page_url: Option<String>,
    pub counters: JobCounters,
    pub message: String,
    #[serde(skip)]
    pub processing_logs: ProcessingLog,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub llm_txt_url: Option<String>,
    pub llms_full_txt_url: Option<String>,
    pub total_size_kb: Option<u64>,
    pub error_code: Option<String>,
    #[serde(skip)]
    pub cancelled: bool,
}

impl Job {
    pub fn new(id: JobId, inputs: JobInputs, created_at: i64) -> Self {
        Self {
            id,
            inputs,
            status: JobStatus::Pending,
            progress: 0.0,
            phase: JobPhase::Initializing,
            current_page_url: None,
            counters: JobCounters::default(),
            message: "queued".to_string(),
            processing_logs: ProcessingLog::new(200),
            created_at,
            completed_at: None,
            llm_txt_url: None,
            llms_full_txt_url: None,
            total_size_kb: None,
            error_code: None,
            cancelled: false,
        }
    }
}

/// Outcome of extracting a single fetched page (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Ok,
    Empty,
    RenderedFallback,
    SkippedByRobots,
    FetchError,
}

/// A heading captured from the DOM during extraction (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// A fenced code block captured during extraction (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub code: String,
}

/// An intermediate record created during crawl (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub depth: u32,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub markdown: String,
    pub headings: Vec<Heading>,
    pub code_blocks: Vec<CodeBlock>,
    pub status: ExtractionStatus,
    pub priority_score: f64,
    pub in_sitemap: bool,
}

impl Page {
    /// Canonical form: scheme+host lowercased, fragment removed, trailing
    /// slash normalized. Idempotent: `canon(canon(u)) == canon(u)` (§8 P4).
    pub fn canonicalize(raw: &url::Url) -> url::Url {
        let mut u = raw.clone();
        u.set_fragment(None);
        let _ = u.set_scheme(&u.scheme().to_ascii_lowercase());
        if let Some(host) = u.host_str() {
            let lowered = host.to_ascii_lowercase();
            let _ = u.set_host(Some(&lowered));
        }
        let path = u.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            u.set_path(path.trim_end_matches('/'));
        }
        u
    }
}

/// Artifact kind (§3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    #[serde(rename = "llm.txt")]
    LlmTxt,
    #[serde(rename = "llms-full.txt")]
    LlmsFullTxt,
}

impl ArtifactKind {
    pub fn storage_key(self) -> &'static str {
        match self {
            ArtifactKind::LlmTxt => "llm.txt",
            ArtifactKind::LlmsFullTxt => "llms-full.txt",
        }
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llm.txt" => Ok(ArtifactKind::LlmTxt),
            "llms-full.txt" => Ok(ArtifactKind::LlmsFullTxt),
            other => Err(format!("unknown artifact kind: {other}")),
        }
    }
}

/// A finished output file (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub content: String,
    pub size_bytes: u64,
    pub produced_at: i64,
    pub job_id: JobId,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, content: String, job_id: JobId, produced_at: i64) -> Self {
        let size_bytes = content.len() as u64;
        Self {
            kind,
            content,
            size_bytes,
            produced_at,
            job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn job_inputs_rejects_bad_url() {
        let mut inputs = sample_inputs();
        inputs.root_url = "not a url".to_string();
        assert!(inputs.validate().is_err());
    }

    #[test]
    fn job_inputs_rejects_out_of_range_pages() {
        let mut inputs = sample_inputs();
        inputs.max_pages = 0;
        assert!(inputs.validate().is_err());
        inputs.max_pages = 5000;
        assert!(inputs.validate().is_err());
    }

    #[test]
    fn job_inputs_accepts_defaults() {
        assert!(sample_inputs().validate().is_ok());
    }

    #[test]
    fn processing_log_bounds_capacity() {
        let mut log = ProcessingLog::new(2);
        log.push("a");
        log.push("b");
        log.push("c");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines, vec!["b", "c"]);
    }

    #[test]
    fn canonicalize_lowercases_and_strips_fragment_and_slash() {
        let u = url::Url::parse("HTTPS://Example.COM/Docs/#frag").unwrap();
        let c = Page::canonicalize(&u);
        assert_eq!(c.as_str(), "https://example.com/Docs");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let u = url::Url::parse("https://example.com/docs/").unwrap();
        let once = Page::canonicalize(&u);
        let twice = Page::canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn artifact_kind_round_trips_storage_key() {
        assert_eq!(
            ArtifactKind::from_str("llm.txt").unwrap().storage_key(),
            "llm.txt"
        );
        assert_eq!(
            ArtifactKind::from_str("llms-full.txt").unwrap().storage_key(),
            "llms-full.txt"
        );
        assert!(ArtifactKind::from_str("bogus").is_err());
    }

    #[test]
    fn job_id_round_trips_through_display_and_parse() {
        let id = JobId::new();
        let s = id.to_string();
        let parsed: JobId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    fn sample_inputs() -> JobInputs {
        JobInputs {
            root_url: "https://example.com/docs".to_string(),
            max_pages: 100,
            max_depth: 3,
            max_kb: 500,
            respect_robots: true,
            request_full: false,
            language: None,
            user_agent: "docforge/0.1".to_string(),
            request_delay_secs: 0.5,
        }
    }
}
