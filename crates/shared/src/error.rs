//! Error taxonomy for the generation pipeline (§7).
//!
//! Library crates use [`DocforgeError`] via `thiserror`. App crates
//! (cli/server) wrap this with `color-eyre` for rich diagnostics. Each
//! variant carries a stable [`DocforgeError::code`] used verbatim in
//! `Job.error_code` and the CLI's exit-code mapping.

use std::path::PathBuf;

/// Top-level error type for all docforge operations.
#[derive(Debug, thiserror::Error)]
pub enum DocforgeError {
    /// Invalid URL or out-of-range job input. Reported synchronously at
    /// `create`; the job never starts.
    #[error("invalid input: {message}")]
    Input { message: String },

    /// robots.txt unreachable or sitemap malformed. Non-fatal; the caller
    /// degrades to "allow all" / "no sitemap".
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Network/HTTP error fetching a page.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// A fetch was blocked by robots.txt.
    #[error("blocked by robots.txt: {0}")]
    RobotsBlocked(String),

    /// A fetch exceeded the per-page size cap.
    #[error("page too large: {0}")]
    TooLarge(String),

    /// A fetch timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// HTML parsing or content extraction error.
    #[error("extraction error: {message}")]
    Extraction { message: String },

    /// LLM summarization error (request, response parsing, persistent
    /// failure after bounded retries).
    #[error("summarization error: {0}")]
    Summarization(String),

    /// Zero admissible pages, or an internal composition assertion
    /// failure. Fatal: job transitions to `failed`.
    #[error("composition error: {0}")]
    Composition(String),

    /// Artifact Store read/write failure. Fatal: job transitions to
    /// `failed`; partial state is not advertised.
    #[error("store error: {0}")]
    Store(String),

    /// Filesystem I/O error (CLI output, local memory-backend persistence).
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// User-initiated cancellation or wall-clock timeout observed at a
    /// checkpoint.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DocforgeError>;

impl DocforgeError {
    /// Create an input-validation error from any displayable message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input {
            message: msg.into(),
        }
    }

    /// Create an extraction error from any displayable message.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code, surfaced on `Job.error_code` and used
    /// by the CLI to pick an exit code (§6.4, §7).
    pub fn code(&self) -> &'static str {
        match self {
            DocforgeError::Input { .. } => "invalid_input",
            DocforgeError::Discovery(_) => "discovery_error",
            DocforgeError::Fetch(_) => "fetch_error",
            DocforgeError::RobotsBlocked(_) => "blocked_by_robots",
            DocforgeError::TooLarge(_) => "too_large",
            DocforgeError::Timeout(_) => "timeout",
            DocforgeError::Extraction { .. } => "extraction_error",
            DocforgeError::Summarization(_) => "summarization_error",
            DocforgeError::Composition(_) => "no_usable_content",
            DocforgeError::Store(_) => "store_error",
            DocforgeError::Io { .. } => "io_error",
            DocforgeError::Cancelled(_) => "cancelled",
        }
    }

    /// Whether this error class is fatal to the owning job (§7
    /// propagation policy) as opposed to a per-page error absorbed
    /// locally by the orchestrator.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DocforgeError::Input { .. }
                | DocforgeError::RobotsBlocked(_)
                | DocforgeError::Composition(_)
                | DocforgeError::Store(_)
                | DocforgeError::Cancelled(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DocforgeError::input("max_pages out of range");
        assert_eq!(err.to_string(), "invalid input: max_pages out of range");
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(DocforgeError::input("x").code(), "invalid_input");
        assert_eq!(
            DocforgeError::RobotsBlocked("x".into()).code(),
            "blocked_by_robots"
        );
        assert_eq!(DocforgeError::Timeout("x".into()).code(), "timeout");
    }

    #[test]
    fn fatal_classification_matches_taxonomy() {
        assert!(DocforgeError::input("x").is_fatal());
        assert!(DocforgeError::Composition("x".into()).is_fatal());
        assert!(!DocforgeError::Fetch("x".into()).is_fatal());
        assert!(!DocforgeError::Summarization("x".into()).is_fatal());
    }
}
