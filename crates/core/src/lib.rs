//! Orchestrator (C9, spec.md §4.9): ties the Robots/Fetcher/Frontier,
//! Extractor, Summarizer, and Composer crates into the end-to-end
//! generation pipeline run for a single job.

pub mod orchestrator;

pub use orchestrator::{DEFAULT_JOB_CEILING_SECS, GenerationOutput, ProgressReporter, SilentProgress, run_generation};
