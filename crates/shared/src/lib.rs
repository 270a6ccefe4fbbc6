//! Shared domain types, error model, and configuration for the generation
//! service.
//!
//! This crate is the foundation depended on by every other crate in the
//! workspace. It provides:
//! - [`DocforgeError`] — the unified error taxonomy (§7)
//! - Domain types ([`Job`], [`Page`], [`Artifact`] and friends, §3)
//! - Configuration ([`ServiceDefaults`] loaded from the environment, §6.2)

pub mod config;
pub mod error;
pub mod types;

pub use config::ServiceDefaults;
pub use error::{DocforgeError, Result};
pub use types::{
    Artifact, ArtifactKind, CodeBlock, ExtractionStatus, Heading, Job, JobCounters, JobId,
    JobInputs, JobPhase, JobStatus, Page, ProcessingLog,
};
