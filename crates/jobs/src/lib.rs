//! Job Manager (C7, spec.md §4.7) + Artifact Store (C8, spec.md §4.8).
//!
//! The manager owns an in-process job registry; the store owns durable
//! bytes. Both are plain structs rather than traits because there is
//! exactly one registry per process — only the store backend varies by
//! deployment (§6.2 `STORAGE_BACKEND`), which is why [`store::ArtifactStore`]
//! is the one trait in this crate.

pub mod manager;
pub mod store;

pub use manager::{CancelOutcome, JobManager};
pub use store::{ArtifactStore, DownloadOutcome, MemoryStore, ObjectStoreBackend, StoreError};
