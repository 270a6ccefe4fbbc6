//! Process-wide service configuration (§6.2).
//!
//! Unlike a file-backed app config, this service is configured entirely from
//! the environment: [`ServiceDefaults`] is read once at process start and
//! merged with per-request fields ([`crate::types::JobInputs`]) at `create`
//! time. There is no config file and no discovery of one.

use crate::error::{DocforgeError, Result};

/// Artifact Store backend selection (§4.8, §6.2 `STORAGE_BACKEND`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    ObjectStore,
}

impl std::str::FromStr for StorageBackend {
    type Err = DocforgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "memory" => Ok(StorageBackend::Memory),
            "object_store" => Ok(StorageBackend::ObjectStore),
            other => Err(DocforgeError::input(format!(
                "STORAGE_BACKEND must be 'memory' or 'object_store', got '{other}'"
            ))),
        }
    }
}

/// Process-wide defaults, read once from the environment (§6.2).
///
/// Per-request [`crate::types::JobInputs`] override the page/depth/size
/// defaults here; the storage and LLM settings are process-wide only.
#[derive(Debug, Clone)]
pub struct ServiceDefaults {
    pub max_pages: u32,
    pub max_depth: u32,
    pub max_kb: u64,
    pub request_delay_secs: f64,
    pub user_agent: String,
    pub llm_api_base: String,
    pub llm_api_key: Option<String>,
    pub llm_model_id: String,
    pub storage_backend: StorageBackend,
    pub object_store_bucket: Option<String>,
    pub object_store_prefix: String,
    pub object_store_region: Option<String>,
    pub job_ttl_days: u32,
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            max_pages: 100,
            max_depth: 3,
            max_kb: 500,
            request_delay_secs: 0.5,
            user_agent: format!("docforge/{}", env!("CARGO_PKG_VERSION")),
            llm_api_base: "https://api.openai.com/v1".to_string(),
            llm_api_key: None,
            llm_model_id: "gpt-4o-mini".to_string(),
            storage_backend: StorageBackend::Memory,
            object_store_bucket: None,
            object_store_prefix: "jobs".to_string(),
            object_store_region: None,
            job_ttl_days: 30,
        }
    }
}

impl ServiceDefaults {
    /// Load defaults from the environment, falling back to built-in values
    /// for anything unset. Range-validates the same way
    /// [`crate::types::JobInputs::validate`] does for per-request fields.
    pub fn from_env() -> Result<Self> {
        let mut defaults = Self::default();

        if let Some(v) = env_u32("MAX_PAGES")? {
            if !crate::types::JobInputs::MAX_PAGES_RANGE.contains(&v) {
                return Err(DocforgeError::input(format!(
                    "MAX_PAGES must be in 1..=1000, got {v}"
                )));
            }
            defaults.max_pages = v;
        }
        if let Some(v) = env_u32("MAX_DEPTH")? {
            if !crate::types::JobInputs::MAX_DEPTH_RANGE.contains(&v) {
                return Err(DocforgeError::input(format!(
                    "MAX_DEPTH must be in 1..=10, got {v}"
                )));
            }
            defaults.max_depth = v;
        }
        if let Some(v) = env_u64("MAX_KB")? {
            defaults.max_kb = v;
        }
        if let Some(v) = env_f64("REQUEST_DELAY")? {
            defaults.request_delay_secs = v;
        }
        if let Ok(v) = std::env::var("USER_AGENT") {
            if !v.is_empty() {
                defaults.user_agent = v;
            }
        }
        if let Ok(v) = std::env::var("LLM_API_BASE") {
            if !v.is_empty() {
                defaults.llm_api_base = v;
            }
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            if !v.is_empty() {
                defaults.llm_api_key = Some(v);
            }
        }
        if let Ok(v) = std::env::var("LLM_MODEL_ID") {
            if !v.is_empty() {
                defaults.llm_model_id = v;
            }
        }
        if let Ok(v) = std::env::var("STORAGE_BACKEND") {
            defaults.storage_backend = v.parse()?;
        }
        if let Ok(v) = std::env::var("OBJECT_STORE_BUCKET") {
            defaults.object_store_bucket = Some(v);
        }
        if let Ok(v) = std::env::var("OBJECT_STORE_PREFIX") {
            defaults.object_store_prefix = v;
        }
        if let Ok(v) = std::env::var("OBJECT_STORE_REGION") {
            defaults.object_store_region = Some(v);
        }
        if let Some(v) = env_u32("JOB_TTL_DAYS")? {
            defaults.job_ttl_days = v;
        }

        if defaults.storage_backend == StorageBackend::ObjectStore
            && defaults.object_store_bucket.is_none()
        {
            return Err(DocforgeError::input(
                "OBJECT_STORE_BUCKET is required when STORAGE_BACKEND=object_store",
            ));
        }

        Ok(defaults)
    }
}

fn env_u32(name: &str) -> Result<Option<u32>> {
    match std::env::var(name) {
        Ok(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|e| DocforgeError::input(format!("{name} must be an integer: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(v) => v
            .parse::<u64>()
            .map(Some)
            .map_err(|e| DocforgeError::input(format!("{name} must be an integer: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_f64(name: &str) -> Result<Option<f64>> {
    match std::env::var(name) {
        Ok(v) => v
            .parse::<f64>()
            .map(Some)
            .map_err(|e| DocforgeError::input(format!("{name} must be a number: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let defaults = ServiceDefaults::default();
        assert_eq!(defaults.max_pages, 100);
        assert_eq!(defaults.max_depth, 3);
        assert_eq!(defaults.storage_backend, StorageBackend::Memory);
    }

    #[test]
    fn storage_backend_parses_known_values() {
        assert_eq!(
            "memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::Memory
        );
        assert_eq!(
            "object_store".parse::<StorageBackend>().unwrap(),
            StorageBackend::ObjectStore
        );
        assert!("bogus".parse::<StorageBackend>().is_err());
    }
}
