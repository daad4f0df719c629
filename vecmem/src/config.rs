//! Store configuration
//!
//! All settings have defaults; `StoreConfig::from_env` layers `VECMEM_*`
//! environment overrides on top.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default embedding dimension (all-MiniLM-L6-v2)
pub const DEFAULT_DIMENSION: usize = 384;

/// Default embedding server address
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5002";

/// Top-level configuration for a [`VectorStore`](crate::VectorStore)
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// RocksDB directory; `None` runs memory-only
    pub data_dir: Option<PathBuf>,
    /// Fixed embedding dimension D
    pub dimension: usize,
    /// Default minimum cosine score for search results
    pub similarity_threshold: f32,
    /// Default maximum number of search results
    pub max_results: usize,
    /// Chunk size for batch store and import
    pub batch_size: usize,
    /// Embedding pipeline settings
    pub embedding: EmbeddingConfig,
    /// Index parameters
    pub hnsw: HnswConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            dimension: DEFAULT_DIMENSION,
            similarity_threshold: 0.3,
            max_results: 10,
            batch_size: 50,
            embedding: EmbeddingConfig::default(),
            hnsw: HnswConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Memory-only config that never touches the network or model files.
    ///
    /// Embeddings come from the hash backend. Handy for tests and tooling.
    pub fn offline(dimension: usize) -> Self {
        Self {
            dimension,
            embedding: EmbeddingConfig::offline(),
            ..Default::default()
        }
    }

    /// Defaults with `VECMEM_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `VECMEM_*` environment overrides in place
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("VECMEM_DATA_DIR") {
            if !dir.is_empty() {
                self.data_dir = Some(PathBuf::from(dir));
            }
        }
        if let Some(dimension) = parse_env::<usize>("VECMEM_DIMENSION") {
            if dimension > 0 {
                self.dimension = dimension;
            }
        }
        if let Some(threshold) = parse_env::<f32>("VECMEM_SIMILARITY_THRESHOLD") {
            self.similarity_threshold = threshold;
        }
        if let Some(batch_size) = parse_env::<usize>("VECMEM_BATCH_SIZE") {
            self.batch_size = batch_size.max(1);
        }
        self.embedding.apply_env();
    }
}

/// Embedding pipeline configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Embedding server base URL (`None` skips the server probe)
    pub server_url: Option<String>,
    /// Remote embedding API endpoint
    pub api_url: Option<String>,
    /// Bearer token for the remote API
    pub api_key: Option<String>,
    /// Model name sent to the remote API
    pub api_model: String,
    /// Whether to try loading the in-process model
    pub enable_local_model: bool,
    /// Where the in-process model files are cached
    pub model_cache_dir: Option<PathBuf>,
    /// Per-attempt timeout of the server health check
    pub health_timeout: Duration,
    /// Number of server health attempts
    pub health_attempts: u32,
    /// Pause between server health attempts
    pub health_backoff: Duration,
    /// Timeout of the remote API probe request
    pub api_probe_timeout: Duration,
    /// Ceiling on loading and warming the in-process model
    pub local_load_timeout: Duration,
    /// Timeout of a single-text server request
    pub single_timeout: Duration,
    /// Timeout of a batched server request
    pub batch_timeout: Duration,
    /// Age after which cached embeddings are recomputed
    pub cache_ttl: Duration,
    /// Cache size that triggers eviction
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            server_url: Some(DEFAULT_SERVER_URL.to_string()),
            api_url: None,
            api_key: None,
            api_model: "text-embedding-3-small".to_string(),
            enable_local_model: true,
            model_cache_dir: None,
            health_timeout: Duration::from_secs(3),
            health_attempts: 3,
            health_backoff: Duration::from_secs(1),
            api_probe_timeout: Duration::from_secs(5),
            local_load_timeout: Duration::from_secs(8),
            single_timeout: Duration::from_secs(10),
            batch_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(60 * 60),
            cache_capacity: 10_000,
        }
    }
}

impl EmbeddingConfig {
    /// No server, no API, no local model: hash embeddings only
    pub fn offline() -> Self {
        Self {
            server_url: None,
            enable_local_model: false,
            ..Default::default()
        }
    }

    /// Whether a remote API is fully configured
    pub fn has_api(&self) -> bool {
        matches!((&self.api_url, &self.api_key), (Some(url), Some(key)) if !url.is_empty() && !key.is_empty())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("VECMEM_EMBEDDING_SERVER_URL") {
            // An empty value disables the server probe entirely
            self.server_url = if url.is_empty() { None } else { Some(url) };
        }
        if let Ok(url) = std::env::var("VECMEM_EMBEDDING_API_URL") {
            self.api_url = Some(url);
        }
        if let Ok(key) = std::env::var("VECMEM_EMBEDDING_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("VECMEM_EMBEDDING_API_MODEL") {
            self.api_model = model;
        }
        if let Some(disabled) = parse_env::<bool>("VECMEM_DISABLE_LOCAL_MODEL") {
            self.enable_local_model = !disabled;
        }
        if let Ok(path) = std::env::var("VECMEM_MODELS_PATH") {
            self.model_cache_dir = Some(PathBuf::from(path));
        }
    }
}

/// HNSW index parameters
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Max neighbours per node per layer
    pub m: usize,
    /// Candidate pool size while inserting
    pub ef_construction: usize,
    /// Candidate pool size while querying
    pub ef_search: usize,
    /// Hard cap on the number of layers above 0
    pub max_level: usize,
    /// Seed for level assignment; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            max_level: 16,
            seed: None,
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.dimension, 384);
        assert_eq!(config.max_results, 10);
        assert!(config.data_dir.is_none());
        assert_eq!(config.hnsw.m, 16);
        assert_eq!(config.hnsw.max_level, 16);
    }

    #[test]
    fn test_embedding_timeouts_default() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.health_timeout, Duration::from_secs(3));
        assert_eq!(config.health_attempts, 3);
        assert_eq!(config.health_backoff, Duration::from_secs(1));
        assert_eq!(config.api_probe_timeout, Duration::from_secs(5));
        assert_eq!(config.local_load_timeout, Duration::from_secs(8));
        assert_eq!(config.single_timeout, Duration::from_secs(10));
        assert_eq!(config.batch_timeout, Duration::from_secs(30));
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.cache_capacity, 10_000);
    }

    #[test]
    fn test_offline_disables_probes() {
        let config = StoreConfig::offline(32);
        assert_eq!(config.dimension, 32);
        assert!(config.embedding.server_url.is_none());
        assert!(!config.embedding.enable_local_model);
        assert!(!config.embedding.has_api());
    }

    #[test]
    fn test_has_api_requires_url_and_key() {
        let mut config = EmbeddingConfig::offline();
        config.api_url = Some("https://example.invalid/v1/embeddings".into());
        assert!(!config.has_api());
        config.api_key = Some(String::new());
        assert!(!config.has_api());
        config.api_key = Some("sk-test".into());
        assert!(config.has_api());
    }
}
