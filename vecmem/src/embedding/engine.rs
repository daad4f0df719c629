//! Vector embedding engine
//!
//! Chooses one backend at initialization, in priority order: embedding
//! server, remote API, in-process model, hash. The choice is fixed for the
//! engine's lifetime. Individual calls that fail degrade to a fallback for
//! that call only, so `embed` always returns a vector of the configured
//! dimension.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::api::ApiEmbedder;
use super::cache::EmbeddingCache;
use super::discovery::find_model_cache_dir;
use super::hash::hash_embedding;
use super::local::LocalEmbedder;
use super::server::ServerEmbedder;
use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};
use crate::math::{conform_dimension, cosine_similarity};

/// The backend that serves embeddings
pub enum EmbeddingBackend {
    Server(ServerEmbedder),
    Api(ApiEmbedder),
    Local(Arc<LocalEmbedder>),
    Hash,
}

impl EmbeddingBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Server(_) => BackendKind::Server,
            Self::Api(_) => BackendKind::Api,
            Self::Local(_) => BackendKind::Local,
            Self::Hash => BackendKind::Hash,
        }
    }
}

/// Name of a backend, as reported in stats and exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "embedding-server")]
    Server,
    #[serde(rename = "api")]
    Api,
    #[serde(rename = "local-model")]
    Local,
    #[serde(rename = "hash")]
    Hash,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "embedding-server",
            Self::Api => "api",
            Self::Local => "local-model",
            Self::Hash => "hash",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Embedding pipeline: backend + cache + fallbacks
pub struct EmbeddingEngine {
    backend: EmbeddingBackend,
    /// In-process model, if one is loaded; the server's per-call fallback
    local: Option<Arc<LocalEmbedder>>,
    cache: EmbeddingCache,
    dimension: usize,
}

impl EmbeddingEngine {
    /// Probe the configured backends and keep the first that works
    pub async fn initialize(config: &EmbeddingConfig, dimension: usize) -> Self {
        Self::initialize_with_local(config, dimension, None).await
    }

    /// Like [`initialize`](Self::initialize), reusing a model the caller
    /// already loaded.
    ///
    /// The model takes the place of the local-model probe and also serves as
    /// the per-call fallback when the embedding server is selected.
    pub async fn initialize_with_local(
        config: &EmbeddingConfig,
        dimension: usize,
        preloaded: Option<Arc<LocalEmbedder>>,
    ) -> Self {
        let backend = Self::select_backend(config, dimension, preloaded.clone()).await;
        log::info!(
            "Embedding backend selected: {} ({}d)",
            backend.kind(),
            dimension
        );
        Self::with_backend(backend, preloaded, config, dimension)
    }

    /// Engine around an already chosen backend and an optional loaded model
    pub fn with_backend(
        backend: EmbeddingBackend,
        local: Option<Arc<LocalEmbedder>>,
        config: &EmbeddingConfig,
        dimension: usize,
    ) -> Self {
        let local = match &backend {
            EmbeddingBackend::Local(model) => Some(Arc::clone(model)),
            _ => local,
        };
        Self {
            backend,
            local,
            cache: EmbeddingCache::new(config.cache_ttl, config.cache_capacity),
            dimension,
        }
    }

    /// Engine that only produces hash embeddings
    pub fn hash_only(config: &EmbeddingConfig, dimension: usize) -> Self {
        Self::with_backend(EmbeddingBackend::Hash, None, config, dimension)
    }

    async fn select_backend(
        config: &EmbeddingConfig,
        dimension: usize,
        preloaded: Option<Arc<LocalEmbedder>>,
    ) -> EmbeddingBackend {
        if let Some(url) = config.server_url.as_deref().filter(|u| !u.is_empty()) {
            match ServerEmbedder::new(url, config) {
                Ok(server) => {
                    let healthy = server
                        .probe(
                            config.health_attempts,
                            config.health_timeout,
                            config.health_backoff,
                        )
                        .await;
                    if healthy {
                        return EmbeddingBackend::Server(server);
                    }
                    log::warn!("Embedding server at {} unavailable", url);
                }
                Err(e) => log::warn!("Could not build embedding server client: {}", e),
            }
        }

        match ApiEmbedder::from_config(config) {
            Ok(Some(api)) => match api.probe(config.api_probe_timeout).await {
                Ok(()) => {
                    log::info!("Remote embedding API reachable");
                    return EmbeddingBackend::Api(api);
                }
                Err(e) => log::warn!("Remote embedding API probe failed: {}", e),
            },
            Ok(None) => {}
            Err(e) => log::warn!("Could not build embedding API client: {}", e),
        }

        if let Some(model) = preloaded {
            log::info!("Using preloaded local embedding model");
            return EmbeddingBackend::Local(model);
        }

        if config.enable_local_model {
            let cache_dir = find_model_cache_dir(config.model_cache_dir.as_deref());
            match LocalEmbedder::load(cache_dir, config.local_load_timeout).await {
                Ok(model) => {
                    if model.dimension() != dimension {
                        log::warn!(
                            "Local model produces {}d vectors; conforming to {}d",
                            model.dimension(),
                            dimension
                        );
                    }
                    return EmbeddingBackend::Local(Arc::new(model));
                }
                Err(e) => log::warn!("Local embedding model unavailable: {}", e),
            }
        }

        log::warn!("No embedding backend available; using deterministic hash embeddings");
        EmbeddingBackend::Hash
    }

    /// Active backend
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Embed one text. Never fails.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        if let Some(cached) = self.cache.get(text) {
            return cached;
        }

        match self.embed_primary(text).await {
            Ok(vector) => {
                self.cache.put(text, vector.clone());
                vector
            }
            Err(e) => {
                log::warn!("{} embedding failed, falling back: {}", self.kind(), e);
                // Fallback vectors are not cached so the next call retries the backend
                self.embed_fallback(text).await
            }
        }
    }

    /// Embed many texts, in input order. Never fails.
    ///
    /// Server, API and local backends get one batched call; if that fails every
    /// text is retried through [`embed`](Self::embed).
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut results: Vec<Option<Vec<f32>>> =
            texts.iter().map(|text| self.cache.get(text)).collect();

        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, cached)| cached.is_none())
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            let pending: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = match self.embed_batch_primary(&pending).await {
                Some(vectors) => vectors,
                None => join_all(pending.iter().map(|text| self.embed(text))).await,
            };
            for (idx, vector) in missing.into_iter().zip(fresh) {
                results[idx] = Some(vector);
            }
        }

        results
            .into_iter()
            .zip(texts)
            .map(|(vector, text)| vector.unwrap_or_else(|| hash_embedding(text, self.dimension)))
            .collect()
    }

    /// Cosine similarity between the embeddings of two texts
    pub async fn similarity(&self, a: &str, b: &str) -> f32 {
        let (va, vb) = futures::join!(self.embed(a), self.embed(b));
        cosine_similarity(&va, &vb)
    }

    async fn embed_primary(&self, text: &str) -> Result<Vec<f32>> {
        let raw = match &self.backend {
            EmbeddingBackend::Server(server) => server.embed(text).await?,
            EmbeddingBackend::Api(api) => api.embed(text).await?,
            EmbeddingBackend::Local(model) => model.embed(text).await?,
            EmbeddingBackend::Hash => return Ok(hash_embedding(text, self.dimension)),
        };
        self.conform(raw)
    }

    async fn embed_batch_primary(&self, texts: &[String]) -> Option<Vec<Vec<f32>>> {
        if texts.len() < 2 {
            return None;
        }
        let raw = match &self.backend {
            EmbeddingBackend::Server(server) => server.embed_batch(texts).await,
            EmbeddingBackend::Api(api) => api.embed_batch(texts).await,
            EmbeddingBackend::Local(model) => model.embed_batch(texts.to_vec()).await,
            EmbeddingBackend::Hash => return None,
        };

        let conformed = raw.and_then(|vectors| {
            vectors
                .into_iter()
                .map(|v| self.conform(v))
                .collect::<Result<Vec<_>>>()
        });
        match conformed {
            Ok(vectors) => {
                for (text, vector) in texts.iter().zip(&vectors) {
                    self.cache.put(text, vector.clone());
                }
                Some(vectors)
            }
            Err(e) => {
                log::warn!(
                    "Batch embedding of {} texts failed, retrying individually: {}",
                    texts.len(),
                    e
                );
                None
            }
        }
    }

    async fn embed_fallback(&self, text: &str) -> Vec<f32> {
        if let (EmbeddingBackend::Server(_), Some(model)) = (&self.backend, &self.local) {
            match model.embed(text).await.and_then(|v| self.conform(v)) {
                Ok(vector) => return vector,
                Err(e) => log::warn!("Local model fallback failed: {}", e),
            }
        }
        hash_embedding(text, self.dimension)
    }

    fn conform(&self, raw: Vec<f32>) -> Result<Vec<f32>> {
        let len = raw.len();
        conform_dimension(raw, self.dimension).ok_or_else(|| {
            MemoryError::embedding(format!(
                "unusable {}-length vector from {}",
                len,
                self.kind()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TextEncoder;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    /// Encoder that maps every text to the same direction
    struct ConstantEncoder(Vec<f32>);

    impl TextEncoder for ConstantEncoder {
        fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(vec![self.0.clone(); texts.len()])
        }
    }

    fn loaded_model(vector: Vec<f32>) -> Arc<LocalEmbedder> {
        let dimension = vector.len();
        Arc::new(LocalEmbedder::from_encoder(
            Arc::new(ConstantEncoder(vector)),
            dimension,
        ))
    }

    fn fast_config(server_url: Option<String>) -> EmbeddingConfig {
        EmbeddingConfig {
            server_url,
            health_attempts: 2,
            health_timeout: Duration::from_secs(1),
            health_backoff: Duration::from_millis(10),
            ..EmbeddingConfig::offline()
        }
    }

    async fn healthy_server() -> MockServer {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).json_body(json!({"status": "healthy"}));
            })
            .await;
        server
    }

    #[tokio::test]
    async fn test_hash_backend_when_nothing_configured() {
        let engine = EmbeddingEngine::initialize(&fast_config(None), 64).await;
        assert_eq!(engine.kind(), BackendKind::Hash);

        let a = engine.embed("hello").await;
        let b = engine.embed("hello").await;
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert_eq!(a, hash_embedding("hello", 64));
        assert_eq!(engine.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_server_selected_and_dimension_conformed() {
        let server = healthy_server().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embed/single");
                then.status(200).json_body(json!({"embedding": [3.0, 4.0], "dimension": 2}));
            })
            .await;

        let engine = EmbeddingEngine::initialize(&fast_config(Some(server.base_url())), 4).await;
        assert_eq!(engine.kind(), BackendKind::Server);

        let v = engine.embed("anything").await;
        assert_eq!(v.len(), 4);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(v[2], 0.0);
    }

    #[tokio::test]
    async fn test_server_call_failure_falls_back_to_hash() {
        let server = healthy_server().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embed/single");
                then.status(500);
            })
            .await;

        let engine = EmbeddingEngine::initialize(&fast_config(Some(server.base_url())), 16).await;
        assert_eq!(engine.kind(), BackendKind::Server);

        let v = engine.embed("fallback me").await;
        assert_eq!(v, hash_embedding("fallback me", 16));
        // Selection is unchanged and the degraded vector is not cached
        assert_eq!(engine.kind(), BackendKind::Server);
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn test_server_call_failure_uses_loaded_model() {
        let server = healthy_server().await;
        let single = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed/single");
                then.status(500);
            })
            .await;

        let engine = EmbeddingEngine::initialize_with_local(
            &fast_config(Some(server.base_url())),
            3,
            Some(loaded_model(vec![0.0, 0.0, 2.0])),
        )
        .await;
        assert_eq!(engine.kind(), BackendKind::Server);

        let v = engine.embed("server is down").await;
        assert_eq!(v, vec![0.0, 0.0, 1.0]);
        assert_ne!(v, hash_embedding("server is down", 3));
        single.assert_hits_async(1).await;
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn test_preloaded_model_skips_loading() {
        let model = loaded_model(vec![1.0, 0.0]);
        let engine = EmbeddingEngine::initialize_with_local(&fast_config(None), 2, Some(model)).await;
        assert_eq!(engine.kind(), BackendKind::Local);
        assert_eq!(engine.embed("anything").await, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_api_batch_uses_single_request() {
        let server = MockServer::start_async().await;
        let api = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .body_contains("\"input\":[");
                then.status(200).json_body(json!({"data": [
                    {"embedding": [1.0, 0.0], "index": 0},
                    {"embedding": [0.0, 1.0], "index": 1}
                ]}));
            })
            .await;
        let probe = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .body_contains("\"input\":\"test\"");
                then.status(200)
                    .json_body(json!({"data": [{"embedding": [1.0, 1.0], "index": 0}]}));
            })
            .await;

        let config = EmbeddingConfig {
            api_url: Some(server.url("/v1/embeddings")),
            api_key: Some("sk-test".into()),
            ..fast_config(None)
        };
        let engine = EmbeddingEngine::initialize(&config, 2).await;
        assert_eq!(engine.kind(), BackendKind::Api);
        probe.assert_hits_async(1).await;

        let texts = vec!["first".to_string(), "second".to_string()];
        let out = engine.embed_batch(&texts).await;
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        api.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_unhealthy_server_falls_through_to_api() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(503);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200)
                    .json_body(json!({"data": [{"embedding": [1.0, 0.0, 0.0], "index": 0}]}));
            })
            .await;

        let config = EmbeddingConfig {
            api_url: Some(server.url("/v1/embeddings")),
            api_key: Some("sk-test".into()),
            ..fast_config(Some(server.base_url()))
        };
        let engine = EmbeddingEngine::initialize(&config, 3).await;
        assert_eq!(engine.kind(), BackendKind::Api);
        assert_eq!(engine.embed("x").await, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_batch_uses_single_request() {
        let server = healthy_server().await;
        let batch = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(200).json_body(json!({
                    "embeddings": [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
                    "dimension": 2,
                    "count": 3
                }));
            })
            .await;

        let engine = EmbeddingEngine::initialize(&fast_config(Some(server.base_url())), 2).await;
        let texts: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let out = engine.embed_batch(&texts).await;

        assert_eq!(out.len(), 3);
        assert_eq!(out[0], vec![1.0, 0.0]);
        assert_eq!(out[1], vec![0.0, 1.0]);
        batch.assert_hits_async(1).await;
        assert_eq!(engine.cache().len(), 3);

        // Fully cached now: no second request
        engine.embed_batch(&texts).await;
        batch.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_batch_failure_retries_each_text() {
        let server = healthy_server().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(500);
            })
            .await;
        let single = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed/single");
                then.status(200).json_body(json!({"embedding": [0.0, 2.0]}));
            })
            .await;

        let engine = EmbeddingEngine::initialize(&fast_config(Some(server.base_url())), 2).await;
        let texts: Vec<String> = ["one", "two", "three"].iter().map(|s| s.to_string()).collect();
        let out = engine.embed_batch(&texts).await;

        assert_eq!(out, vec![vec![0.0, 1.0]; 3]);
        single.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn test_similarity_identical_texts() {
        let engine = EmbeddingEngine::hash_only(&EmbeddingConfig::offline(), 32);
        let s = engine.similarity("same", "same").await;
        assert!((s - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_engine_without_runtime() {
        let engine = EmbeddingEngine::hash_only(&EmbeddingConfig::offline(), 8);
        let v = tokio_test::block_on(engine.embed("no runtime needed"));
        assert_eq!(v.len(), 8);
    }

    #[test]
    fn test_backend_kind_names() {
        assert_eq!(BackendKind::Server.to_string(), "embedding-server");
        assert_eq!(
            serde_json::to_value(BackendKind::Local).unwrap(),
            json!("local-model")
        );
    }
}
