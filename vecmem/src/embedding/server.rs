//! Embedding server client
//!
//! Talks to a local (usually GPU-backed) embedding service:
//! `GET /health`, `POST /embed/single` and `POST /embed`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};

/// Server-side cap on texts per `/embed` request
pub const MAX_TEXTS_PER_REQUEST: usize = 1_000;

/// Server-side cap on characters per text
pub const MAX_TEXT_CHARS: usize = 10_000;

#[derive(Serialize)]
struct SingleRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct SingleResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    texts: Vec<&'a str>,
    use_cache: bool,
}

#[derive(Deserialize)]
struct BatchResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Truncate to the server's per-text limit, on a char boundary
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// HTTP client for the embedding server
#[derive(Clone)]
pub struct ServerEmbedder {
    client: reqwest::Client,
    base_url: String,
    single_timeout: Duration,
    batch_timeout: Duration,
}

impl ServerEmbedder {
    pub fn new(base_url: &str, config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            single_timeout: config.single_timeout,
            batch_timeout: config.batch_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One health request
    pub async fn health_check(&self, timeout: Duration) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(timeout)
            .send()
            .await?;
        response.error_for_status()?;
        Ok(())
    }

    /// Health-check with retries. True once any attempt succeeds.
    pub async fn probe(&self, attempts: u32, timeout: Duration, backoff: Duration) -> bool {
        for attempt in 1..=attempts.max(1) {
            match self.health_check(timeout).await {
                Ok(()) => {
                    log::info!(
                        "Embedding server healthy at {} (attempt {}/{})",
                        self.base_url,
                        attempt,
                        attempts
                    );
                    return true;
                }
                Err(e) => {
                    log::warn!(
                        "Embedding server health check {}/{} failed: {}",
                        attempt,
                        attempts,
                        e
                    );
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        false
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/embed/single", self.base_url))
            .timeout(self.single_timeout)
            .json(&SingleRequest {
                text: truncate_chars(text, MAX_TEXT_CHARS),
            })
            .send()
            .await?
            .error_for_status()?;

        let body: SingleResponse = response.json().await?;
        Ok(body.embedding)
    }

    /// Embed many texts, splitting into server-sized requests
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_TEXTS_PER_REQUEST) {
            let request = BatchRequest {
                texts: chunk
                    .iter()
                    .map(|t| truncate_chars(t, MAX_TEXT_CHARS))
                    .collect(),
                use_cache: true,
            };
            let response = self
                .client
                .post(format!("{}/embed", self.base_url))
                .timeout(self.batch_timeout)
                .json(&request)
                .send()
                .await?
                .error_for_status()?;

            let body: BatchResponse = response.json().await?;
            if body.embeddings.len() != chunk.len() {
                return Err(MemoryError::embedding(format!(
                    "server returned {} embeddings for {} texts",
                    body.embeddings.len(),
                    chunk.len()
                )));
            }
            out.extend(body.embeddings);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn embedder(server: &MockServer) -> ServerEmbedder {
        ServerEmbedder::new(&server.base_url(), &EmbeddingConfig::offline()).unwrap()
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hé", 5), "hé");
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn test_probe_healthy() {
        let server = MockServer::start_async().await;
        let health = server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(200).json_body(json!({"status": "healthy"}));
            })
            .await;

        let ok = embedder(&server)
            .probe(3, Duration::from_secs(1), Duration::from_millis(10))
            .await;
        assert!(ok);
        health.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_probe_retries_then_gives_up() {
        let server = MockServer::start_async().await;
        let health = server
            .mock_async(|when, then| {
                when.method(GET).path("/health");
                then.status(503);
            })
            .await;

        let ok = embedder(&server)
            .probe(3, Duration::from_secs(1), Duration::from_millis(10))
            .await;
        assert!(!ok);
        health.assert_hits_async(3).await;
    }

    #[tokio::test]
    async fn test_embed_single() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embed/single")
                    .json_body(json!({"text": "hello"}));
                then.status(200)
                    .json_body(json!({"embedding": [0.6, 0.8], "dimension": 2}));
            })
            .await;

        let v = embedder(&server).embed("hello").await.unwrap();
        assert_eq!(v, vec![0.6, 0.8]);
    }

    #[tokio::test]
    async fn test_embed_batch_count_mismatch_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(200)
                    .json_body(json!({"embeddings": [[1.0, 0.0]], "dimension": 2, "count": 1}));
            })
            .await;

        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embedder(&server).embed_batch(&texts).await.unwrap_err();
        assert!(err.is_backend());
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed").body_contains("\"texts\"");
                then.status(200).json_body(json!({
                    "embeddings": [[1.0, 0.0], [0.0, 1.0]],
                    "dimension": 2,
                    "count": 2
                }));
            })
            .await;

        let texts = vec!["a".to_string(), "b".to_string()];
        let out = embedder(&server).embed_batch(&texts).await.unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        mock.assert_async().await;
    }
}
