//! Remote embedding API client
//!
//! OpenAI-compatible request shape; accepts OpenAI (`data[].embedding`) and
//! Cohere (`embeddings[][]`) style responses.

use std::time::Duration;

use serde_json::{json, Value};

use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};

/// Text sent by the availability probe
const PROBE_TEXT: &str = "test";

#[derive(Clone)]
pub struct ApiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    single_timeout: Duration,
    batch_timeout: Duration,
}

impl ApiEmbedder {
    /// Build from config; `None` unless both URL and key are set
    pub fn from_config(config: &EmbeddingConfig) -> Result<Option<Self>> {
        if !config.has_api() {
            return Ok(None);
        }
        Ok(Some(Self {
            client: reqwest::Client::builder().build()?,
            endpoint: config.api_url.clone().unwrap_or_default(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.api_model.clone(),
            single_timeout: config.single_timeout,
            batch_timeout: config.batch_timeout,
        }))
    }

    /// Single test request. Ok when the API answers with a usable vector.
    pub async fn probe(&self, timeout: Duration) -> Result<()> {
        let vectors = self.request(json!(PROBE_TEXT), 1, timeout).await?;
        match vectors.first() {
            Some(v) if !v.is_empty() => Ok(()),
            _ => Err(MemoryError::embedding("API probe returned an empty vector")),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(json!(text), 1, self.single_timeout).await?;
        vectors
            .pop()
            .ok_or_else(|| MemoryError::embedding("API returned no embedding"))
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.request(json!(texts), texts.len(), self.batch_timeout)
            .await
    }

    async fn request(&self, input: Value, expected: usize, timeout: Duration) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&json!({ "input": input, "model": self.model }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemoryError::embedding(format!(
                "API returned error {}: {}",
                status, body
            )));
        }

        let body: Value = response.json().await?;
        let vectors = parse_embeddings(&body)?;
        if vectors.len() != expected {
            return Err(MemoryError::embedding(format!(
                "API returned {} embeddings for {} inputs",
                vectors.len(),
                expected
            )));
        }
        Ok(vectors)
    }
}

/// Extract embeddings from an OpenAI or Cohere style response body
pub(crate) fn parse_embeddings(body: &Value) -> Result<Vec<Vec<f32>>> {
    if let Some(data) = body.get("data").and_then(Value::as_array) {
        // OpenAI format: {"data": [{"embedding": [...], "index": 0}]}
        let mut indexed = data
            .iter()
            .enumerate()
            .map(|(pos, item)| {
                let index = item
                    .get("index")
                    .and_then(Value::as_u64)
                    .map_or(pos, |i| i as usize);
                let embedding = item
                    .get("embedding")
                    .ok_or_else(|| MemoryError::embedding("Invalid OpenAI response format"))
                    .and_then(to_vector)?;
                Ok((index, embedding))
            })
            .collect::<Result<Vec<_>>>()?;
        indexed.sort_by_key(|(index, _)| *index);
        return Ok(indexed.into_iter().map(|(_, v)| v).collect());
    }

    if let Some(embeddings) = body.get("embeddings").and_then(Value::as_array) {
        // Cohere format: {"embeddings": [[...]]}
        return embeddings.iter().map(to_vector).collect();
    }

    Err(MemoryError::embedding("Unknown API response format"))
}

fn to_vector(value: &Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| MemoryError::embedding("embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| MemoryError::embedding("Invalid embedding value"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn config_for(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            api_url: Some(server.url("/v1/embeddings")),
            api_key: Some("sk-test".into()),
            ..EmbeddingConfig::offline()
        }
    }

    #[test]
    fn test_parse_openai_reorders_by_index() {
        let body = json!({"data": [
            {"embedding": [0.0, 1.0], "index": 1},
            {"embedding": [1.0, 0.0], "index": 0}
        ]});
        let parsed = parse_embeddings(&body).unwrap();
        assert_eq!(parsed, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_cohere() {
        let body = json!({"embeddings": [[0.5, 0.5]]});
        assert_eq!(parse_embeddings(&body).unwrap(), vec![vec![0.5, 0.5]]);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(parse_embeddings(&json!({"vectors": []})).is_err());
        assert!(parse_embeddings(&json!({"data": [{"embedding": ["x"]}]})).is_err());
    }

    #[test]
    fn test_not_configured() {
        let config = EmbeddingConfig::offline();
        assert!(ApiEmbedder::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_probe_and_embed() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test");
                then.status(200)
                    .json_body(json!({"data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]}));
            })
            .await;

        let api = ApiEmbedder::from_config(&config_for(&server))
            .unwrap()
            .unwrap();
        api.probe(Duration::from_secs(5)).await.unwrap();
        assert_eq!(api.embed("hello").await.unwrap(), vec![0.1, 0.2, 0.3]);
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(401).body("bad key");
            })
            .await;

        let api = ApiEmbedder::from_config(&config_for(&server))
            .unwrap()
            .unwrap();
        let err = api.probe(Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
