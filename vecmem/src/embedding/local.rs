//! In-process neural embeddings
//!
//! fastembed with all-MiniLM-L6-v2 (384d) running on ONNX Runtime. Loading
//! may download model files, so the whole load-and-warm-up sequence runs on
//! the blocking pool under a hard timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::error::{MemoryError, Result};

/// Encoder batch size handed to fastembed
const BATCH_SIZE: usize = 32;

/// Synchronous text encoder run on the blocking pool
pub trait TextEncoder: Send + Sync {
    fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}

impl TextEncoder for TextEmbedding {
    fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.embed(texts, Some(BATCH_SIZE))
            .map_err(|e| MemoryError::embedding(format!("Failed to encode texts: {}", e)))
    }
}

/// In-process embedding model
pub struct LocalEmbedder {
    encoder: Arc<dyn TextEncoder>,
    dimension: usize,
}

impl LocalEmbedder {
    /// Load and warm up the model, giving up after `timeout`.
    ///
    /// On timeout the loader thread is abandoned; its result is dropped.
    pub async fn load(cache_dir: PathBuf, timeout: Duration) -> Result<Self> {
        let task = tokio::task::spawn_blocking(move || Self::load_blocking(cache_dir));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(MemoryError::model(format!(
                "model loader failed: {}",
                join_error
            ))),
            Err(_) => Err(MemoryError::model(format!(
                "model load exceeded {:?}",
                timeout
            ))),
        }
    }

    fn load_blocking(cache_dir: PathBuf) -> Result<Self> {
        log::info!("Loading all-MiniLM-L6-v2 from: {}", cache_dir.display());

        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| MemoryError::model(format!("Failed to load model: {}", e)))?;

        // Warm up and read the dimension off the first output
        let warm = model
            .embed(vec!["warm up"], None)
            .map_err(|e| MemoryError::model(format!("Failed to encode test string: {}", e)))?;
        let dimension = warm.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(MemoryError::model("model produced an empty embedding"));
        }

        log::info!("Loaded local embedding model ({}d)", dimension);
        Ok(Self::from_encoder(Arc::new(model), dimension))
    }

    /// Wrap an encoder that is already loaded and warm
    pub fn from_encoder(encoder: Arc<dyn TextEncoder>, dimension: usize) -> Self {
        Self { encoder, dimension }
    }

    /// Native output dimension of the model
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(vec![text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| MemoryError::embedding("model returned no embedding"))
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let encoder = Arc::clone(&self.encoder);
        tokio::task::spawn_blocking(move || encoder.encode(texts))
            .await
            .map_err(|e| MemoryError::embedding(format!("encoder task failed: {}", e)))?
    }
}
