//! Error types for vecmem

use thiserror::Error;

/// Errors surfaced by the store, its persistence and its embedding backends
#[derive(Debug, Error)]
pub enum MemoryError {
    /// RocksDB failure; callers degrade to memory-only on open
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Undecodable persisted record
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Snapshot or wire JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error from an embedding backend
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// In-process model failed to load or run
    #[error("Model error: {0}")]
    Model(String),

    /// Backend returned no usable vector
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Record rejected before it reached storage
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Builder error: {0}")]
    Builder(#[from] crate::node::MemoryNodeBuilderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation attempted before `initialize` or after `shutdown`
    #[error("Memory store not initialized")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl MemoryError {
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create an invalid record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error came from an embedding backend rather than storage
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Model(_) | Self::Embedding(_))
    }
}

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            MemoryError::invalid_record("empty content").to_string(),
            "Invalid record: empty content"
        );
        assert_eq!(
            MemoryError::NotInitialized.to_string(),
            "Memory store not initialized"
        );
    }

    #[test]
    fn test_backend_classification() {
        assert!(MemoryError::embedding("timeout").is_backend());
        assert!(MemoryError::model("load failed").is_backend());
        assert!(!MemoryError::invalid_record("x").is_backend());
        assert!(!MemoryError::other("x").is_backend());
    }
}
