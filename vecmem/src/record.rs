//! Persisted vector records
//!
//! A `VectorRecord` is the durable unit: the embedding plus everything needed
//! to reconstruct the caller's `MemoryNode`. Only the access bookkeeping
//! (`last_accessed`, `access_count`) changes after a record is written.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::{MemoryKind, MemoryNode};

/// Metadata stored next to each vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MemoryKind,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
}

/// A vector and its metadata, keyed by memory id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

impl VectorRecord {
    /// Build a fresh record for `node` with access count zero
    pub fn from_node(node: MemoryNode, vector: Vec<f32>) -> Self {
        Self {
            id: node.id,
            vector,
            metadata: RecordMetadata {
                content: node.content,
                kind: node.kind,
                tags: node.tags,
                created: node.created,
                last_accessed: node.last_accessed,
                access_count: 0,
            },
        }
    }

    /// The caller-facing view of this record
    pub fn to_node(&self) -> MemoryNode {
        MemoryNode {
            id: self.id.clone(),
            content: self.metadata.content.clone(),
            kind: self.metadata.kind,
            tags: self.metadata.tags.clone(),
            created: self.metadata.created,
            last_accessed: self.metadata.last_accessed,
        }
    }

    /// Record a read
    pub fn touch(&mut self) {
        self.metadata.last_accessed = Utc::now();
        self.metadata.access_count = self.metadata.access_count.saturating_add(1);
    }

    /// Rough in-memory footprint, used for storage stats
    pub fn estimated_bytes(&self) -> usize {
        let tags: usize = self.metadata.tags.iter().map(String::len).sum();
        self.id.len()
            + self.vector.len() * std::mem::size_of::<f32>()
            + self.metadata.content.len()
            + tags
            // timestamps, counter and kind
            + 2 * 12
            + 8
            + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VectorRecord {
        let node = MemoryNode::builder()
            .id("m1")
            .content("My favorite color is blue")
            .tag("color")
            .build()
            .unwrap();
        VectorRecord::from_node(node, vec![0.6, 0.8])
    }

    #[test]
    fn test_node_round_trip() {
        let record = sample();
        let node = record.to_node();
        assert_eq!(node.id, "m1");
        assert_eq!(node.content, "My favorite color is blue");
        assert!(node.has_tag("color"));
        assert_eq!(record.metadata.access_count, 0);
    }

    #[test]
    fn test_touch_bumps_access() {
        let mut record = sample();
        let before = record.metadata.last_accessed;
        record.touch();
        record.touch();
        assert_eq!(record.metadata.access_count, 2);
        assert!(record.metadata.last_accessed >= before);
    }

    #[test]
    fn test_estimated_bytes_counts_vector() {
        let record = sample();
        assert!(record.estimated_bytes() >= 2 * 4 + "My favorite color is blue".len());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["id"], "m1");
        assert!(json["vector"].is_array());
        assert_eq!(json["metadata"]["type"], "fact");
        assert_eq!(json["metadata"]["accessCount"], 0);
    }

    #[test]
    fn test_bincode_round_trip() {
        let record = sample();
        let bytes = bincode::serialize(&record).unwrap();
        let back: VectorRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(record, back);
    }
}
