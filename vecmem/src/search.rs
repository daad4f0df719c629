//! Search options and result ranking
//!
//! The index only proposes candidates. Final scores are cosine similarity
//! against each record's stored vector, filtered by score and metadata.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::math::cosine_similarity;
use crate::node::{MemoryKind, MemoryNode};
use crate::record::{RecordMetadata, VectorRecord};

/// Arbitrary predicate over record metadata
pub type MetadataFilter = Arc<dyn Fn(&RecordMetadata) -> bool + Send + Sync>;

/// Per-query search options. Unset limits use the store's configured defaults.
#[derive(Clone, Default)]
pub struct SearchOptions {
    /// Maximum results to return
    pub max_results: Option<usize>,
    /// Minimum cosine similarity
    pub min_score: Option<f32>,
    /// Keep records carrying any of these tags
    pub tags: Vec<String>,
    /// Keep records of these kinds
    pub kinds: Vec<MemoryKind>,
    pub filter: Option<MetadataFilter>,
}

impl fmt::Debug for SearchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchOptions")
            .field("max_results", &self.max_results)
            .field("min_score", &self.min_score)
            .field("tags", &self.tags)
            .field("kinds", &self.kinds)
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&RecordMetadata) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Whether any metadata restriction is set
    pub fn is_filtered(&self) -> bool {
        !self.tags.is_empty() || !self.kinds.is_empty() || self.filter.is_some()
    }

    /// Check a record's metadata against the tag, kind and predicate filters
    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        if !self.tags.is_empty() && !self.tags.iter().any(|t| metadata.tags.contains(t)) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&metadata.kind) {
            return false;
        }
        self.filter.as_ref().map_or(true, |f| f(metadata))
    }
}

/// A ranked search hit
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub node: MemoryNode,
    /// Cosine similarity to the query
    pub score: f32,
}

/// Score candidates and keep the best `limit` with `score >= min_score`,
/// highest first. Ties break on id so output is stable.
pub(crate) fn rank<'a>(
    query: &[f32],
    candidates: impl IntoIterator<Item = &'a VectorRecord>,
    options: &SearchOptions,
    min_score: f32,
    limit: usize,
) -> Vec<(String, f32)> {
    let mut scored: Vec<(String, f32)> = candidates
        .into_iter()
        .filter(|record| options.matches(&record.metadata))
        .map(|record| (record.id.clone(), cosine_similarity(query, &record.vector)))
        .filter(|(_, score)| *score >= min_score)
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, vector: Vec<f32>, kind: MemoryKind, tags: &[&str]) -> VectorRecord {
        let node = MemoryNode::builder()
            .id(id)
            .content(format!("content of {}", id))
            .kind(kind)
            .tags(tags.iter().map(|t| t.to_string()))
            .build()
            .unwrap();
        VectorRecord::from_node(node, vector)
    }

    fn sample() -> Vec<VectorRecord> {
        vec![
            record("near", vec![1.0, 0.1], MemoryKind::Fact, &["color"]),
            record("mid", vec![0.7, 0.7], MemoryKind::Preference, &["food"]),
            record("far", vec![0.0, 1.0], MemoryKind::Fact, &[]),
        ]
    }

    #[test]
    fn test_rank_orders_by_score() {
        let records = sample();
        let ranked = rank(&[1.0, 0.0], &records, &SearchOptions::new(), -1.0, 10);
        let ids: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
    }

    #[test]
    fn test_rank_threshold_and_limit() {
        let records = sample();
        let ranked = rank(&[1.0, 0.0], &records, &SearchOptions::new(), 0.5, 10);
        assert_eq!(ranked.len(), 2);

        let ranked = rank(&[1.0, 0.0], &records, &SearchOptions::new(), 0.0, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, "near");

        let ranked = rank(&[1.0, 0.0], &records, &SearchOptions::new(), 0.999, 10);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_tag_and_kind_filters() {
        let records = sample();
        let by_tag = SearchOptions::new().tag("food");
        let ranked = rank(&[1.0, 0.0], &records, &by_tag, -1.0, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, "mid");

        let by_kind = SearchOptions::new().kind(MemoryKind::Fact);
        let ranked = rank(&[1.0, 0.0], &records, &by_kind, -1.0, 10);
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_predicate_filter() {
        let records = sample();
        let options = SearchOptions::new().filter(|m| m.content.ends_with("far"));
        assert!(options.is_filtered());
        let ranked = rank(&[1.0, 0.0], &records, &options, -1.0, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, "far");
    }
}
