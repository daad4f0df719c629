//! Memory node types and builders
//!
//! `MemoryNode` is the caller-facing unit of memory. Content is immutable once
//! written; an update is a delete followed by a store under the same id.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// A fact about the user or the world
    #[default]
    #[serde(alias = "FACT", alias = "Fact")]
    Fact,
    /// A stated like, dislike or habit
    #[serde(alias = "PREFERENCE", alias = "Preference")]
    Preference,
    /// Something that happened at a point in time
    #[serde(alias = "EVENT", alias = "Event")]
    Event,
    /// A fragment of a past conversation
    #[serde(alias = "CONVERSATION", alias = "Conversation")]
    Conversation,
    /// A standing instruction for the assistant
    #[serde(alias = "INSTRUCTION", alias = "Instruction")]
    Instruction,
    /// Anything else
    #[serde(alias = "OTHER", alias = "Other")]
    Other,
}

impl MemoryKind {
    /// Lowercase name as used in exports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Event => "event",
            Self::Conversation => "conversation",
            Self::Instruction => "instruction",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = MemoryNodeBuilderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fact" => Ok(Self::Fact),
            "preference" => Ok(Self::Preference),
            "event" => Ok(Self::Event),
            "conversation" => Ok(Self::Conversation),
            "instruction" => Ok(Self::Instruction),
            "other" => Ok(Self::Other),
            _ => Err(MemoryNodeBuilderError::UnknownKind(s.to_string())),
        }
    }
}

/// A memory as seen by the assistant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNode {
    /// Unique identifier, the join key with the persisted record
    pub id: String,
    /// The remembered text
    pub content: String,
    /// Category
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    /// Searchable tags
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// When the memory was first written
    pub created: DateTime<Utc>,
    /// When the memory was last read
    pub last_accessed: DateTime<Utc>,
}

impl MemoryNode {
    /// Create a new builder for MemoryNode
    pub fn builder() -> MemoryNodeBuilder {
        MemoryNodeBuilder::new()
    }

    /// Fact with a fresh id
    pub fn new(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            kind: MemoryKind::default(),
            tags: BTreeSet::new(),
            created: now,
            last_accessed: now,
        }
    }

    /// Fact with an explicit id
    pub fn with_id(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(content)
        }
    }

    /// Check the node can be stored: non-empty id and content
    pub fn validate(&self) -> Result<(), MemoryNodeBuilderError> {
        if self.id.trim().is_empty() {
            return Err(MemoryNodeBuilderError::EmptyId);
        }
        if self.content.trim().is_empty() {
            return Err(MemoryNodeBuilderError::EmptyContent);
        }
        Ok(())
    }

    /// Whether the node carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Builder for MemoryNode with fluent API
#[derive(Debug, Default)]
pub struct MemoryNodeBuilder {
    id: Option<String>,
    content: Option<String>,
    kind: MemoryKind,
    tags: BTreeSet<String>,
    created: Option<DateTime<Utc>>,
}

impl MemoryNodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory ID (auto-generated if not set)
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the content
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the kind
    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = kind;
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set multiple tags
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Backdate the creation time
    pub fn created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    /// Build the MemoryNode
    pub fn build(self) -> Result<MemoryNode, MemoryNodeBuilderError> {
        let content = self.content.ok_or(MemoryNodeBuilderError::MissingContent)?;
        let created = self.created.unwrap_or_else(Utc::now);

        let node = MemoryNode {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            content,
            kind: self.kind,
            tags: self.tags,
            created,
            last_accessed: created,
        };
        node.validate()?;
        Ok(node)
    }
}

/// Errors that can occur when building a MemoryNode
#[derive(Debug, thiserror::Error)]
pub enum MemoryNodeBuilderError {
    #[error("Missing required field: content")]
    MissingContent,
    #[error("Memory content is empty")]
    EmptyContent,
    #[error("Memory id is empty")]
    EmptyId,
    #[error("Unknown memory kind: {0}")]
    UnknownKind(String),
}
