//! Portable export document
//!
//! `{version, exportedAt, backend, vectors: [{id, vector, metadata}]}` with
//! vectors as plain JSON number arrays. Import parses each record on its own
//! so one bad entry only costs that entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::embedding::BackendKind;
use crate::error::{MemoryError, Result};
use crate::record::VectorRecord;

/// Format version written by `export`
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Metadata timestamps; RFC 3339 strings or epoch milliseconds on import
const TIMESTAMP_FIELDS: [&str; 2] = ["created", "lastAccessed"];

/// Full store export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    /// Backend that produced the vectors
    pub backend: String,
    pub vectors: Vec<VectorRecord>,
}

impl Snapshot {
    pub fn new(backend: BackendKind, vectors: Vec<VectorRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            exported_at: Utc::now(),
            backend: backend.to_string(),
            vectors,
        }
    }
}

/// Result of an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub imported: usize,
    pub errors: usize,
}

/// Records that parsed, plus a count of those that did not
#[derive(Debug, Default)]
pub struct ParsedSnapshot {
    pub version: Option<String>,
    pub records: Vec<VectorRecord>,
    pub errors: usize,
}

/// Parse an import document record by record.
///
/// Only a document without a `vectors` array is an error; malformed entries
/// are counted and skipped.
pub fn parse_snapshot(document: &Value) -> Result<ParsedSnapshot> {
    let vectors = document
        .get("vectors")
        .and_then(Value::as_array)
        .ok_or_else(|| MemoryError::invalid_record("snapshot has no `vectors` array"))?;

    let mut parsed = ParsedSnapshot {
        version: document
            .get("version")
            .and_then(Value::as_str)
            .map(str::to_string),
        ..Default::default()
    };

    for (position, entry) in vectors.iter().enumerate() {
        match parse_record(entry) {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                log::debug!("Skipping snapshot entry {}: {}", position, e);
                parsed.errors += 1;
            }
        }
    }

    if parsed.errors > 0 {
        log::warn!(
            "Snapshot contained {} malformed records ({} usable)",
            parsed.errors,
            parsed.records.len()
        );
    }
    Ok(parsed)
}

fn parse_record(entry: &Value) -> Result<VectorRecord> {
    let mut entry = entry.clone();
    if let Some(metadata) = entry.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in TIMESTAMP_FIELDS {
            if let Some(value) = metadata.get_mut(field) {
                normalize_timestamp(value)?;
            }
        }
    }

    let record: VectorRecord = serde_json::from_value(entry)?;
    if record.id.trim().is_empty() {
        return Err(MemoryError::invalid_record("empty id"));
    }
    if record.metadata.content.trim().is_empty() {
        return Err(MemoryError::invalid_record(format!(
            "record {} has no content",
            record.id
        )));
    }
    Ok(record)
}

/// Rewrite an epoch-millisecond number as RFC 3339 in place
fn normalize_timestamp(value: &mut Value) -> Result<()> {
    let millis = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| MemoryError::invalid_record(format!("bad timestamp {}", n)))?,
        _ => return Ok(()),
    };
    let time = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| MemoryError::invalid_record(format!("timestamp {} out of range", millis)))?;
    *value = Value::String(time.to_rfc3339());
    Ok(())
}
