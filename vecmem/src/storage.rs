//! RocksDB record persistence
//!
//! The authoritative copy of every `VectorRecord`, bincode-encoded under
//! `rec:{id}`. When the database cannot be opened the store runs
//! memory-only: writes succeed as no-ops and reads find nothing, leaving the
//! facade's record cache as the only copy.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};

use crate::error::Result;
use crate::migration;
use crate::record::VectorRecord;

const RECORD_PREFIX: &str = "rec:";

fn record_key(id: &str) -> String {
    format!("{}{}", RECORD_PREFIX, id)
}

/// Everything read back from disk at startup
#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub records: Vec<VectorRecord>,
    /// Entries that could not be decoded
    pub skipped: usize,
}

/// Outcome of `put_batch`
#[derive(Debug, Default)]
pub struct BatchWriteReport {
    pub written: usize,
    /// Ids that failed both the batch write and the single-record retry
    pub failed: Vec<String>,
}

/// Durable key-value store for vector records
pub struct RecordStore {
    db: Option<Arc<DB>>,
}

impl RecordStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_background_jobs(2);
        opts.set_bytes_per_sync(1048576); // 1MB
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        migration::ensure_schema(&db)?;

        log::info!("RecordStore opened at: {}", path.display());
        Ok(Self {
            db: Some(Arc::new(db)),
        })
    }

    /// Store that keeps nothing
    pub fn memory_only() -> Self {
        Self { db: None }
    }

    /// Open durably when possible, otherwise fall back to memory-only
    pub fn open_or_memory(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            log::info!("No data directory configured; running memory-only");
            return Self::memory_only();
        };
        match Self::open(path) {
            Ok(store) => store,
            Err(e) => {
                log::error!("Failed to open record store at {}: {}", path.display(), e);
                log::warn!("Continuing in memory-only mode; records will not survive restart");
                Self::memory_only()
            }
        }
    }

    /// Whether writes reach disk
    pub fn is_durable(&self) -> bool {
        self.db.is_some()
    }

    pub fn put(&self, record: &VectorRecord) -> Result<()> {
        if let Some(db) = &self.db {
            db.put(record_key(&record.id).as_bytes(), bincode::serialize(record)?)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        let Some(db) = &self.db else {
            return Ok(None);
        };
        match db.get(record_key(id).as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if let Some(db) = &self.db {
            db.delete(record_key(id).as_bytes())?;
        }
        Ok(())
    }

    /// Every decodable record; undecodable entries are skipped and counted
    pub fn get_all(&self) -> Result<LoadedRecords> {
        let mut loaded = LoadedRecords::default();
        let Some(db) = &self.db else {
            return Ok(loaded);
        };

        let iter = db.iterator(IteratorMode::From(
            RECORD_PREFIX.as_bytes(),
            Direction::Forward,
        ));
        for item in iter {
            let (key, value) = item?;
            let Some(id) = key.strip_prefix(RECORD_PREFIX.as_bytes()) else {
                break;
            };
            match bincode::deserialize::<VectorRecord>(&value) {
                Ok(record) => loaded.records.push(record),
                Err(e) => {
                    log::warn!(
                        "Failed to deserialize record {}: {}. Skipping.",
                        String::from_utf8_lossy(id),
                        e
                    );
                    loaded.skipped += 1;
                }
            }
        }
        Ok(loaded)
    }

    /// Write many records in one batch.
    ///
    /// If the batch write fails every record is retried with `put`; only
    /// records that fail that too are reported.
    pub fn put_batch(&self, records: &[VectorRecord]) -> BatchWriteReport {
        self.put_batch_with(
            records,
            |db, batch| Ok(db.write(batch)?),
            |record| self.put(record),
        )
    }

    fn put_batch_with<W, P>(&self, records: &[VectorRecord], write: W, put: P) -> BatchWriteReport
    where
        W: FnOnce(&DB, WriteBatch) -> Result<()>,
        P: Fn(&VectorRecord) -> Result<()>,
    {
        let mut report = BatchWriteReport::default();
        let Some(db) = &self.db else {
            report.written = records.len();
            return report;
        };

        let mut batch = WriteBatch::default();
        let mut retry: Vec<&VectorRecord> = Vec::new();
        let mut batched: Vec<&VectorRecord> = Vec::with_capacity(records.len());
        for record in records {
            match bincode::serialize(record) {
                Ok(bytes) => {
                    batch.put(record_key(&record.id).as_bytes(), bytes);
                    batched.push(record);
                }
                Err(e) => {
                    log::warn!("Failed to encode record {}: {}", record.id, e);
                    retry.push(record);
                }
            }
        }

        match write(db, batch) {
            Ok(()) => report.written += batched.len(),
            Err(e) => {
                log::warn!(
                    "Batch write of {} records failed, retrying individually: {}",
                    batched.len(),
                    e
                );
                retry.extend(batched);
            }
        }

        for record in retry {
            match put(record) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    log::error!("Failed to persist record {}: {}", record.id, e);
                    report.failed.push(record.id.clone());
                }
            }
        }
        report
    }

    /// Delete every record; returns how many were removed
    pub fn clear(&self) -> Result<usize> {
        let Some(db) = &self.db else {
            return Ok(0);
        };

        let mut batch = WriteBatch::default();
        let mut count = 0;
        let iter = db.iterator(IteratorMode::From(
            RECORD_PREFIX.as_bytes(),
            Direction::Forward,
        ));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(RECORD_PREFIX.as_bytes()) {
                break;
            }
            batch.delete(&key);
            count += 1;
        }
        db.write(batch)?;
        Ok(count)
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> Result<()> {
        if let Some(db) = &self.db {
            db.flush()?;
        }
        Ok(())
    }
}
