//! On-disk schema version
//!
//! The store carries a little-endian `u32` under `_db_version`. Unstamped
//! stores are stamped on open; stores written by a newer schema are refused
//! so an older binary never rewrites records it does not understand.

use rocksdb::DB;

use crate::error::{MemoryError, Result};

/// Database version stored in metadata
pub(crate) const DB_VERSION_KEY: &[u8] = b"_db_version";
pub const CURRENT_VERSION: u32 = 1;

/// Read the stored schema version, if any
pub fn stored_version(db: &DB) -> Result<Option<u32>> {
    match db.get(DB_VERSION_KEY)? {
        Some(bytes) => {
            let version_bytes: [u8; 4] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| MemoryError::other("Invalid version format"))?;
            Ok(Some(u32::from_le_bytes(version_bytes)))
        }
        None => Ok(None),
    }
}

/// Check the schema version and stamp the store if needed
pub fn ensure_schema(db: &DB) -> Result<u32> {
    match stored_version(db)? {
        Some(version) if version > CURRENT_VERSION => Err(MemoryError::other(format!(
            "database schema v{} is newer than supported v{}",
            version, CURRENT_VERSION
        ))),
        Some(version) if version == CURRENT_VERSION => Ok(version),
        previous => {
            log::info!(
                "Stamping database schema v{} (was {:?})",
                CURRENT_VERSION,
                previous
            );
            db.put(DB_VERSION_KEY, CURRENT_VERSION.to_le_bytes())?;
            Ok(CURRENT_VERSION)
        }
    }
}
