//! Cache Metadata Module
//!
//! Advisory bookkeeping persisted to `.metadata.json` in the cache root.
//! Rewritten after every mutating operation but never read back to drive
//! behavior, so an approximate or stale count is harmless.

use serde::{Deserialize, Serialize};

// == Cache Metadata ==
/// Aggregate bookkeeping for the cache directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Count of live entry files at last refresh
    pub total_entries: usize,
    /// Timestamp of the last refresh (Unix milliseconds)
    pub last_cleanup: i64,
}

impl CacheMetadata {
    /// Creates metadata stamped with the current time.
    pub fn new(total_entries: usize) -> Self {
        Self {
            total_entries,
            last_cleanup: super::current_timestamp_ms(),
        }
    }
}
