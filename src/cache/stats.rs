//! Cache Statistics Module
//!
//! Snapshot of the store's observable state for operators and the adapter
//! layer. Unlike the persisted metadata, the entry count here is recounted
//! from the directory listing at call time.

use std::path::PathBuf;

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of the cache.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of live entry files on disk
    pub total_entries: usize,
    /// Root directory the store owns
    pub root_directory: PathBuf,
    /// TTL applied when none is given to `set`, in milliseconds
    pub default_ttl_ms: u64,
}
