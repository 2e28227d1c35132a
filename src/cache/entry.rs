//! Cache Entry Module
//!
//! Defines the on-disk structure for individual cache entries with TTL
//! support. The serialized shape is exactly `{data, timestamp, ttl}` and is
//! part of the persisted-state compatibility surface.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// Represents a single cache entry: an opaque payload plus expiry metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The stored payload, opaque to the cache
    pub data: Value,
    /// Creation timestamp (Unix milliseconds)
    pub timestamp: i64,
    /// Time-to-live in milliseconds from `timestamp`
    pub ttl: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stamped with the current time.
    ///
    /// # Arguments
    /// * `data` - The payload to store
    /// * `ttl` - How long the entry stays live
    pub fn new(data: Value, ttl: Duration) -> Self {
        Self {
            data,
            timestamp: current_timestamp_ms(),
            ttl: ttl.as_millis() as u64,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is stale once strictly more than `ttl` milliseconds have
    /// elapsed since creation; a stale entry is logically absent and must
    /// be purged by whoever observes it.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Expiry check against an explicit clock reading, for deterministic
    /// boundary tests.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) > self.ttl as i64
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, zero once expired.
    ///
    /// Diagnostic helper; expiry decisions go through [`Self::is_expired`].
    pub fn remaining_ms(&self) -> u64 {
        let elapsed = current_timestamp_ms().saturating_sub(self.timestamp);
        (self.ttl as i64).saturating_sub(elapsed).max(0) as u64
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}
