//! Cache Module
//!
//! Provides durable, TTL-bounded key-value storage on local disk with
//! deduplicated compute-on-miss semantics.

use std::time::Duration;

mod entry;
mod key;
mod metadata;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use key::generate_key;
pub use metadata::CacheMetadata;
pub use stats::CacheStats;
pub use store::CacheStore;

// == Public Constants ==
/// File name of the advisory metadata file, excluded from all
/// entry-iterating operations by exact filename match
pub const METADATA_FILE: &str = ".metadata.json";

/// Suffix of entry files within the cache root
pub const ENTRY_SUFFIX: &str = ".json";

/// Suffix of staging files used for write-via-temp-then-rename
pub const TMP_SUFFIX: &str = ".json.tmp";

/// Default TTL applied when `set` is called without one (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default interval between background sweeps (1 hour)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
