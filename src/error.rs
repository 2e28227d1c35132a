//! Error types for the exchange cache
//!
//! Provides unified error handling using thiserror.
//!
//! Most cache failures never reach callers: reads degrade to a miss and
//! writes degrade to a no-op, because the cache is advisory. The variants
//! below surface only at construction time or travel between the store's
//! internal helpers before being absorbed and logged at the boundary.

use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the exchange cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache root directory could not be created at construction
    #[error("failed to initialize cache directory {path}: {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem operation on an entry or the metadata file failed
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry or metadata payload could not be encoded or decoded
    #[error("cache codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the exchange cache.
pub type Result<T> = std::result::Result<T, CacheError>;
