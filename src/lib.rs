//! Exchange Cache - a file-backed TTL cache for exchange tool responses
//!
//! Shields upstream exchanges from redundant requests: tool calls derive a
//! deterministic key from their (namespace, identifier, params) shape,
//! look it up in a per-user cache directory, and only hit the exchange on
//! a miss. The cache is advisory by design — every internal failure
//! degrades to a miss or a no-op, so removing the cache directory never
//! changes the correctness of the adapter built on top, only its latency.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{generate_key, CacheEntry, CacheMetadata, CacheStats, CacheStore};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
