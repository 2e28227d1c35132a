//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment
//! variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};

/// Directory name appended to the OS per-user cache location.
const APP_DIR_NAME: &str = "exchange-cache";

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory owned by the store; all entry files live here
    pub root_dir: PathBuf,
    /// TTL applied when `set` is called without an explicit one
    pub default_ttl: Duration,
    /// Interval between background sweeps
    pub sweep_interval: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment
    /// variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Cache root directory (default: OS cache dir + app name)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CACHE_SWEEP_INTERVAL_SECS` - Sweep frequency in seconds (default: 3600)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.root_dir),
            default_ttl: env::var("CACHE_DEFAULT_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.default_ttl),
            sweep_interval: env::var("CACHE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }

    /// Creates a config rooted at an explicit directory, defaults elsewhere.
    ///
    /// # Arguments
    /// * `root_dir` - Directory the store will own
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            default_ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// OS-appropriate per-user cache location, suffixed with the application
/// directory name. Falls back to a relative `.cache` when the OS lookup
/// yields nothing (e.g. stripped-down containers).
fn default_root_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
        assert!(config.root_dir.ends_with(APP_DIR_NAME));
    }

    #[test]
    fn test_config_with_root() {
        let config = CacheConfig::with_root("/tmp/custom-cache");
        assert_eq!(config.root_dir, PathBuf::from("/tmp/custom-cache"));
        assert_eq!(config.default_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_DIR");
        env::remove_var("CACHE_DEFAULT_TTL_MS");
        env::remove_var("CACHE_SWEEP_INTERVAL_SECS");

        let config = CacheConfig::from_env();
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.sweep_interval, Duration::from_secs(3600));
    }
}
