//! Cache Store Module
//!
//! Main cache engine: one JSON file per entry under a root directory the
//! store exclusively owns, TTL expiry checked on read, and a
//! compute-on-miss wrapper that collapses concurrent misses for the same
//! key into a single upstream call.
//!
//! The store is advisory: every internal failure is absorbed here and
//! logged, so callers only ever observe a value, a miss, or a
//! passed-through producer error. Deleting the cache directory must never
//! break a system built on top of it.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    generate_key, CacheEntry, CacheMetadata, CacheStats, ENTRY_SUFFIX, METADATA_FILE, TMP_SUFFIX,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweep_task;

// == Cache Store ==
/// Durable, TTL-bounded key-value store on local disk.
///
/// Cheap to clone; clones share the same root directory, in-flight table
/// and sweep task. Construct one per process and hand clones to whatever
/// needs request-level caching.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    /// Root directory; every file inside is an entry or the metadata file
    root: PathBuf,
    /// TTL applied when `set` is called without one
    default_ttl: Duration,
    /// Handle of the background sweep task, taken on shutdown
    sweeper: StdMutex<Option<JoinHandle<()>>>,
    /// Per-key locks collapsing concurrent `get_or_set` misses
    in_flight: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CacheStore {
    // == Constructor ==
    /// Opens a store rooted at `config.root_dir`, creating the directory
    /// (and missing parents) and starting the periodic sweep task.
    ///
    /// Directory creation is the only fatal failure; everything after
    /// construction degrades gracefully.
    pub async fn open(config: CacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.root_dir)
            .await
            .map_err(|source| CacheError::Init {
                path: config.root_dir.clone(),
                source,
            })?;

        let store = Self {
            inner: Arc::new(StoreInner {
                root: config.root_dir,
                default_ttl: config.default_ttl,
                sweeper: StdMutex::new(None),
                in_flight: StdMutex::new(HashMap::new()),
            }),
        };

        let handle = spawn_sweep_task(store.clone(), config.sweep_interval);
        *store
            .inner
            .sweeper
            .lock()
            .expect("sweeper handle lock poisoned") = Some(handle);

        info!(root = %store.inner.root.display(), "cache store opened");
        Ok(store)
    }

    // == Key Generation ==
    /// Derives the deterministic key for a (namespace, identifier, params)
    /// triple. Convenience forward to [`generate_key`].
    pub fn generate_key(
        &self,
        namespace: &str,
        identifier: &str,
        params: Option<&Value>,
    ) -> String {
        generate_key(namespace, identifier, params)
    }

    // == Get ==
    /// Retrieves the payload stored under `key`, if live.
    ///
    /// Returns `None` on the normal miss path: no entry file, an
    /// unreadable or corrupt file, a payload that does not decode to `T`,
    /// or a lapsed TTL. An expired entry file is deleted as a side effect.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.entry_path(key);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                debug!(key, error = %err, "entry read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(key, error = %err, "corrupt entry, treating as miss");
                return None;
            }
        };

        if entry.is_expired() {
            if let Err(err) = fs::remove_file(&path).await {
                debug!(key, error = %err, "failed to purge expired entry");
            }
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(key, error = %err, "payload did not decode, treating as miss");
                None
            }
        }
    }

    // == Set ==
    /// Stores `data` under `key` with the given TTL, overwriting any prior
    /// entry wholesale.
    ///
    /// Never fails from the caller's perspective: write errors are logged
    /// and the operation completes as a no-op. The root directory is
    /// recreated first if it vanished after construction.
    ///
    /// # Arguments
    /// * `key` - The key to store under
    /// * `data` - The payload to store
    /// * `ttl` - Entry lifetime (uses the default TTL if None)
    pub async fn set<T: Serialize>(&self, key: &str, data: &T, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.inner.default_ttl);

        if let Err(err) = self.write_entry(key, data, ttl).await {
            warn!(key, error = %err, "cache write failed, continuing uncached");
            return;
        }

        self.refresh_metadata().await;
    }

    /// Serializes and persists one entry via temp-file-then-rename, so a
    /// concurrent reader never observes a partial write.
    async fn write_entry<T: Serialize>(&self, key: &str, data: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(serde_json::to_value(data)?, ttl);
        let body = serde_json::to_vec(&entry)?;

        fs::create_dir_all(&self.inner.root).await?;
        let tmp = self.tmp_path(key);
        fs::write(&tmp, &body).await?;
        fs::rename(&tmp, self.entry_path(key)).await?;
        Ok(())
    }

    // == Delete ==
    /// Removes the entry for `key`. A no-op when the key is absent.
    pub async fn delete(&self, key: &str) {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => self.refresh_metadata().await,
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(key, error = %err, "cache delete failed"),
        }
    }

    // == Clear ==
    /// Removes every file in the root directory except the metadata file.
    ///
    /// Returns the number of files removed.
    pub async fn clear(&self) -> usize {
        let mut removed = 0;

        match fs::read_dir(&self.inner.root).await {
            Ok(mut dir) => loop {
                let dent = match dir.next_entry().await {
                    Ok(Some(dent)) => dent,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "cache clear aborted mid-scan");
                        break;
                    }
                };
                if dent.file_name().to_string_lossy() == METADATA_FILE {
                    continue;
                }
                if fs::remove_file(dent.path()).await.is_ok() {
                    removed += 1;
                }
            },
            Err(err) => {
                warn!(error = %err, "cache clear could not list root directory");
                return 0;
            }
        }

        self.refresh_metadata().await;
        info!(removed, "cache cleared");
        removed
    }

    // == Cleanup ==
    /// Scans every entry file and removes the expired and the corrupt
    /// ones, leaving live entries untouched.
    ///
    /// Runs periodically from the sweep task and is also callable on
    /// demand. Safe to run concurrently with `get`/`set`; the metadata
    /// count is advisory and may briefly lag. Returns the number of files
    /// removed.
    pub async fn cleanup(&self) -> usize {
        let mut removed = 0;

        let mut dir = match fs::read_dir(&self.inner.root).await {
            Ok(dir) => dir,
            Err(err) => {
                warn!(error = %err, "cache sweep could not list root directory");
                return 0;
            }
        };

        loop {
            let dent = match dir.next_entry().await {
                Ok(Some(dent)) => dent,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "cache sweep aborted mid-scan");
                    break;
                }
            };
            let name = dent.file_name().to_string_lossy().into_owned();
            if !is_entry_file(&name) {
                continue;
            }

            let path = dent.path();
            let live = match fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<CacheEntry>(&bytes)
                    .map(|entry| !entry.is_expired())
                    .unwrap_or(false),
                // Raced with a concurrent delete or clear; nothing to do.
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(_) => false,
            };

            if !live && fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }

            // Large directories must not starve concurrent callers.
            tokio::task::yield_now().await;
        }

        self.refresh_metadata().await;
        debug!(removed, "cache sweep finished");
        removed
    }

    // == Stats ==
    /// Returns a snapshot of the store, recounting live entry files from
    /// the directory listing rather than trusting the metadata file.
    pub async fn stats(&self) -> CacheStats {
        let total_entries = self.count_entries().await.unwrap_or(0);
        CacheStats {
            total_entries,
            root_directory: self.inner.root.clone(),
            default_ttl_ms: self.inner.default_ttl.as_millis() as u64,
        }
    }

    // == Get Or Set ==
    /// Returns the cached payload for `key`, or runs `producer` and caches
    /// its result.
    ///
    /// On a hit the producer is never invoked. On a miss, concurrent
    /// callers for the same key are collapsed onto one producer run via a
    /// per-key in-flight lock; the losers re-check the cache once the
    /// winner finishes. A producer failure propagates unchanged and
    /// nothing is cached. Distinct keys never contend.
    ///
    /// Note the collapse is per-process only; separate processes sharing
    /// a cache directory still race last-write-wins.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        producer: F,
        ttl: Option<Duration>,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        // The guard removes the table entry once its last holder is done,
        // including when this future is cancelled mid-flight.
        let guard = self.in_flight_guard(key);
        let _lock = guard.slot.lock().await;

        // A racing caller may have populated the entry while we waited on
        // the lock.
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        match producer().await {
            Ok(value) => {
                self.set(key, &value, ttl).await;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }

    /// Fetches (or creates) the in-flight lock for `key`, wrapped in a
    /// guard that cleans the table entry up on drop.
    fn in_flight_guard(&self, key: &str) -> InFlightGuard {
        let slot = {
            let mut table = self
                .inner
                .in_flight
                .lock()
                .expect("in-flight table lock poisoned");
            table.entry(key.to_string()).or_default().clone()
        };
        InFlightGuard {
            inner: Arc::clone(&self.inner),
            key: key.to_string(),
            slot,
        }
    }

    // == Shutdown ==
    /// Stops the periodic sweep task. Idempotent; in-flight `get`/`set`
    /// calls are unaffected and the store remains usable afterwards.
    pub fn shutdown(&self) {
        let handle = self
            .inner
            .sweeper
            .lock()
            .expect("sweeper handle lock poisoned")
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("cache sweep task stopped");
        }
    }

    // == Paths ==
    /// Absolute path of the entry file for `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.inner.root.join(format!("{key}{ENTRY_SUFFIX}"))
    }

    fn tmp_path(&self, key: &str) -> PathBuf {
        self.inner.root.join(format!("{key}{TMP_SUFFIX}"))
    }

    /// Root directory this store owns.
    pub fn root_dir(&self) -> &Path {
        &self.inner.root
    }

    /// TTL applied when `set` is called without one.
    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    // == Metadata ==
    /// Rewrites the advisory metadata file; failures are logged and
    /// swallowed since nothing reads the file back to drive behavior.
    async fn refresh_metadata(&self) {
        if let Err(err) = self.write_metadata().await {
            debug!(error = %err, "metadata refresh failed");
        }
    }

    async fn write_metadata(&self) -> Result<()> {
        let meta = CacheMetadata::new(self.count_entries().await?);
        let body = serde_json::to_vec_pretty(&meta)?;
        fs::write(self.inner.root.join(METADATA_FILE), body).await?;
        Ok(())
    }

    /// Counts entry files from the directory listing.
    async fn count_entries(&self) -> Result<usize> {
        let mut dir = fs::read_dir(&self.inner.root).await?;
        let mut count = 0;
        while let Some(dent) = dir.next_entry().await? {
            if is_entry_file(&dent.file_name().to_string_lossy()) {
                count += 1;
            }
        }
        Ok(count)
    }
}

// == In-Flight Guard ==
/// Releases an in-flight table entry once its last holder finishes,
/// whether the surrounding `get_or_set` completed or was cancelled.
struct InFlightGuard {
    inner: Arc<StoreInner>,
    key: String,
    slot: Arc<Mutex<()>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut table = self
            .inner
            .in_flight
            .lock()
            .expect("in-flight table lock poisoned");
        // Two strong references left: the table's and this guard's.
        if Arc::strong_count(&self.slot) <= 2 {
            table.remove(&self.key);
        }
    }
}

/// Entry files end in `.json`; the metadata file and `.json.tmp` staging
/// files are not entries.
fn is_entry_file(name: &str) -> bool {
    name != METADATA_FILE && name.ends_with(ENTRY_SUFFIX)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_store(root: &Path) -> CacheStore {
        CacheStore::open(CacheConfig::with_root(root))
            .await
            .expect("store should open")
    }

    #[test]
    fn test_is_entry_file() {
        assert!(is_entry_file("tool_fetchTicker_ab12.json"));
        assert!(!is_entry_file(".metadata.json"));
        assert!(!is_entry_file("tool_fetchTicker_ab12.json.tmp"));
        assert!(!is_entry_file("README"));
    }

    #[tokio::test]
    async fn test_open_creates_missing_directories() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nested").join("cache");

        let store = open_store(&root).await;
        assert!(root.is_dir());
        store.shutdown();
    }

    #[tokio::test]
    async fn test_open_fails_when_root_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = CacheStore::open(CacheConfig::with_root(&blocker)).await;
        assert!(matches!(result, Err(CacheError::Init { .. })));
    }

    #[tokio::test]
    async fn test_set_and_get_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        let payload = json!({"symbol": "BTC/USDT", "last": 42000.5});
        store.set("k1", &payload, None).await;

        let fetched: Option<Value> = store.get("k1").await;
        assert_eq!(fetched, Some(payload));
        store.shutdown();
    }

    #[tokio::test]
    async fn test_get_nonexistent_is_miss() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        let fetched: Option<Value> = store.get("missing").await;
        assert_eq!(fetched, None);
        store.shutdown();
    }

    #[tokio::test]
    async fn test_set_overwrites_wholesale() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        store.set("k1", &json!({"v": 1}), None).await;
        store.set("k1", &json!({"v": 2}), None).await;

        let fetched: Option<Value> = store.get("k1").await;
        assert_eq!(fetched, Some(json!({"v": 2})));
        assert_eq!(store.stats().await.total_entries, 1);
        store.shutdown();
    }

    #[tokio::test]
    async fn test_expired_entry_is_purged_on_get() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        store
            .set("k1", &json!("v"), Some(Duration::from_millis(20)))
            .await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let fetched: Option<Value> = store.get("k1").await;
        assert_eq!(fetched, None);
        assert!(!store.entry_path("k1").exists());
        store.shutdown();
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        std::fs::write(store.entry_path("bad"), b"{ not json").unwrap();

        let fetched: Option<Value> = store.get("bad").await;
        assert_eq!(fetched, None);
        store.shutdown();
    }

    #[tokio::test]
    async fn test_stored_null_is_distinguishable_from_miss() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        store.set("k1", &Value::Null, None).await;

        let fetched: Option<Value> = store.get("k1").await;
        assert_eq!(fetched, Some(Value::Null));
        store.shutdown();
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        store.set("k1", &json!("v"), None).await;
        store.delete("k1").await;
        // Second delete on an absent key must not fail or log-crash.
        store.delete("k1").await;

        let fetched: Option<Value> = store.get("k1").await;
        assert_eq!(fetched, None);
        store.shutdown();
    }

    #[tokio::test]
    async fn test_clear_keeps_metadata_file() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        store.set("k1", &json!("a"), None).await;
        store.set("k2", &json!("b"), None).await;

        let removed = store.clear().await;
        assert_eq!(removed, 2);
        assert!(tmp.path().join(METADATA_FILE).exists());
        assert_eq!(store.stats().await.total_entries, 0);
        store.shutdown();
    }

    #[tokio::test]
    async fn test_metadata_reflects_mutations() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        store.set("k1", &json!("a"), None).await;
        store.set("k2", &json!("b"), None).await;

        let raw = std::fs::read(tmp.path().join(METADATA_FILE)).unwrap();
        let meta: CacheMetadata = serde_json::from_slice(&raw).unwrap();
        assert_eq!(meta.total_entries, 2);
        store.shutdown();
    }

    #[tokio::test]
    async fn test_cancelled_get_or_set_releases_in_flight_slot() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        let task = tokio::spawn({
            let store = store.clone();
            async move {
                let _: std::result::Result<Value, std::io::Error> = store
                    .get_or_set(
                        "slow",
                        || async {
                            tokio::time::sleep(Duration::from_secs(3600)).await;
                            Ok(json!("never"))
                        },
                        None,
                    )
                    .await;
            }
        });

        // Let the call reach the producer, then cancel it mid-flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let table_len = store.inner.in_flight.lock().unwrap().len();
        assert_eq!(table_len, 0, "cancelled call must not leave a slot behind");

        // The key stays usable after the cancelled attempt.
        let result: std::result::Result<Value, std::io::Error> = store
            .get_or_set("slow", || async { Ok(json!("v")) }, None)
            .await;
        assert_eq!(result.unwrap(), json!("v"));
        store.shutdown();
    }

    #[tokio::test]
    async fn test_completed_get_or_set_releases_in_flight_slot() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        let result: std::result::Result<Value, std::io::Error> = store
            .get_or_set("k", || async { Ok(json!("v")) }, None)
            .await;
        assert_eq!(result.unwrap(), json!("v"));

        let table_len = store.inner.in_flight.lock().unwrap().len();
        assert_eq!(table_len, 0);
        store.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(tmp.path()).await;

        store.shutdown();
        store.shutdown();

        // The store stays usable after shutdown.
        store.set("k1", &json!("v"), None).await;
        let fetched: Option<Value> = store.get("k1").await;
        assert_eq!(fetched, Some(json!("v")));
    }
}
