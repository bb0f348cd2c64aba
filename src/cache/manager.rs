//! Cache Manager Module
//!
//! Public facade over the file-backed cache. A bounded manager additionally
//! tracks access order and keeps on-disk usage under a byte ceiling by
//! evicting least recently used entries.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::codec::{EntryCodec, JsonCodec};
use crate::cache::path::{create_directory, namespaced_key, PathMapper, NAMESPACE_SEPARATOR};
use crate::cache::scanner::{self, ChunkOperation, ChunkReport, MetadataScanner, ScanSettings};
use crate::cache::store::{EntryStore, ReadOutcome};
use crate::cache::{CacheEntry, CacheMetadata, CacheStats, LruIndex, MAX_KEY_LENGTH, MB};
use crate::error::{CacheError, Result};

// == Manager Config ==
/// Construction parameters for a [`CacheManager`].
#[derive(Debug)]
pub struct ManagerConfig {
    /// Cache root directory
    pub root: PathBuf,
    /// Ceiling on bytes used by entry files (bounded managers only)
    pub max_size_bytes: u64,
    /// TTL in seconds applied when `set` is called without one
    pub default_ttl: u64,
    /// Files per chunk for streaming scans
    pub batch_size: usize,
    /// Memory budget for streaming scans, in bytes
    pub max_memory_bytes: u64,
    /// Enables LRU tracking and size enforcement
    pub bounded: bool,
    /// Record serialization strategy
    pub codec: Box<dyn EntryCodec>,
}

impl ManagerConfig {
    /// Defaults: 100 MB ceiling, 1 hour TTL, 1000-file chunks, 50 MB scan
    /// budget, bounded, JSON records.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_size_bytes: 100 * MB,
            default_ttl: 3600,
            batch_size: 1000,
            max_memory_bytes: 50 * MB,
            bounded: true,
            codec: Box::new(JsonCodec),
        }
    }
}

// == Report Types ==
/// How a whole-tree pass was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Streaming,
    Fallback,
}

/// Snapshot returned by [`CacheManager::get_stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
    pub evictions: u64,
    pub metadata: CacheMetadata,
    pub scan_mode: ScanMode,
    pub current_size: u64,
    pub max_size: u64,
    pub tracked_entries: usize,
    pub bounded: bool,
    pub format: &'static str,
}

// == Cache Manager ==
#[derive(Debug)]
pub struct CacheManager {
    paths: PathMapper,
    store: EntryStore,
    lru: LruIndex,
    stats: CacheStats,
    /// Best-effort running total of bytes on disk
    current_size: u64,
    max_size: u64,
    default_ttl: u64,
    scan: ScanSettings,
    bounded: bool,
}

impl CacheManager {
    // == Constructor ==
    /// Opens (creating if needed) a cache rooted at `config.root`.
    ///
    /// Bounded managers reconcile their size counter with one directory walk
    /// so that the first writes are checked against real usage.
    pub fn open(config: ManagerConfig) -> Result<Self> {
        create_directory(&config.root)?;

        let mut manager = Self {
            paths: PathMapper::new(config.root),
            store: EntryStore::new(config.codec),
            lru: LruIndex::new(),
            stats: CacheStats::new(),
            current_size: 0,
            max_size: config.max_size_bytes,
            default_ttl: config.default_ttl,
            scan: ScanSettings {
                batch_size: config.batch_size,
                max_memory_bytes: config.max_memory_bytes,
            },
            bounded: config.bounded,
        };

        if manager.bounded {
            let size = manager.get_cache_size();
            info!(
                "Opened bounded cache at {} ({} of {} bytes used)",
                manager.paths.root().display(),
                size,
                manager.max_size
            );
        } else {
            info!("Opened cache at {}", manager.paths.root().display());
        }

        Ok(manager)
    }

    // == Accessors ==
    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn is_bounded(&self) -> bool {
        self.bounded
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Running size counter (may drift until the next reconciliation).
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    pub fn max_cache_size(&self) -> u64 {
        self.max_size
    }

    /// Number of keys in the LRU index.
    pub fn tracked_entries(&self) -> usize {
        self.lru.len()
    }

    /// On-disk path of an entry, creating its shard directory.
    pub fn resolve_path(&self, key: &str, namespace: &str) -> Result<PathBuf> {
        self.paths.resolve(namespace, key)
    }

    // == Get ==
    /// Retrieves a value.
    ///
    /// Absent, expired and corrupt entries are misses; expired and corrupt
    /// files are removed. A stored value that does not deserialize as `V` is
    /// a miss but the file is kept.
    pub fn get<V: DeserializeOwned>(&mut self, key: &str, namespace: &str) -> Option<V> {
        let entry = match self.load_live(key, namespace) {
            Some(entry) => entry,
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        match serde_json::from_value::<V>(entry.data) {
            Ok(value) => {
                self.stats.record_hit();
                if self.bounded {
                    self.lru.touch(&namespaced_key(namespace, key));
                }
                Some(value)
            }
            Err(e) => {
                warn!(
                    "Cached value for {}:{} has an unexpected shape: {}",
                    namespace, key, e
                );
                self.stats.record_miss();
                None
            }
        }
    }

    // Reads an entry, removing it if expired. Never touches LRU or hit stats.
    fn load_live(&mut self, key: &str, namespace: &str) -> Option<CacheEntry> {
        if validate_key(key, namespace).is_err() {
            return None;
        }
        let path = self.paths.locate(namespace, key);
        let nskey = namespaced_key(namespace, key);

        match self.store.read(&path) {
            Ok(ReadOutcome::Found(entry)) if entry.namespace != namespace || entry.key != key => {
                warn!(
                    "Entry file for {} holds {}:{}; treating as a miss",
                    nskey, entry.namespace, entry.key
                );
                None
            }
            Ok(ReadOutcome::Found(entry)) if entry.is_expired() => {
                match self.store.remove(&path) {
                    Ok(Some(size)) => {
                        self.current_size = self.current_size.saturating_sub(size);
                        self.stats.record_expired(1);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Failed to remove expired entry {}: {}", nskey, e);
                        self.stats.record_error();
                    }
                }
                self.lru.remove(&nskey);
                None
            }
            Ok(ReadOutcome::Found(entry)) => Some(entry),
            Ok(ReadOutcome::Absent) => None,
            Ok(ReadOutcome::Corrupt { bytes }) => {
                self.current_size = self.current_size.saturating_sub(bytes);
                self.stats.record_corrupt(1);
                self.lru.remove(&nskey);
                None
            }
            Err(e) => {
                warn!("Failed to read entry {}: {}", nskey, e);
                self.stats.record_error();
                None
            }
        }
    }

    // == Set ==
    /// Stores a value for `ttl` seconds (the default TTL when `None`).
    ///
    /// Bounded managers evict least recently used entries first when the
    /// write would push usage over the ceiling.
    pub fn set<V: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &V,
        ttl: Option<u64>,
        namespace: &str,
    ) -> Result<()> {
        validate_key(key, namespace)?;

        let result = self.write_entry(key, value, ttl, namespace);
        if let Err(e) = &result {
            self.stats.record_error();
            warn!("Cache set for {}:{} failed: {}", namespace, key, e);
        }
        result
    }

    fn write_entry<V: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &V,
        ttl: Option<u64>,
        namespace: &str,
    ) -> Result<()> {
        let data = serde_json::to_value(value)
            .map_err(|e| CacheError::Codec(format!("value is not serializable: {}", e)))?;
        let entry = CacheEntry::new(namespace, key, data, ttl.unwrap_or(self.default_ttl));
        let bytes = self.store.encode(&entry)?;
        let incoming = bytes.len() as u64;
        if self.bounded && incoming > self.max_size {
            return Err(CacheError::EntryTooLarge {
                size: incoming,
                max: self.max_size,
            });
        }

        let path = self.paths.resolve(namespace, key)?;
        if self.bounded {
            let existing = self.store.file_size(&path).unwrap_or(0);
            if (self.current_size + incoming).saturating_sub(existing) > self.max_size {
                self.make_room(incoming, &path);
            }
        }

        // Re-read: eviction may have removed the previous version.
        let existing = self.store.file_size(&path).unwrap_or(0);
        let written = self.store.write_bytes(&path, &bytes)?;
        self.current_size = self.current_size.saturating_sub(existing) + written;
        self.stats.record_set();
        if self.bounded {
            self.lru.touch(&namespaced_key(namespace, key));
        }
        debug!("Cached {}:{} ({} bytes)", namespace, key, written);
        Ok(())
    }

    // Reconciles the size counter and evicts enough to fit `incoming` bytes.
    fn make_room(&mut self, incoming: u64, path: &Path) {
        let actual = self.get_cache_size();
        let existing = self.store.file_size(path).unwrap_or(0);
        let needed = (actual + incoming).saturating_sub(existing);
        if needed <= self.max_size {
            return;
        }

        let target = needed - self.max_size;
        let freed = self.perform_lru_eviction(target);
        if freed < target {
            warn!(
                "LRU eviction freed {} of {} bytes; untracked entries keep the cache over budget",
                freed, target
            );
        }
    }

    // == LRU Eviction ==
    /// Deletes tracked entries oldest-first until at least
    /// `target_reduction_bytes` have been freed or nothing tracked is left.
    ///
    /// Returns the number of bytes freed.
    pub fn perform_lru_eviction(&mut self, target_reduction_bytes: u64) -> u64 {
        let mut size_reduced = 0u64;
        let mut evicted = 0u64;

        for nskey in self.lru.oldest_first() {
            if size_reduced >= target_reduction_bytes {
                break;
            }

            let path = self.paths.locate_namespaced(&nskey);
            match self.store.remove(&path) {
                Ok(Some(size)) => {
                    size_reduced += size;
                    evicted += 1;
                    self.stats.record_lru_eviction();
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to evict {}: {}", nskey, e);
                    self.stats.record_error();
                    continue;
                }
            }
            self.lru.remove(&nskey);
        }

        self.current_size = self.current_size.saturating_sub(size_reduced);
        if evicted > 0 {
            info!(
                "LRU eviction removed {} entries ({} bytes, target {})",
                evicted, size_reduced, target_reduction_bytes
            );
        }
        size_reduced
    }

    // == Delete ==
    /// Removes an entry. Deleting an absent key succeeds.
    pub fn delete(&mut self, key: &str, namespace: &str) -> Result<()> {
        validate_key(key, namespace)?;
        self.stats.record_delete();
        let nskey = namespaced_key(namespace, key);
        let path = self.paths.locate(namespace, key);

        match self.store.remove(&path) {
            Ok(removed) => {
                if let Some(size) = removed {
                    self.current_size = self.current_size.saturating_sub(size);
                }
                self.lru.remove(&nskey);
                Ok(())
            }
            Err(e) => {
                self.stats.record_error();
                warn!("Cache delete for {} failed: {}", nskey, e);
                Err(e)
            }
        }
    }

    // == Exists ==
    /// True if a live entry exists. Does not count as an access.
    pub fn exists(&mut self, key: &str, namespace: &str) -> bool {
        self.load_live(key, namespace).is_some()
    }

    // == TTL ==
    /// Seconds until the entry expires, `0` if it is absent or expired.
    pub fn get_ttl(&mut self, key: &str, namespace: &str) -> u64 {
        self.load_live(key, namespace)
            .map(|entry| entry.ttl_remaining())
            .unwrap_or(0)
    }

    // == Batch Operations ==
    /// Fetches several keys; only hits appear in the result.
    pub fn get_multiple<V, I, K>(&mut self, keys: I, namespace: &str) -> HashMap<String, V>
    where
        V: DeserializeOwned,
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut found = HashMap::new();
        for key in keys {
            let key = key.as_ref();
            if let Some(value) = self.get(key, namespace) {
                found.insert(key.to_string(), value);
            }
        }
        found
    }

    /// Stores several values; each key succeeds or fails on its own.
    pub fn set_multiple<V, I, K>(
        &mut self,
        items: I,
        ttl: Option<u64>,
        namespace: &str,
    ) -> BTreeMap<String, bool>
    where
        V: Serialize,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
    {
        items
            .into_iter()
            .map(|(key, value)| {
                let ok = self.set(key.as_ref(), &value, ttl, namespace).is_ok();
                (key.as_ref().to_string(), ok)
            })
            .collect()
    }

    /// Deletes several keys; each key succeeds or fails on its own.
    pub fn delete_multiple<I, K>(&mut self, keys: I, namespace: &str) -> BTreeMap<String, bool>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .map(|key| {
                let ok = self.delete(key.as_ref(), namespace).is_ok();
                (key.as_ref().to_string(), ok)
            })
            .collect()
    }

    // == Counters ==
    /// Adds `by` to a numeric value and returns the new value.
    ///
    /// A missing entry counts as `0`. An existing entry keeps its remaining
    /// TTL. Read and write are separate steps: concurrent callers can lose
    /// updates.
    pub fn increment(&mut self, key: &str, by: i64, namespace: &str) -> Result<i64> {
        validate_key(key, namespace)?;
        let (current, ttl) = match self.load_live(key, namespace) {
            Some(entry) => {
                let current = as_integer(&entry.data)
                    .ok_or_else(|| CacheError::NotNumeric(namespaced_key(namespace, key)))?;
                (current, Some(entry.ttl_remaining().max(1)))
            }
            None => (0, None),
        };

        let next = current.checked_add(by).ok_or_else(|| {
            CacheError::InvalidRequest(format!("counter {}:{} would overflow", namespace, key))
        })?;
        self.set(key, &next, ttl, namespace)?;
        Ok(next)
    }

    /// Subtracts `by` from a numeric value and returns the new value.
    pub fn decrement(&mut self, key: &str, by: i64, namespace: &str) -> Result<i64> {
        let by = by.checked_neg().ok_or_else(|| {
            CacheError::InvalidRequest(format!("cannot decrement by {}", by))
        })?;
        self.increment(key, by, namespace)
    }

    // == Clear ==
    /// Removes every entry, or only those of one namespace.
    ///
    /// Namespace-scoped clearing decodes every file to read its namespace.
    pub fn clear(&mut self, namespace: Option<&str>) -> Result<()> {
        match namespace {
            Some(ns) => {
                validate_namespace(ns)?;
                let operation = ChunkOperation::ClearNamespace(ns.to_string());
                let (report, mode) = self.run_operation(&operation);
                self.stats.record_corrupt(report.corrupt);
                info!(
                    "Cleared namespace {} ({} entries, {:?} pass)",
                    ns, report.processed, mode
                );
                Ok(())
            }
            None => self.clear_all(),
        }
    }

    fn clear_all(&mut self) -> Result<()> {
        let root = self.paths.root().to_path_buf();
        let mut first_error = None;

        let shards = fs::read_dir(&root).map_err(|e| CacheError::io(&root, e));
        match shards {
            Ok(shards) => {
                for shard in shards.flatten() {
                    let path = shard.path();
                    let name = shard.file_name();
                    if !path.is_dir() || !PathMapper::is_shard_name(&name.to_string_lossy()) {
                        continue;
                    }
                    if let Err(e) = fs::remove_dir_all(&path) {
                        warn!("Failed to clear shard {}: {}", path.display(), e);
                        first_error.get_or_insert(CacheError::io(&path, e));
                    }
                }
            }
            Err(e) => first_error = Some(e),
        }

        self.lru.clear();
        match first_error {
            None => {
                self.current_size = 0;
                info!("Cleared cache at {}", root.display());
                Ok(())
            }
            Some(e) => {
                self.stats.record_error();
                self.get_cache_size();
                Err(e)
            }
        }
    }

    // == Cleanup Expired ==
    /// Deletes every expired entry and returns how many were removed.
    pub fn cleanup_expired(&mut self) -> u64 {
        let (report, mode) = self.run_operation(&ChunkOperation::CleanupExpired);
        self.stats.record_expired(report.processed);
        self.stats.record_corrupt(report.corrupt);
        if report.processed > 0 {
            info!(
                "Expired cleanup removed {} entries ({} bytes, {:?} pass)",
                report.processed, report.bytes_freed, mode
            );
        }
        report.processed
    }

    // Runs a bulk operation, streaming first and falling back to a full listing.
    // Work done by a failed streaming pass stays in the report.
    fn run_operation(&mut self, operation: &ChunkOperation) -> (ChunkReport, ScanMode) {
        let scanner = MetadataScanner::new(&self.paths, &self.store, self.scan);
        let lru = &mut self.lru;
        let mut untrack = |nskey: &str, _size: u64| lru.remove(nskey);

        let mut report = ChunkReport::default();
        let mode = match scanner.process_in_chunks(operation, &mut report, &mut untrack) {
            Ok(()) => ScanMode::Streaming,
            Err(e) => {
                warn!("Chunked {:?} failed, falling back to full scan: {}", operation, e);
                scanner.process_full(operation, &mut report, &mut untrack);
                ScanMode::Fallback
            }
        };

        self.current_size = self.current_size.saturating_sub(report.bytes_freed);
        (report, mode)
    }

    // == Stats ==
    /// Counters plus a fresh scan of the directory tree.
    ///
    /// The scan also reconciles the size counter.
    pub fn get_stats(&mut self) -> CacheReport {
        let scanner = MetadataScanner::new(&self.paths, &self.store, self.scan);
        let mut metadata = CacheMetadata::default();
        let scan_mode = match scanner.stream_metadata(&mut metadata) {
            Ok(()) => ScanMode::Streaming,
            Err(e) => {
                warn!("Streaming metadata scan failed, falling back to full scan: {}", e);
                // Corrupt files the failed pass deleted are gone from the listing.
                let deleted = metadata.corrupt_files;
                metadata = scanner.full_metadata();
                metadata.corrupt_files += deleted;
                ScanMode::Fallback
            }
        };

        self.stats.record_corrupt(metadata.corrupt_files);
        self.current_size = metadata.total_size;

        CacheReport {
            hit_rate: self.stats.hit_rate(),
            evictions: self.stats.evictions(),
            stats: self.stats.clone(),
            metadata,
            scan_mode,
            current_size: self.current_size,
            max_size: self.max_size,
            tracked_entries: self.lru.len(),
            bounded: self.bounded,
            format: self.store.format(),
        }
    }

    /// Walks the tree, sums entry file sizes and resets the counter to it.
    pub fn get_cache_size(&mut self) -> u64 {
        let size = scanner::disk_usage(self.paths.root());
        if size != self.current_size {
            debug!(
                "Size counter reconciled from {} to {} bytes",
                self.current_size, size
            );
        }
        self.current_size = size;
        size
    }

    // == Ceiling ==
    /// Changes the byte ceiling, evicting immediately if usage is above it.
    pub fn set_max_cache_size(&mut self, max_size_bytes: u64) {
        self.max_size = max_size_bytes;
        if !self.bounded || self.current_size <= self.max_size {
            return;
        }

        let actual = self.get_cache_size();
        if actual > self.max_size {
            self.perform_lru_eviction(actual - self.max_size);
        }
    }

    pub fn get_hit_rate(&self) -> f64 {
        self.stats.hit_rate()
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }
}

// == Helpers ==
fn validate_key(key: &str, namespace: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    validate_namespace(namespace)
}

// Namespaces are joined to keys with ':', so they must not contain one.
fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(CacheError::InvalidRequest(
            "Namespace cannot be empty".to_string(),
        ));
    }
    if namespace.contains(NAMESPACE_SEPARATOR) {
        return Err(CacheError::InvalidRequest(format!(
            "Namespace cannot contain '{}'",
            NAMESPACE_SEPARATOR
        )));
    }
    Ok(())
}

// Integers and integer strings count as numeric.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MessagePackCodec, DEFAULT_NAMESPACE};
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    const NS: &str = DEFAULT_NAMESPACE;

    fn open(dir: &TempDir) -> CacheManager {
        CacheManager::open(ManagerConfig::new(dir.path())).unwrap()
    }

    fn open_with(dir: &TempDir, f: impl FnOnce(&mut ManagerConfig)) -> CacheManager {
        let mut config = ManagerConfig::new(dir.path());
        f(&mut config);
        CacheManager::open(config).unwrap()
    }

    #[test]
    fn test_open_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("cache");
        let cache = CacheManager::open(ManagerConfig::new(&root)).unwrap();

        assert!(root.is_dir());
        assert_eq!(cache.current_size(), 0);
    }

    #[test]
    fn test_set_and_get() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("key1", "value1", None, NS).unwrap();
        let value: Option<String> = cache.get("key1", NS);

        assert_eq!(value.as_deref(), Some("value1"));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().sets, 1);
    }

    #[test]
    fn test_get_structured_value() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache
            .set("post:42", &json!({"title": "Hi"}), Some(3600), "ai_responses")
            .unwrap();

        assert!(cache.exists("post:42", "ai_responses"));
        let ttl = cache.get_ttl("post:42", "ai_responses");
        assert!(ttl > 3598 && ttl <= 3600, "ttl was {}", ttl);

        let value: Value = cache.get("post:42", "ai_responses").unwrap();
        assert_eq!(value["title"], "Hi");

        cache.clear(Some("ai_responses")).unwrap();
        assert!(!cache.exists("post:42", "ai_responses"));
    }

    #[test]
    fn test_get_nonexistent() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        assert_eq!(cache.get::<String>("nope", NS), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_namespace_isolation() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("k", "a", None, "x").unwrap();
        cache.set("k", "b", None, "y").unwrap();

        assert_eq!(cache.get::<String>("k", "x").as_deref(), Some("a"));
        assert_eq!(cache.get::<String>("k", "y").as_deref(), Some("b"));
    }

    #[test]
    fn test_expired_entry_is_removed_on_get() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("short", "v", Some(1), NS).unwrap();
        let path = cache.resolve_path("short", NS).unwrap();
        assert!(path.exists());

        sleep(Duration::from_millis(2100));

        assert_eq!(cache.get::<String>("short", NS), None);
        assert!(!path.exists());
        assert_eq!(cache.stats().evictions_expired, 1);
        assert_eq!(cache.current_size(), 0);
    }

    #[test]
    fn test_corrupt_entry_self_heals() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        let path = cache.resolve_path("broken", NS).unwrap();
        fs::write(&path, b"\xff\xfe garbage").unwrap();

        assert_eq!(cache.get::<String>("broken", NS), None);
        assert!(!path.exists());
        assert_eq!(cache.stats().evictions_corrupt, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_type_mismatch_is_miss_but_keeps_file() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("k", "text", None, NS).unwrap();
        assert_eq!(cache.get::<u64>("k", NS), None);
        assert!(cache.exists("k", NS));
    }

    #[test]
    fn test_overwrite_tracks_size() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("k", &"x".repeat(1000), None, NS).unwrap();
        cache.set("k", "small", None, NS).unwrap();

        assert_eq!(cache.current_size(), cache.get_cache_size());
        assert_eq!(cache.get::<String>("k", NS).as_deref(), Some("small"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("k", &1, None, NS).unwrap();
        cache.delete("k", NS).unwrap();
        cache.delete("k", NS).unwrap();
        cache.delete("never-existed", NS).unwrap();

        assert!(!cache.exists("k", NS));
        assert_eq!(cache.stats().deletes, 3);
        assert_eq!(cache.stats().errors, 0);
        assert_eq!(cache.current_size(), 0);
        assert_eq!(cache.tracked_entries(), 0);
    }

    #[test]
    fn test_exists_does_not_touch_lru() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("a", &1, None, NS).unwrap();
        cache.set("b", &2, None, NS).unwrap();
        assert!(cache.exists("a", NS));

        // "a" is still the oldest, so a one-byte eviction takes it.
        cache.perform_lru_eviction(1);
        assert!(!cache.exists("a", NS));
        assert!(cache.exists("b", NS));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_lru_eviction_on_set() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("k0", "0123456789", None, NS).unwrap();
        let entry_size = cache.current_size();
        cache.set_max_cache_size(entry_size * 5);

        for i in 1..5 {
            cache.set(&format!("k{}", i), "0123456789", None, NS).unwrap();
        }
        assert_eq!(cache.current_size(), entry_size * 5);

        // Touch k0 so k1 becomes the oldest.
        assert!(cache.get::<String>("k0", NS).is_some());
        cache.set("k5", "0123456789", None, NS).unwrap();

        assert!(!cache.exists("k1", NS));
        for key in ["k0", "k2", "k3", "k4", "k5"] {
            assert!(cache.exists(key, NS), "{} should survive", key);
        }
        assert_eq!(cache.stats().evictions_lru, 1);
        assert!(cache.current_size() <= cache.max_cache_size());
    }

    #[test]
    fn test_set_max_cache_size_evicts_immediately() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        for i in 0..10 {
            cache.set(&format!("k{}", i), "0123456789", None, NS).unwrap();
        }
        let total = cache.current_size();

        cache.set_max_cache_size(total / 2);

        assert!(cache.current_size() <= total / 2);
        assert!(!cache.exists("k0", NS));
        assert!(cache.exists("k9", NS));
        assert_eq!(cache.current_size(), cache.get_cache_size());
    }

    #[test]
    fn test_entry_larger_than_ceiling_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cache = open_with(&dir, |c| c.max_size_bytes = 64);

        let result = cache.set("big", &"x".repeat(500), None, NS);
        assert!(matches!(result, Err(CacheError::EntryTooLarge { .. })));
        assert_eq!(cache.stats().errors, 1);
        assert!(!cache.exists("big", NS));
    }

    #[test]
    fn test_unbounded_does_not_track_or_evict() {
        let dir = TempDir::new().unwrap();
        let mut cache = open_with(&dir, |c| {
            c.bounded = false;
            c.max_size_bytes = 64;
        });

        for i in 0..5 {
            cache.set(&format!("k{}", i), &"x".repeat(100), None, NS).unwrap();
        }
        cache.get::<String>("k0", NS);

        assert_eq!(cache.tracked_entries(), 0);
        assert_eq!(cache.stats().evictions_lru, 0);
        assert!(cache.current_size() > 64);
        assert!(cache.exists("k0", NS));
    }

    #[test]
    fn test_open_reconciles_existing_usage() {
        let dir = TempDir::new().unwrap();
        let size = {
            let mut cache = open(&dir);
            cache.set("a", &1, None, NS).unwrap();
            cache.set("b", &2, None, NS).unwrap();
            cache.current_size()
        };

        let reopened = open(&dir);
        assert_eq!(reopened.current_size(), size);
        assert_eq!(reopened.tracked_entries(), 0);
    }

    #[test]
    fn test_clear_all() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("a", &1, None, "x").unwrap();
        cache.set("b", &2, None, "y").unwrap();
        cache.clear(None).unwrap();

        assert!(!cache.exists("a", "x"));
        assert!(!cache.exists("b", "y"));
        assert_eq!(cache.current_size(), 0);
        assert_eq!(cache.tracked_entries(), 0);
        assert!(cache.root().is_dir());
    }

    #[test]
    fn test_clear_namespace_keeps_others() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("a", &1, None, "x").unwrap();
        cache.set("b", &2, None, "x").unwrap();
        cache.set("a", &3, None, "y").unwrap();
        cache.clear(Some("x")).unwrap();

        assert!(!cache.exists("a", "x"));
        assert!(!cache.exists("b", "x"));
        assert_eq!(cache.get::<i64>("a", "y"), Some(3));
        assert_eq!(cache.tracked_entries(), 1);
        assert_eq!(cache.current_size(), cache.get_cache_size());
    }

    #[test]
    fn test_cleanup_expired() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("short", "v", Some(1), NS).unwrap();
        cache.set("long", "v", Some(60), NS).unwrap();

        sleep(Duration::from_millis(2100));

        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.exists("long", NS));
        assert_eq!(cache.stats().evictions_expired, 1);
        assert_eq!(cache.tracked_entries(), 1);
    }

    #[test]
    fn test_get_stats() {
        let dir = TempDir::new().unwrap();
        let mut cache = open_with(&dir, |c| c.batch_size = 2);

        cache.set("a", &1, None, "x").unwrap();
        cache.set("b", &2, None, "x").unwrap();
        cache.set("c", &3, None, "y").unwrap();
        cache.get::<i64>("a", "x");
        cache.get::<i64>("zzz", "x");

        let report = cache.get_stats();
        assert_eq!(report.metadata.total_files, 3);
        assert_eq!(report.metadata.valid_files, 3);
        assert_eq!(report.metadata.namespaces["x"], 2);
        assert_eq!(report.scan_mode, ScanMode::Streaming);
        assert_eq!(report.hit_rate, 0.5);
        assert_eq!(report.current_size, report.metadata.total_size);
        assert_eq!(report.format, "json");
    }

    #[test]
    fn test_hit_rate_and_reset() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        assert_eq!(cache.get_hit_rate(), 0.0);
        cache.set("k", &1, None, NS).unwrap();
        cache.get::<i64>("k", NS);
        cache.get::<i64>("k", NS);
        cache.get::<i64>("missing", NS);

        assert!((cache.get_hit_rate() - 2.0 / 3.0).abs() < 1e-9);
        cache.reset_stats();
        assert_eq!(cache.stats(), &CacheStats::default());
    }

    #[test]
    fn test_increment_and_decrement() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        assert_eq!(cache.increment("hits", 1, NS).unwrap(), 1);
        assert_eq!(cache.increment("hits", 5, NS).unwrap(), 6);
        assert_eq!(cache.decrement("hits", 2, NS).unwrap(), 4);
        assert_eq!(cache.get::<i64>("hits", NS), Some(4));

        cache.set("str", "10", None, NS).unwrap();
        assert_eq!(cache.increment("str", 1, NS).unwrap(), 11);
    }

    #[test]
    fn test_increment_non_numeric_fails() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("word", "hello", None, NS).unwrap();
        assert!(matches!(
            cache.increment("word", 1, NS),
            Err(CacheError::NotNumeric(_))
        ));
        assert_eq!(cache.get::<String>("word", NS).as_deref(), Some("hello"));
    }

    #[test]
    fn test_increment_preserves_ttl() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("n", &1, Some(120), NS).unwrap();
        cache.increment("n", 1, NS).unwrap();
        assert!(cache.get_ttl("n", NS) <= 120);
    }

    #[test]
    fn test_batch_operations() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        let results = cache.set_multiple(vec![("a", 1), ("b", 2), ("", 3)], None, NS);
        assert!(results["a"]);
        assert!(results["b"]);
        assert!(!results[""]);

        let found: HashMap<String, i64> = cache.get_multiple(["a", "b", "c"], NS);
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], 2);

        let deleted = cache.delete_multiple(["a", "c"], NS);
        assert!(deleted.values().all(|ok| *ok));
        assert!(!cache.exists("a", NS));
        assert!(cache.exists("b", NS));
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            cache.set(&long_key, &1, None, NS),
            Err(CacheError::InvalidRequest(_))
        ));
        assert!(matches!(
            cache.set("k", &1, None, ""),
            Err(CacheError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_msgpack_codec() {
        let dir = TempDir::new().unwrap();
        let mut cache = open_with(&dir, |c| c.codec = Box::new(MessagePackCodec));

        cache.set("k", &json!({"n": [1, 2, 3]}), None, NS).unwrap();
        let value: Value = cache.get("k", NS).unwrap();
        assert_eq!(value, json!({"n": [1, 2, 3]}));
        assert_eq!(cache.get_stats().format, "msgpack");
    }

    #[test]
    fn test_switching_codec_treats_old_files_as_corrupt() {
        let dir = TempDir::new().unwrap();
        {
            let mut cache = open(&dir);
            cache.set("k", &1, None, NS).unwrap();
        }

        let mut cache = open_with(&dir, |c| c.codec = Box::new(MessagePackCodec));
        assert_eq!(cache.get::<i64>("k", NS), None);
        assert!(!cache.resolve_path("k", NS).unwrap().exists());
    }

    #[test]
    fn test_colon_in_namespace_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        cache.set("b:c", "from_a", None, "a").unwrap();
        assert!(matches!(
            cache.set("c", "from_a_b", None, "a:b"),
            Err(CacheError::InvalidRequest(_))
        ));

        assert_eq!(cache.get::<String>("b:c", "a").as_deref(), Some("from_a"));
        assert_eq!(cache.get::<String>("c", "a:b"), None);
        assert!(!cache.exists("c", "a:b"));
        assert_eq!(cache.get_ttl("c", "a:b"), 0);
        assert!(cache.delete("c", "a:b").is_err());
        assert!(cache.increment("c", 1, "a:b").is_err());
        assert!(cache.clear(Some("a:b")).is_err());

        // The entry still belongs to "a" only.
        cache.clear(Some("a")).unwrap();
        assert!(!cache.exists("b:c", "a"));
    }

    #[test]
    fn test_record_for_other_address_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        // A file written under one (namespace, key) copied to another's path.
        cache.set("k1", "one", None, NS).unwrap();
        let source = cache.resolve_path("k1", NS).unwrap();
        let target = cache.resolve_path("k2", NS).unwrap();
        fs::copy(&source, &target).unwrap();

        assert_eq!(cache.get::<String>("k2", NS), None);
        assert!(target.exists());
        assert_eq!(cache.get::<String>("k1", NS).as_deref(), Some("one"));
    }

    #[test]
    fn test_cleanup_falls_back_and_counts_every_removal() {
        let dir = TempDir::new().unwrap();
        let mut cache = open_with(&dir, |c| c.batch_size = 1);

        for i in 0..20 {
            cache.set(&format!("k{}", i), "v", Some(1), NS).unwrap();
        }
        cache.set("live", "v", Some(600), NS).unwrap();
        let live_size = cache.resolve_path("live", NS).unwrap().metadata().unwrap().len();
        // A directory named like an entry aborts the streaming walk.
        fs::create_dir_all(cache.root().join("ff").join("zz.cache")).unwrap();

        sleep(Duration::from_millis(2100));

        assert_eq!(cache.cleanup_expired(), 20);
        assert_eq!(cache.stats().evictions_expired, 20);
        assert_eq!(cache.current_size(), live_size);
        assert_eq!(cache.current_size(), cache.get_cache_size());
        assert_eq!(cache.tracked_entries(), 1);

        let report = cache.get_stats();
        assert_eq!(report.scan_mode, ScanMode::Fallback);
        assert_eq!(report.metadata.total_files, 1);
        assert_eq!(report.current_size, live_size);
    }

    #[test]
    fn test_clear_namespace_falls_back() {
        let dir = TempDir::new().unwrap();
        let mut cache = open_with(&dir, |c| c.batch_size = 1);

        for i in 0..10 {
            cache.set(&format!("k{}", i), &i, None, "x").unwrap();
        }
        cache.set("k0", &0, None, "y").unwrap();
        fs::create_dir_all(cache.root().join("ff").join("zz.cache")).unwrap();

        cache.clear(Some("x")).unwrap();

        for i in 0..10 {
            assert!(!cache.exists(&format!("k{}", i), "x"));
        }
        assert!(cache.exists("k0", "y"));
        assert_eq!(cache.tracked_entries(), 1);
        assert_eq!(cache.current_size(), cache.get_cache_size());
    }

    #[test]
    fn test_cleanup_reaps_abandoned_empty_file() {
        let dir = TempDir::new().unwrap();
        let mut cache = open(&dir);

        let path = cache.resolve_path("crashed", NS).unwrap();
        let file = fs::File::create(&path).unwrap();
        file.set_modified(std::time::SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        assert_eq!(cache.get::<String>("crashed", NS), None);
        assert!(path.exists());

        assert_eq!(cache.cleanup_expired(), 0);
        assert!(!path.exists());
        assert_eq!(cache.stats().evictions_corrupt, 1);
    }
}
