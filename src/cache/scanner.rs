//! Metadata Stream Scanner Module
//!
//! Walks the sharded cache tree in fixed-size chunks so that statistics and
//! bulk cleanup never hold the full file listing in memory. Every streaming
//! operation has a full-listing counterpart that the manager falls back to
//! when the streaming pass returns an error.
//!
//! The streaming walk is strict: anything named like an entry that is not a
//! regular file aborts it with [`CacheError::Scan`]. The full listing skips
//! such paths.

use std::collections::BTreeMap;
use std::fs::{self, ReadDir};
use std::mem;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::entry::current_timestamp;
use crate::cache::path::{namespaced_key, PathMapper};
use crate::cache::store::{EntryStore, ReadOutcome};
use crate::cache::ABANDONED_WRITE_GRACE_SECS;
use crate::error::{CacheError, Result};

// == Metadata ==
/// Aggregate view of the entries on disk.
///
/// `total_files` counts decodable entries (`valid_files + expired_files`);
/// corrupt files found during the scan are deleted and counted separately.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheMetadata {
    pub total_files: u64,
    pub total_size: u64,
    pub expired_files: u64,
    pub valid_files: u64,
    pub corrupt_files: u64,
    /// Entry count per namespace
    pub namespaces: BTreeMap<String, u64>,
    /// Bytes on disk per namespace
    pub size_by_namespace: BTreeMap<String, u64>,
}

impl CacheMetadata {
    fn merge(&mut self, other: CacheMetadata) {
        self.total_files += other.total_files;
        self.total_size += other.total_size;
        self.expired_files += other.expired_files;
        self.valid_files += other.valid_files;
        self.corrupt_files += other.corrupt_files;
        for (ns, count) in other.namespaces {
            *self.namespaces.entry(ns).or_insert(0) += count;
        }
        for (ns, size) in other.size_by_namespace {
            *self.size_by_namespace.entry(ns).or_insert(0) += size;
        }
    }

    // Rough heap footprint of the partial aggregate.
    fn estimated_bytes(&self) -> u64 {
        let per_ns = |m: &BTreeMap<String, u64>| -> u64 {
            m.keys().map(|k| (k.len() + 2 * mem::size_of::<u64>()) as u64).sum()
        };
        per_ns(&self.namespaces) + per_ns(&self.size_by_namespace)
    }
}

// == Chunk Operations ==
/// Bulk mutation applied file by file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOperation {
    /// Delete entries whose TTL has passed
    CleanupExpired,
    /// Delete every entry recorded under this namespace
    ClearNamespace(String),
}

/// Outcome of a chunked (or fallback) bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkReport {
    /// Entries the operation removed
    pub processed: u64,
    /// Entry files examined (a fallback pass re-examines what the failed
    /// streaming pass left behind)
    pub scanned: u64,
    /// Bytes released by removed entries
    pub bytes_freed: u64,
    /// Corrupt or abandoned empty files deleted along the way
    pub corrupt: u64,
    /// Number of chunks the walk was split into
    pub chunks: u64,
}

/// Chunking limits.
#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    /// Files per chunk
    pub batch_size: usize,
    /// Budget for per-chunk state, in bytes
    pub max_memory_bytes: u64,
}

// == Walker ==
/// Lazily yields entry file paths, one shard directory at a time.
struct EntryWalker {
    shards: std::vec::IntoIter<PathBuf>,
    current: Option<(PathBuf, ReadDir)>,
}

impl EntryWalker {
    fn open(root: &Path) -> Result<Self> {
        let shards = match fs::read_dir(root) {
            Ok(rd) => {
                let mut shards = Vec::new();
                for entry in rd {
                    let entry = entry.map_err(|e| CacheError::io(root, e))?;
                    let name = entry.file_name();
                    if PathMapper::is_shard_name(&name.to_string_lossy())
                        && entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
                    {
                        shards.push(entry.path());
                    }
                }
                shards.sort();
                shards
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(CacheError::io(root, e)),
        };

        Ok(Self {
            shards: shards.into_iter(),
            current: None,
        })
    }
}

impl Iterator for EntryWalker {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((dir, entries)) = self.current.as_mut() {
                match entries.next() {
                    Some(Ok(entry)) => {
                        let path = entry.path();
                        if !PathMapper::is_entry_file(&path) {
                            continue;
                        }
                        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                        if !is_file {
                            return Some(Err(CacheError::Scan(format!(
                                "{} is not a regular file",
                                path.display()
                            ))));
                        }
                        return Some(Ok(path));
                    }
                    Some(Err(e)) => return Some(Err(CacheError::io(dir.as_path(), e))),
                    None => self.current = None,
                }
            }

            let shard = self.shards.next()?;
            match fs::read_dir(&shard) {
                Ok(entries) => self.current = Some((shard, entries)),
                // Shard removed underneath us; nothing left to walk there.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Some(Err(CacheError::io(shard, e))),
            }
        }
    }
}

// == Scanner ==
/// Borrowing view over a cache root used for whole-tree passes.
pub struct MetadataScanner<'a> {
    paths: &'a PathMapper,
    store: &'a EntryStore,
    settings: ScanSettings,
}

impl<'a> MetadataScanner<'a> {
    pub fn new(paths: &'a PathMapper, store: &'a EntryStore, settings: ScanSettings) -> Self {
        Self {
            paths,
            store,
            settings: ScanSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
        }
    }

    // Pulls the next chunk of paths, bounded by batch size and memory budget.
    fn next_chunk(&self, walker: &mut EntryWalker) -> Result<Vec<PathBuf>> {
        let mut chunk = Vec::with_capacity(self.settings.batch_size.min(1024));
        let mut bytes = 0u64;
        while chunk.len() < self.settings.batch_size {
            match walker.next() {
                Some(path) => {
                    let path = path?;
                    bytes += (path.as_os_str().len() + mem::size_of::<PathBuf>()) as u64;
                    chunk.push(path);
                    if bytes >= self.settings.max_memory_bytes {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(chunk)
    }

    // == Stream Metadata ==
    /// Aggregates entry statistics chunk by chunk into `total`.
    ///
    /// Partial per-chunk aggregates are folded into `total` at the end of each
    /// chunk, or earlier when they outgrow the memory budget. On error `total`
    /// holds what was aggregated before the failure.
    pub fn stream_metadata(&self, total: &mut CacheMetadata) -> Result<()> {
        let mut walker = EntryWalker::open(self.paths.root())?;
        let now = current_timestamp();
        let mut chunks = 0u64;

        loop {
            let chunk = self.next_chunk(&mut walker)?;
            if chunk.is_empty() {
                break;
            }
            chunks += 1;

            let mut partial = CacheMetadata::default();
            let result = chunk.iter().try_for_each(|path| -> Result<()> {
                self.inspect(path, now, &mut partial)?;
                if partial.estimated_bytes() > self.settings.max_memory_bytes {
                    total.merge(mem::take(&mut partial));
                }
                Ok(())
            });
            total.merge(partial);
            result?;
        }

        debug!(
            "Streamed metadata for {} entries in {} chunks",
            total.total_files, chunks
        );
        Ok(())
    }

    /// Same result as [`stream_metadata`](Self::stream_metadata), computed from
    /// one full listing. Per-file failures are logged and skipped.
    pub fn full_metadata(&self) -> CacheMetadata {
        let now = current_timestamp();
        let mut total = CacheMetadata::default();
        for path in full_listing(self.paths.root()) {
            if let Err(e) = self.inspect(&path, now, &mut total) {
                warn!("Skipping {} during full scan: {}", path.display(), e);
            }
        }
        total
    }

    fn inspect(&self, path: &Path, now: i64, acc: &mut CacheMetadata) -> Result<()> {
        let size = match self.store.file_size(path) {
            Some(size) => size,
            None => return Ok(()),
        };

        match self.store.read(path)? {
            ReadOutcome::Found(entry) => {
                acc.total_files += 1;
                acc.total_size += size;
                if entry.is_expired_at(now) {
                    acc.expired_files += 1;
                } else {
                    acc.valid_files += 1;
                }
                *acc.namespaces.entry(entry.namespace.clone()).or_insert(0) += 1;
                *acc.size_by_namespace.entry(entry.namespace).or_insert(0) += size;
            }
            ReadOutcome::Corrupt { .. } => acc.corrupt_files += 1,
            ReadOutcome::Absent => {
                if self.reap_abandoned(path)? {
                    acc.corrupt_files += 1;
                }
            }
        }
        Ok(())
    }

    // Empty files are writes in progress until they outlive the grace period.
    fn reap_abandoned(&self, path: &Path) -> Result<bool> {
        let grace = Duration::from_secs(ABANDONED_WRITE_GRACE_SECS);
        self.store.remove_if_abandoned(path, grace)
    }

    // == Process In Chunks ==
    /// Applies `operation` to every entry, chunk by chunk, adding to `report`.
    ///
    /// `on_removed` receives the namespaced key and size of each removed entry.
    /// On error `report` already accounts for every file removed before the
    /// failure.
    pub fn process_in_chunks(
        &self,
        operation: &ChunkOperation,
        report: &mut ChunkReport,
        on_removed: &mut dyn FnMut(&str, u64),
    ) -> Result<()> {
        let mut walker = EntryWalker::open(self.paths.root())?;
        let now = current_timestamp();

        loop {
            let chunk = self.next_chunk(&mut walker)?;
            if chunk.is_empty() {
                break;
            }
            report.chunks += 1;
            for path in &chunk {
                self.apply(operation, path, now, report, on_removed)?;
            }
        }

        Ok(())
    }

    /// Same result as [`process_in_chunks`](Self::process_in_chunks), from one
    /// full listing. Per-file failures are logged and skipped.
    pub fn process_full(
        &self,
        operation: &ChunkOperation,
        report: &mut ChunkReport,
        on_removed: &mut dyn FnMut(&str, u64),
    ) {
        let now = current_timestamp();
        report.chunks += 1;
        for path in full_listing(self.paths.root()) {
            if let Err(e) = self.apply(operation, &path, now, report, on_removed) {
                warn!("Skipping {} during full pass: {}", path.display(), e);
            }
        }
    }

    fn apply(
        &self,
        operation: &ChunkOperation,
        path: &Path,
        now: i64,
        report: &mut ChunkReport,
        on_removed: &mut dyn FnMut(&str, u64),
    ) -> Result<()> {
        let entry = match self.store.read(path)? {
            ReadOutcome::Found(entry) => entry,
            ReadOutcome::Corrupt { .. } => {
                report.scanned += 1;
                report.corrupt += 1;
                return Ok(());
            }
            ReadOutcome::Absent => {
                if self.reap_abandoned(path)? {
                    report.scanned += 1;
                    report.corrupt += 1;
                }
                return Ok(());
            }
        };
        report.scanned += 1;

        let remove = match operation {
            ChunkOperation::CleanupExpired => entry.is_expired_at(now),
            ChunkOperation::ClearNamespace(ns) => entry.namespace == *ns,
        };
        if !remove {
            return Ok(());
        }

        if let Some(size) = self.store.remove(path)? {
            report.processed += 1;
            report.bytes_freed += size;
            on_removed(&namespaced_key(&entry.namespace, &entry.key), size);
        }
        Ok(())
    }
}

// == Full Listing ==
/// Every entry file under `root`, collected eagerly. Unreadable directories
/// are logged and skipped, as is anything that is not a regular file.
pub fn full_listing(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let shards = match fs::read_dir(root) {
        Ok(rd) => rd,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Cannot list cache root {}: {}", root.display(), e);
            }
            return files;
        }
    };

    for shard in shards.flatten() {
        let shard_path = shard.path();
        let name = shard.file_name();
        if !shard_path.is_dir() || !PathMapper::is_shard_name(&name.to_string_lossy()) {
            continue;
        }
        match fs::read_dir(&shard_path) {
            Ok(entries) => files.extend(
                entries
                    .flatten()
                    .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                    .map(|e| e.path())
                    .filter(|p| PathMapper::is_entry_file(p)),
            ),
            Err(e) => warn!("Cannot list shard {}: {}", shard_path.display(), e),
        }
    }
    files
}

/// Bytes used by entry files under `root`, without decoding them.
pub fn disk_usage(root: &Path) -> u64 {
    full_listing(root)
        .iter()
        .filter_map(|p| fs::metadata(p).ok())
        .map(|m| m.len())
        .sum()
}
