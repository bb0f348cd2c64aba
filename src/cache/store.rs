//! Entry Store Module
//!
//! Persists one encoded [`CacheEntry`] per file. Writers hold an exclusive
//! advisory lock for the whole write, readers a shared one, so a reader never
//! sees a half-written record.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::cache::codec::{EntryCodec, JsonCodec};
use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Read Outcome ==
/// Result of reading an entry file.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// File decoded into a well-formed entry (expiry not checked)
    Found(CacheEntry),
    /// No file at this path
    Absent,
    /// File existed but did not decode; it has been deleted
    Corrupt { bytes: u64 },
}

// == Entry Store ==
#[derive(Debug)]
pub struct EntryStore {
    codec: Box<dyn EntryCodec>,
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new(Box::new(JsonCodec))
    }
}

impl EntryStore {
    pub fn new(codec: Box<dyn EntryCodec>) -> Self {
        Self { codec }
    }

    /// Name of the codec in use.
    pub fn format(&self) -> &'static str {
        self.codec.name()
    }

    // == Write ==
    /// Encodes and writes an entry, returning the number of bytes written.
    ///
    /// The shard directory must already exist. On any failure after the file
    /// was opened, the file is removed so no partial record is left behind.
    pub fn write(&self, path: &Path, entry: &CacheEntry) -> Result<u64> {
        let bytes = self.encode(entry)?;
        self.write_bytes(path, &bytes)
    }

    /// Encodes an entry with the configured codec.
    pub fn encode(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        self.codec.encode(entry)
    }

    /// Writes an already encoded record under an exclusive lock.
    pub fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<u64> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| CacheError::io(path, e))?;

        // Truncate only once the lock is held, otherwise a concurrent reader
        // could observe an empty file.
        FileExt::lock_exclusive(&file).map_err(|e| CacheError::io(path, e))?;
        let written = file
            .set_len(0)
            .and_then(|_| file.write_all(bytes))
            .and_then(|_| file.flush());
        let _ = FileExt::unlock(&file);
        drop(file);

        if let Err(e) = written {
            warn!("Write to {} failed, removing partial file: {}", path.display(), e);
            let _ = fs::remove_file(path);
            return Err(CacheError::io(path, e));
        }

        Ok(bytes.len() as u64)
    }

    // == Read ==
    /// Reads and decodes an entry.
    ///
    /// Undecodable files are deleted and reported as [`ReadOutcome::Corrupt`].
    /// A zero-length file is a write in progress and reads as absent.
    pub fn read(&self, path: &Path) -> Result<ReadOutcome> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ReadOutcome::Absent),
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let mut bytes = Vec::new();
        FileExt::lock_shared(&file).map_err(|e| CacheError::io(path, e))?;
        let read = file.read_to_end(&mut bytes);
        let _ = FileExt::unlock(&file);
        drop(file);
        read.map_err(|e| CacheError::io(path, e))?;

        if bytes.is_empty() {
            return Ok(ReadOutcome::Absent);
        }

        match self.codec.decode(&bytes) {
            Ok(entry) => Ok(ReadOutcome::Found(entry)),
            Err(e) => {
                warn!("Removing corrupt cache file {}: {}", path.display(), e);
                if let Err(rm) = fs::remove_file(path) {
                    if rm.kind() != ErrorKind::NotFound {
                        warn!("Failed to remove corrupt file {}: {}", path.display(), rm);
                    }
                }
                Ok(ReadOutcome::Corrupt {
                    bytes: bytes.len() as u64,
                })
            }
        }
    }

    // == Remove ==
    /// Deletes an entry file, returning its size if it existed.
    pub fn remove(&self, path: &Path) -> Result<Option<u64>> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };

        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed cache file {} ({} bytes)", path.display(), size);
                Ok(Some(size))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Deletes a zero-length entry file last modified at least `grace` ago.
    ///
    /// Such a file is left by a writer that died between creating and
    /// filling it. Files whose lock is held are never touched. Returns whether
    /// the file was removed.
    pub fn remove_if_abandoned(&self, path: &Path, grace: Duration) -> Result<bool> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        if FileExt::try_lock_exclusive(&file).is_err() {
            return Ok(false);
        }

        let meta = file.metadata().map_err(|e| CacheError::io(path, e))?;
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();
        if !meta.is_file() || meta.len() != 0 || age < grace {
            let _ = FileExt::unlock(&file);
            return Ok(false);
        }

        let removed = fs::remove_file(path);
        let _ = FileExt::unlock(&file);
        match removed {
            Ok(()) => {
                warn!(
                    "Removed abandoned empty cache file {} ({}s old)",
                    path.display(),
                    age.as_secs()
                );
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Size of an entry file, if present.
    pub fn file_size(&self, path: &Path) -> Option<u64> {
        fs::metadata(path).ok().map(|m| m.len())
    }
}
