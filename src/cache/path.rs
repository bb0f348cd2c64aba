//! Path Mapper Module
//!
//! Maps a (namespace, key) pair onto its sharded file path:
//! `<root>/<first 2 hex chars>/<sha256 hex>.cache`.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::cache::CACHE_FILE_EXTENSION;
use crate::error::{CacheError, Result};

/// Joins a namespace and a key. Namespaces never contain it, so the first
/// occurrence in a namespaced key is always the boundary.
pub const NAMESPACE_SEPARATOR: char = ':';

/// Joins namespace and key into the string that is hashed and tracked.
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    format!("{}{}{}", namespace, NAMESPACE_SEPARATOR, key)
}

/// SHA-256 of the namespaced key, lowercase hex (64 chars).
pub fn key_to_hash(namespaced: &str) -> String {
    hex::encode(Sha256::digest(namespaced.as_bytes()))
}

// == Path Mapper ==
/// Deterministic mapping from namespaced keys to files under a cache root.
#[derive(Debug, Clone)]
pub struct PathMapper {
    root: PathBuf,
}

impl PathMapper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a namespaced key, without touching the filesystem.
    pub fn locate_namespaced(&self, namespaced: &str) -> PathBuf {
        let hash = key_to_hash(namespaced);
        self.root
            .join(&hash[..2])
            .join(format!("{}.{}", hash, CACHE_FILE_EXTENSION))
    }

    /// Path for (namespace, key), without touching the filesystem.
    pub fn locate(&self, namespace: &str, key: &str) -> PathBuf {
        self.locate_namespaced(&namespaced_key(namespace, key))
    }

    /// Path for (namespace, key), creating the shard directory if needed.
    ///
    /// Used on the write path: a shard directory that cannot be created is a
    /// write failure.
    pub fn resolve(&self, namespace: &str, key: &str) -> Result<PathBuf> {
        let path = self.locate(namespace, key);
        if let Some(shard) = path.parent() {
            create_directory(shard)?;
        }
        Ok(path)
    }

    /// Whether a directory entry name looks like one of our shard directories.
    pub fn is_shard_name(name: &str) -> bool {
        name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Whether a file name looks like one of our entry files.
    pub fn is_entry_file(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(CACHE_FILE_EXTENSION)
    }
}

/// Recursive mkdir with 0755 permissions on unix.
pub fn create_directory(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }

    builder.create(path).map_err(|e| {
        tracing::error!("Failed to create cache directory {}: {}", path.display(), e);
        CacheError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_deterministic_and_fixed_length() {
        let a = key_to_hash("default:key");
        let b = key_to_hash("default:key");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let mapper = PathMapper::new("/tmp/cache");
        assert_ne!(mapper.locate("x", "k"), mapper.locate("y", "k"));
    }

    #[test]
    fn test_path_layout() {
        let mapper = PathMapper::new("/tmp/cache");
        let path = mapper.locate("default", "key");
        let hash = key_to_hash("default:key");

        assert_eq!(
            path,
            PathBuf::from("/tmp/cache")
                .join(&hash[..2])
                .join(format!("{}.cache", hash))
        );
    }

    #[test]
    fn test_resolve_creates_shard_directory() {
        let dir = TempDir::new().unwrap();
        let mapper = PathMapper::new(dir.path());

        let path = mapper.resolve("default", "key").unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());
    }

    #[test]
    fn test_resolve_fails_when_root_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let mapper = PathMapper::new(&blocker);
        assert!(matches!(
            mapper.resolve("default", "key"),
            Err(CacheError::Io { .. })
        ));
    }

    #[test]
    fn test_shard_and_entry_names() {
        assert!(PathMapper::is_shard_name("a3"));
        assert!(!PathMapper::is_shard_name("a3f"));
        assert!(!PathMapper::is_shard_name("zz"));
        assert!(PathMapper::is_entry_file(Path::new("/c/ab/abcd.cache")));
        assert!(!PathMapper::is_entry_file(Path::new("/c/ab/abcd.tmp")));
    }
}
