//! Cache Module
//!
//! File-backed cache with TTL expiration, namespaces, sharded on-disk layout
//! and optional LRU eviction under a byte budget.

pub mod codec;
mod entry;
mod lru;
mod manager;
pub mod path;
pub mod scanner;
mod stats;
mod store;


// Re-export public types
pub use codec::{EntryCodec, JsonCodec, MessagePackCodec};
pub use entry::{current_timestamp, CacheEntry, FORMAT_VERSION};
pub use lru::LruIndex;
pub use manager::{CacheManager, CacheReport, ManagerConfig, ScanMode};
pub use path::PathMapper;
pub use scanner::{CacheMetadata, ChunkOperation, ChunkReport};
pub use stats::CacheStats;
pub use store::{EntryStore, ReadOutcome};

// == Public Constants ==
/// Namespace used when the caller does not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Extension of every entry file
pub const CACHE_FILE_EXTENSION: &str = "cache";

/// LRU index size that triggers a trim
pub const LRU_MAX_TRACKED: usize = 10_000;

/// LRU index size after a trim (most recently used keys are kept)
pub const LRU_TRIM_TARGET: usize = 5_000;

/// Age after which an empty entry file counts as an abandoned write
pub const ABANDONED_WRITE_GRACE_SECS: u64 = 300;

/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Bytes per megabyte for configuration values
pub const MB: u64 = 1024 * 1024;
