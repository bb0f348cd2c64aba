//! Cache Entry Module
//!
//! Defines the record persisted for every cache entry, one file per entry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version written into every record. Records carrying any other version are
/// treated as corrupt by the codecs.
pub const FORMAT_VERSION: u32 = 1;

// == Cache Entry ==
/// A single persisted cache entry.
///
/// Timestamps are Unix seconds. `data` holds the caller's value in the JSON
/// value model so that every codec can carry it without knowing its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Record format version
    #[serde(rename = "v")]
    pub version: u32,
    /// The stored value
    pub data: Value,
    /// Creation timestamp (Unix seconds)
    pub created: i64,
    /// Expiration timestamp (Unix seconds)
    pub expires: i64,
    /// Namespace the entry belongs to
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Caller-supplied key, without namespace
    #[serde(default)]
    pub key: String,
}

fn default_namespace() -> String {
    super::DEFAULT_NAMESPACE.to_string()
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry expiring `ttl_seconds` from now.
    pub fn new(namespace: &str, key: &str, data: Value, ttl_seconds: u64) -> Self {
        let now = current_timestamp();
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);

        Self {
            version: FORMAT_VERSION,
            data,
            created: now,
            expires: now.saturating_add(ttl),
            namespace: namespace.to_string(),
            key: key.to_string(),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches `expires`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp())
    }

    /// Checks expiry against an explicit clock reading.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires
    }

    // == Time To Live ==
    /// Returns remaining TTL in seconds, `0` once expired.
    pub fn ttl_remaining(&self) -> u64 {
        let remaining = self.expires - current_timestamp();
        u64::try_from(remaining).unwrap_or(0)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in seconds.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
