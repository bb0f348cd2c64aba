//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::cache::codec::codec_by_name;
use crate::cache::{ManagerConfig, MB};
use crate::error::{CacheError, Result};

/// Directory created under `CACHE_UPLOAD_DIR` to hold the cache tree
pub const UPLOAD_SUBDIR: &str = "social-cache";

/// Bounds applied to `CACHE_POOL_SIZE`
pub const MIN_POOL_SIZE: usize = 5;
pub const MAX_POOL_SIZE: usize = 50;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base upload directory; the cache lives in its `social-cache` child
    pub upload_dir: Option<PathBuf>,
    /// Explicit cache root, wins over `upload_dir`
    pub cache_dir: Option<PathBuf>,
    /// Ceiling on cache usage in megabytes
    pub max_cache_size_mb: u64,
    /// Memory budget for streaming scans in megabytes
    pub max_memory_usage_mb: u64,
    /// Maximum number of requests served at once
    pub cache_pool_size: usize,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Files examined per scan chunk
    pub batch_size: usize,
    /// Enables LRU tracking and size enforcement
    pub bounded: bool,
    /// Record format name (`json` or `msgpack`)
    pub format: String,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_UPLOAD_DIR` - Cache root becomes `<dir>/social-cache`
    /// - `CACHE_DIR` - Explicit cache root (default: `cache`)
    /// - `MAX_CACHE_SIZE` - Ceiling in MB (default: 100)
    /// - `MAX_MEMORY_USAGE` - Scan memory budget in MB (default: 50)
    /// - `CACHE_POOL_SIZE` - Concurrent requests, clamped to 5..=50 (default: 10)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `SCAN_BATCH_SIZE` - Files per scan chunk (default: 1000)
    /// - `CACHE_BOUNDED` - Enable LRU eviction (default: true)
    /// - `CACHE_FORMAT` - `json` or `msgpack` (default: json)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 300)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any variable source. Unparseable values fall back
    /// to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            upload_dir: lookup("CACHE_UPLOAD_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            cache_dir: lookup("CACHE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            max_cache_size_mb: parse_var(&lookup, "MAX_CACHE_SIZE")
                .unwrap_or(defaults.max_cache_size_mb),
            max_memory_usage_mb: parse_var(&lookup, "MAX_MEMORY_USAGE")
                .unwrap_or(defaults.max_memory_usage_mb),
            cache_pool_size: parse_var(&lookup, "CACHE_POOL_SIZE")
                .unwrap_or(defaults.cache_pool_size)
                .clamp(MIN_POOL_SIZE, MAX_POOL_SIZE),
            default_ttl: parse_var(&lookup, "DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            batch_size: parse_var(&lookup, "SCAN_BATCH_SIZE")
                .unwrap_or(defaults.batch_size)
                .max(1),
            bounded: lookup("CACHE_BOUNDED")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.bounded),
            format: lookup("CACHE_FORMAT")
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.format),
            server_port: parse_var(&lookup, "SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var(&lookup, "CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval),
        }
    }

    /// Directory the cache tree lives in.
    pub fn cache_root(&self) -> PathBuf {
        match (&self.cache_dir, &self.upload_dir) {
            (Some(dir), _) => dir.clone(),
            (None, Some(upload)) => upload.join(UPLOAD_SUBDIR),
            (None, None) => PathBuf::from("cache"),
        }
    }

    /// Converts into cache construction parameters (sizes in bytes).
    pub fn manager_config(&self) -> Result<ManagerConfig> {
        let codec = codec_by_name(&self.format).ok_or_else(|| {
            CacheError::InvalidRequest(format!("unknown cache format '{}'", self.format))
        })?;

        Ok(ManagerConfig {
            root: self.cache_root(),
            max_size_bytes: self.max_cache_size_mb.saturating_mul(MB),
            default_ttl: self.default_ttl,
            batch_size: self.batch_size,
            max_memory_bytes: self.max_memory_usage_mb.saturating_mul(MB),
            bounded: self.bounded,
            codec,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: None,
            cache_dir: None,
            max_cache_size_mb: 100,
            max_memory_usage_mb: 50,
            cache_pool_size: 10,
            default_ttl: 3600,
            batch_size: 1000,
            bounded: true,
            format: "json".to_string(),
            server_port: 3000,
            cleanup_interval: 300,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|raw| raw.trim().parse().ok())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
