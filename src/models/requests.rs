//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies. Keys and namespaces
//! travel in the URL path.

use serde::Deserialize;
use serde_json::Value;

/// Request body for `PUT /cache/:namespace/:key`
///
/// # Fields
/// - `value`: Any JSON value to store
/// - `ttl`: Optional TTL in seconds (uses default if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The value to store
    pub value: Value,
    /// Optional TTL in seconds
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Request body for the counter endpoints (`/incr`, `/decr`)
#[derive(Debug, Clone, Deserialize)]
pub struct CounterRequest {
    /// Step to apply, 1 when omitted
    #[serde(default = "default_step")]
    pub by: i64,
}

impl Default for CounterRequest {
    fn default() -> Self {
        Self { by: default_step() }
    }
}

fn default_step() -> i64 {
    1
}

/// Request body for `PUT /limits`
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsRequest {
    /// New ceiling in bytes
    pub max_cache_size: u64,
}

impl LimitsRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.max_cache_size == 0 {
            return Some("max_cache_size must be greater than zero".to_string());
        }
        None
    }
}
