//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

/// Response body for `GET /cache/:namespace/:key`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub namespace: String,
    pub key: String,
    /// The stored value
    pub value: Value,
}

impl GetResponse {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            value,
        }
    }
}

/// Response body for `PUT /cache/:namespace/:key`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    pub namespace: String,
    pub key: String,
}

impl SetResponse {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        let (namespace, key) = (namespace.into(), key.into());
        Self {
            message: format!("Key '{}:{}' set successfully", namespace, key),
            namespace,
            key,
        }
    }
}

/// Response body for `DELETE /cache/:namespace/:key`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    pub namespace: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        let (namespace, key) = (namespace.into(), key.into());
        Self {
            message: format!("Key '{}:{}' deleted successfully", namespace, key),
            namespace,
            key,
        }
    }
}

/// Response body for `GET /cache/:namespace/:key/exists`
#[derive(Debug, Clone, Serialize)]
pub struct ExistsResponse {
    pub key: String,
    pub exists: bool,
}

/// Response body for `GET /cache/:namespace/:key/ttl`
#[derive(Debug, Clone, Serialize)]
pub struct TtlResponse {
    pub key: String,
    /// Seconds remaining, 0 when absent or expired
    pub ttl: u64,
}

/// Response body for the counter endpoints
#[derive(Debug, Clone, Serialize)]
pub struct CounterResponse {
    pub key: String,
    pub value: i64,
}

/// Response body for the clear endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    /// Cleared namespace, absent when the whole cache was cleared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ClearResponse {
    pub fn new(namespace: Option<String>) -> Self {
        let message = match &namespace {
            Some(ns) => format!("Namespace '{}' cleared", ns),
            None => "Cache cleared".to_string(),
        };
        Self { message, namespace }
    }
}

/// Response body for `POST /cleanup`
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    /// Expired entries removed by this run
    pub removed: u64,
}

/// Response body for `GET /size`
#[derive(Debug, Clone, Serialize)]
pub struct SizeResponse {
    /// Bytes used by entry files
    pub size: u64,
    /// Current ceiling in bytes
    pub max_size: u64,
}

/// Response body for `PUT /limits`
#[derive(Debug, Clone, Serialize)]
pub struct LimitsResponse {
    pub max_size: u64,
    /// Usage after any eviction the new ceiling triggered
    pub current_size: u64,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
