//! Social Cache - A file-backed bounded cache server
//!
//! Stores namespaced entries as individual files in a sha256-sharded tree,
//! with TTL expiration and LRU eviction under a byte ceiling.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheManager, CacheReport, ManagerConfig, DEFAULT_NAMESPACE};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
