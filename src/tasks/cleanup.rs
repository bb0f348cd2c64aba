//! Expired Entry Cleanup Task
//!
//! Background task that periodically sweeps expired entries from disk.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::api::{with_cache, SharedCache};

/// Spawns a background task that periodically removes expired cache files.
///
/// Each sweep runs on the blocking pool and holds the manager lock until the
/// directory tree has been walked, so HTTP requests wait for it.
///
/// # Arguments
/// * `cache` - shared reference to the cache manager
/// * `cleanup_interval_secs` - Interval in seconds between cleanup runs
///   (values below one second are raised to one)
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task(
    cache: SharedCache,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expired cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            match with_cache(&cache, |manager| manager.cleanup_expired()).await {
                Ok(0) => debug!("Expired cleanup: no expired entries found"),
                Ok(removed) => info!("Expired cleanup: removed {} entries", removed),
                Err(e) => error!("Expired cleanup failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheManager, ManagerConfig, DEFAULT_NAMESPACE};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn shared_cache(dir: &TempDir) -> SharedCache {
        let manager = CacheManager::open(ManagerConfig::new(dir.path())).unwrap();
        Arc::new(Mutex::new(manager))
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let dir = TempDir::new().unwrap();
        let cache = shared_cache(&dir);

        let path = {
            let mut cache_guard = cache.lock().unwrap();
            cache_guard
                .set("expire_soon", "value", Some(1), DEFAULT_NAMESPACE)
                .unwrap();
            cache_guard
                .resolve_path("expire_soon", DEFAULT_NAMESPACE)
                .unwrap()
        };

        let handle = spawn_cleanup_task(cache.clone(), 1);

        // Entry expires after ~1-2s; the sweep at ~3s must catch it.
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert!(!path.exists(), "Expired file should have been removed");
        {
            let cache_guard = cache.lock().unwrap();
            assert_eq!(cache_guard.stats().evictions_expired, 1);
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let dir = TempDir::new().unwrap();
        let cache = shared_cache(&dir);

        {
            let mut cache_guard = cache.lock().unwrap();
            cache_guard
                .set("long_lived", "value", Some(3600), DEFAULT_NAMESPACE)
                .unwrap();
        }

        let handle = spawn_cleanup_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        {
            let mut cache_guard = cache.lock().unwrap();
            let result: Option<String> = cache_guard.get("long_lived", DEFAULT_NAMESPACE);
            assert_eq!(result.as_deref(), Some("value"));
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let dir = TempDir::new().unwrap();
        let cache = shared_cache(&dir);

        let handle = spawn_cleanup_task(cache, 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
