//! API Handlers
//!
//! HTTP request handlers exposing the cache manager's public surface.
//!
//! The manager does blocking file I/O, so every call runs on tokio's blocking
//! pool through [`with_cache`] instead of on a runtime worker.

use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::{CacheManager, CacheReport, CacheStats};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, CleanupResponse, CounterRequest, CounterResponse, DeleteResponse,
    ExistsResponse, GetResponse, HealthResponse, LimitsRequest, LimitsResponse, SetRequest,
    SetResponse, SizeResponse, TtlResponse,
};

/// Cache manager shared between handlers and background tasks.
pub type SharedCache = Arc<Mutex<CacheManager>>;

/// Application state shared across all handlers.
///
/// Every manager operation takes `&mut self` (LRU order and statistics change
/// on reads), so one mutex serializes access.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe cache manager
    pub cache: SharedCache,
    /// Requests served at once
    pub max_concurrency: usize,
}

impl AppState {
    /// Creates a new AppState around an opened manager.
    pub fn new(cache: CacheManager, max_concurrency: usize) -> Self {
        Self {
            cache: Arc::new(Mutex::new(cache)),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Opens the cache described by the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = CacheManager::open(config.manager_config()?)?;
        Ok(Self::new(cache, config.cache_pool_size))
    }
}

/// Runs `f` against the manager on the blocking thread pool.
///
/// A lock poisoned by an earlier panic is taken over; a stale size counter
/// is reconciled by the next scan. A panic inside `f` becomes
/// [`CacheError::Internal`].
pub async fn with_cache<T, F>(cache: &SharedCache, f: F) -> Result<T>
where
    F: FnOnce(&mut CacheManager) -> T + Send + 'static,
    T: Send + 'static,
{
    let cache = Arc::clone(cache);
    tokio::task::spawn_blocking(move || {
        let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    })
    .await
    .map_err(|e| CacheError::Internal(format!("cache task failed: {}", e)))
}

/// Handler for PUT /cache/:namespace/:key
pub async fn set_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    let (ns, k) = (namespace.clone(), key.clone());
    with_cache(&state.cache, move |cache| {
        cache.set(&k, &req.value, req.ttl, &ns)
    })
    .await??;

    Ok(Json(SetResponse::new(namespace, key)))
}

/// Handler for GET /cache/:namespace/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> Result<Json<GetResponse>> {
    let (ns, k) = (namespace.clone(), key.clone());
    let value: Option<Value> = with_cache(&state.cache, move |cache| cache.get(&k, &ns)).await?;
    let value = value.ok_or_else(|| CacheError::NotFound(format!("{}:{}", namespace, key)))?;

    Ok(Json(GetResponse::new(namespace, key, value)))
}

/// Handler for DELETE /cache/:namespace/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>> {
    let (ns, k) = (namespace.clone(), key.clone());
    with_cache(&state.cache, move |cache| cache.delete(&k, &ns)).await??;

    Ok(Json(DeleteResponse::new(namespace, key)))
}

/// Handler for GET /cache/:namespace/:key/exists
pub async fn exists_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> Result<Json<ExistsResponse>> {
    let k = key.clone();
    let exists = with_cache(&state.cache, move |cache| cache.exists(&k, &namespace)).await?;
    Ok(Json(ExistsResponse { key, exists }))
}

/// Handler for GET /cache/:namespace/:key/ttl
pub async fn ttl_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
) -> Result<Json<TtlResponse>> {
    let k = key.clone();
    let ttl = with_cache(&state.cache, move |cache| cache.get_ttl(&k, &namespace)).await?;
    Ok(Json(TtlResponse { key, ttl }))
}

/// Handler for POST /cache/:namespace/:key/incr
pub async fn increment_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    body: Option<Json<CounterRequest>>,
) -> Result<Json<CounterResponse>> {
    let by = body.map(|Json(req)| req).unwrap_or_default().by;
    let k = key.clone();
    let value =
        with_cache(&state.cache, move |cache| cache.increment(&k, by, &namespace)).await??;
    Ok(Json(CounterResponse { key, value }))
}

/// Handler for POST /cache/:namespace/:key/decr
pub async fn decrement_handler(
    State(state): State<AppState>,
    Path((namespace, key)): Path<(String, String)>,
    body: Option<Json<CounterRequest>>,
) -> Result<Json<CounterResponse>> {
    let by = body.map(|Json(req)| req).unwrap_or_default().by;
    let k = key.clone();
    let value =
        with_cache(&state.cache, move |cache| cache.decrement(&k, by, &namespace)).await??;
    Ok(Json(CounterResponse { key, value }))
}

/// Handler for DELETE /cache/:namespace
pub async fn clear_namespace_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<ClearResponse>> {
    let ns = namespace.clone();
    with_cache(&state.cache, move |cache| cache.clear(Some(&ns))).await??;
    Ok(Json(ClearResponse::new(Some(namespace))))
}

/// Handler for DELETE /cache
pub async fn clear_all_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    with_cache(&state.cache, |cache| cache.clear(None)).await??;
    Ok(Json(ClearResponse::new(None)))
}

/// Handler for POST /cleanup
pub async fn cleanup_handler(State(state): State<AppState>) -> Result<Json<CleanupResponse>> {
    let removed = with_cache(&state.cache, |cache| cache.cleanup_expired()).await?;
    Ok(Json(CleanupResponse { removed }))
}

/// Handler for GET /stats
///
/// Counters plus a fresh scan of the cache directory.
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<CacheReport>> {
    let report = with_cache(&state.cache, |cache| cache.get_stats()).await?;
    Ok(Json(report))
}

/// Handler for POST /stats/reset
pub async fn reset_stats_handler(State(state): State<AppState>) -> Result<Json<CacheStats>> {
    let stats = with_cache(&state.cache, |cache| {
        cache.reset_stats();
        cache.stats().clone()
    })
    .await?;
    Ok(Json(stats))
}

/// Handler for GET /size
pub async fn size_handler(State(state): State<AppState>) -> Result<Json<SizeResponse>> {
    let response = with_cache(&state.cache, |cache| SizeResponse {
        size: cache.get_cache_size(),
        max_size: cache.max_cache_size(),
    })
    .await?;
    Ok(Json(response))
}

/// Handler for PUT /limits
pub async fn limits_handler(
    State(state): State<AppState>,
    Json(req): Json<LimitsRequest>,
) -> Result<Json<LimitsResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let response = with_cache(&state.cache, move |cache| {
        cache.set_max_cache_size(req.max_cache_size);
        LimitsResponse {
            max_size: cache.max_cache_size(),
            current_size: cache.current_size(),
        }
    })
    .await?;
    Ok(Json(response))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
