//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cleanup_handler, clear_all_handler, clear_namespace_handler, decrement_handler,
    delete_handler, exists_handler, get_handler, health_handler, increment_handler,
    limits_handler, reset_stats_handler, set_handler, size_handler, stats_handler, ttl_handler,
    AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /cache/:namespace/:key` - Store a value
/// - `GET /cache/:namespace/:key` - Retrieve a value
/// - `DELETE /cache/:namespace/:key` - Delete a value
/// - `GET /cache/:namespace/:key/exists` - Check for a live entry
/// - `GET /cache/:namespace/:key/ttl` - Seconds until expiry
/// - `POST /cache/:namespace/:key/incr` - Add to a counter
/// - `POST /cache/:namespace/:key/decr` - Subtract from a counter
/// - `DELETE /cache/:namespace` - Clear one namespace
/// - `DELETE /cache` - Clear everything
/// - `POST /cleanup` - Remove expired entries now
/// - `GET /stats` - Statistics and directory scan
/// - `POST /stats/reset` - Zero the counters
/// - `GET /size` - Bytes on disk
/// - `PUT /limits` - Change the size ceiling
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
/// - Concurrency limit: at most `state.max_concurrency` requests in flight,
///   shared by every route
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let max_concurrency = state.max_concurrency;

    Router::new()
        .route("/cache", delete(clear_all_handler))
        .route("/cache/:namespace", delete(clear_namespace_handler))
        .route(
            "/cache/:namespace/:key",
            put(set_handler).get(get_handler).delete(delete_handler),
        )
        .route("/cache/:namespace/:key/exists", get(exists_handler))
        .route("/cache/:namespace/:key/ttl", get(ttl_handler))
        .route("/cache/:namespace/:key/incr", post(increment_handler))
        .route("/cache/:namespace/:key/decr", post(decrement_handler))
        .route("/cleanup", post(cleanup_handler))
        .route("/stats", get(stats_handler))
        .route("/stats/reset", post(reset_stats_handler))
        .route("/size", get(size_handler))
        .route("/limits", put(limits_handler))
        .route("/health", get(health_handler))
        .layer(GlobalConcurrencyLimitLayer::new(max_concurrency))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
