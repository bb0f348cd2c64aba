//! API Module
//!
//! HTTP handlers and routing for the cache server REST API. Entries are
//! addressed as `/cache/:namespace/:key`; see [`create_router`] for the full
//! endpoint list.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
