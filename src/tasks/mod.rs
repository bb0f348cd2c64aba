//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expired cleanup: Removes expired cache files at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
