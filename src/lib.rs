//! Pluggable channel layer: named point-to-point FIFO queues and named
//! broadcast groups with per-member expiry.
//!
//! This library provides one narrow contract — [`ChannelBackend`] — and
//! three interchangeable implementations behind it: an in-process store,
//! a durable SQLite-backed store, and a remote Redis-backed store. A
//! producer and its consumers must agree on one backend instance; the
//! layer itself is purely a transport and never inspects message bodies.
//!

// Import all sub modules once...
mod backend;
mod config;
mod domain;
mod registry;

mod error;
mod macros;

// Not every backend combination exercises every level.
#[allow(unused_imports)]
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use config::{BackendKind, ChannelConfig, DEFAULT_EXPIRY_SECS};
pub use error::{Error, Result};
pub use registry::BackendRegistry;

pub use backend::create_memory_backend;

#[cfg(feature = "backend_database")]
pub use backend::create_database_backend;

#[cfg(feature = "backend_redis")]
pub use backend::create_redis_backend;

// --- public re-exports
pub use domain::{
    //
    BackendPtr,
    ChannelBackend,
    ChannelLocking,
    Message,
};

/// Construct the backend selected by `config`.
///
/// Selecting a backend whose feature was compiled out is a
/// [`Error::Configuration`] failure, distinguishable from transient
/// store unavailability.
pub async fn create_backend(config: &ChannelConfig) -> Result<BackendPtr> {
    // ---
    match config.backend {
        BackendKind::Memory => create_memory_backend(config).await,

        #[cfg(feature = "backend_database")]
        BackendKind::Database => create_database_backend(config).await,

        #[cfg(not(feature = "backend_database"))]
        BackendKind::Database => Err(Error::Configuration(
            "database backend not enabled; rebuild with the `backend_database` feature"
                .to_string(),
        )),

        #[cfg(feature = "backend_redis")]
        BackendKind::Redis => create_redis_backend(config).await,

        #[cfg(not(feature = "backend_redis"))]
        BackendKind::Redis => Err(Error::Configuration(
            "redis backend not enabled; rebuild with the `backend_redis` feature".to_string(),
        )),
    }
}
