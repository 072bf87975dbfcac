//! Backend implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `ChannelBackend` trait. Optional backends are hidden behind feature
//! flags and exposed only through constructor functions.
//!
//! Domain code must not depend on backend-specific types.

mod memory;

#[cfg(feature = "backend_database")]
mod database;

#[cfg(feature = "backend_redis")]
mod redis;

pub use memory::create_backend as create_memory_backend;

#[cfg(feature = "backend_database")]
pub use database::create_backend as create_database_backend;

#[cfg(feature = "backend_redis")]
pub use redis::create_backend as create_redis_backend;
