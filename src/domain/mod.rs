// src/domain/mod.rs

//! Domain-level abstractions shared by all backends.

mod backend;

pub use backend::{BackendPtr, ChannelBackend, ChannelLocking, Message};

pub(crate) use backend::{ensure_channels, now_ms, EXPIRY_GRACE_SECS};
