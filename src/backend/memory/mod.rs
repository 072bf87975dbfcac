//! In-process channel backend.

mod backend;

pub use backend::create_backend;
