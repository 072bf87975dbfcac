//! Durable-store channel backend (SQLite).

mod backend;

pub use backend::create_backend;
