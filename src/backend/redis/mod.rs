//! Remote-store channel backend (Redis).

mod backend;

pub use backend::create_backend;
