use thiserror::Error;

/// Errors that can occur during channel-layer operations
#[derive(Error, Debug)]
pub enum Error {
    /// Caller passed an argument the operation cannot work with
    /// (e.g. `receive_many` with an empty channel set)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backend construction failed: bad selector, missing parameters,
    /// or a backend whose feature was compiled out
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The underlying store is temporarily unreachable or rejected the
    /// operation. Propagated to the caller; the channel layer has no
    /// retry policy of its own beyond the blocking-receive loop.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// JSON serialization or deserialization of a message body failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for channel-layer operations
pub type Result<T> = std::result::Result<T, Error>;
