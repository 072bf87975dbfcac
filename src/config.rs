//! Public, backend-agnostic channel-layer configuration.
//!
//! This type intentionally contains no live connection state. Backend
//! constructors are responsible for interpreting this config into
//! concrete pools and connections.

/// Default message / group-membership TTL in seconds.
pub const DEFAULT_EXPIRY_SECS: i64 = 60;

const DEFAULT_PREFIX: &str = "channels:";
const DEFAULT_TABLE: &str = "channel_messages";

/// Selector for which backend implementation a config describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process queues; local, non-durable, single-runtime-instance only.
    Memory,

    /// Durable relational-style store (SQLite). Cross-process-safe,
    /// relatively low throughput.
    Database,

    /// Remote shared key-value store (Redis). Real blocking receive and
    /// cross-process groups.
    Redis,
}

/// Channel backend configuration and connection parameters.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Which backend implementation to construct.
    pub backend: BackendKind,

    /// Message and group-membership TTL in whole seconds.
    ///
    /// Zero or negative values are legal and mean "already expired";
    /// such messages are never delivered.
    pub expiry_secs: i64,

    /// Store URI for the Redis backend (e.g. `"redis://localhost:6379"`).
    pub uri: Option<String>,

    /// Key prefix under which all Redis backend state is namespaced.
    pub prefix: String,

    /// Database path for the SQLite backend (`":memory:"` for in-memory).
    pub database_path: Option<String>,

    /// Message table name for the SQLite backend. The group-membership
    /// table derives its name from this (`<table>_groups`).
    pub table: String,
}

impl ChannelConfig {
    /// Create an in-process backend config.
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            expiry_secs: DEFAULT_EXPIRY_SECS,
            uri: None,
            prefix: DEFAULT_PREFIX.to_string(),
            database_path: None,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Create a durable-store backend config for the given SQLite path.
    pub fn database(path: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Database,
            database_path: Some(path.into()),
            ..Self::memory()
        }
    }

    /// Create a remote-store backend config for the given Redis URI.
    pub fn redis(uri: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Redis,
            uri: Some(uri.into()),
            ..Self::memory()
        }
    }

    /// Set the message / group-membership TTL in seconds.
    pub fn with_expiry_secs(mut self, secs: i64) -> Self {
        self.expiry_secs = secs;
        self
    }

    /// Set the Redis key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the SQLite message table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_memory_defaults() {
        // ---
        let config = ChannelConfig::memory();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.expiry_secs, DEFAULT_EXPIRY_SECS);
        assert_eq!(config.prefix, "channels:");
        assert_eq!(config.table, "channel_messages");
    }

    #[test]
    fn test_builder_overrides() {
        // ---
        let config = ChannelConfig::redis("redis://localhost:6379")
            .with_expiry_secs(5)
            .with_prefix("test:");
        assert_eq!(config.backend, BackendKind::Redis);
        assert_eq!(config.expiry_secs, 5);
        assert_eq!(config.prefix, "test:");
        assert_eq!(config.uri.as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn test_database_path() {
        // ---
        let config = ChannelConfig::database(":memory:").with_table("msgs");
        assert_eq!(config.backend, BackendKind::Database);
        assert_eq!(config.database_path.as_deref(), Some(":memory:"));
        assert_eq!(config.table, "msgs");
    }
}
