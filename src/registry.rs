// src/registry.rs

//! Alias-keyed backend registry.
//!
//! Maps a string alias to one lazily-constructed, cached backend
//! instance. The surrounding application configures its aliases once at
//! startup and hands the registry to everything that needs a channel
//! layer; all callers asking for the same alias share one instance.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::{create_backend, BackendPtr, ChannelConfig, Error, Result};

/// Lazily-instantiating registry of named backend configurations.
///
/// Construction failures (unknown alias, bad parameters, disabled
/// features) surface as [`Error::Configuration`]; a failed construction
/// is not cached, so a later call retries it.
pub struct BackendRegistry {
    // ---
    configs: HashMap<String, ChannelConfig>,
    instances: Mutex<HashMap<String, BackendPtr>>,
}

impl BackendRegistry {
    /// Create a registry from an alias → configuration mapping.
    pub fn new(configs: HashMap<String, ChannelConfig>) -> Self {
        Self {
            configs,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Return the backend for `alias`, constructing it on first use.
    pub async fn get(&self, alias: &str) -> Result<BackendPtr> {
        // ---
        let mut instances = self.instances.lock().await;

        if let Some(backend) = instances.get(alias) {
            return Ok(backend.clone());
        }

        let config = self.configs.get(alias).ok_or_else(|| {
            Error::Configuration(format!("unknown channel backend alias: {alias}"))
        })?;

        let backend = create_backend(config).await?;
        instances.insert(alias.to_string(), backend.clone());

        Ok(backend)
    }

    /// Aliases this registry knows about, in no particular order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }
}
