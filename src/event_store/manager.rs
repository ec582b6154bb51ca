//! Named registry of event store clients.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use super::{create_client, EventStoreClient, Result};
use crate::config::EventStoreConfig;

/// A configured event store with its client.
#[derive(Clone)]
pub struct RegisteredStore {
    pub config: EventStoreConfig,
    pub client: Arc<dyn EventStoreClient>,
}

/// Event stores addressable by name.
///
/// Clients are created from configuration but not connected; callers
/// `init` them on first use.
#[derive(Default, Clone)]
pub struct EventStoreManager {
    stores: HashMap<String, RegisteredStore>,
}

impl EventStoreManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one client per configured store.
    pub fn from_config(configs: &[EventStoreConfig]) -> Result<Self> {
        let mut manager = Self::new();
        for config in configs {
            let client = create_client(config)?;
            info!(
                store = %config.name,
                store_type = ?config.store_type,
                "Registered event store"
            );
            manager = manager.with_store(config.clone(), client);
        }
        Ok(manager)
    }

    /// Register a store under `config.name`, replacing any previous one.
    pub fn with_store(mut self, config: EventStoreConfig, client: Arc<dyn EventStoreClient>) -> Self {
        self.stores
            .insert(config.name.clone(), RegisteredStore { config, client });
        self
    }

    pub fn get_client(&self, name: &str) -> Option<&RegisteredStore> {
        self.stores.get(name)
    }

    /// Registered store names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// Destroy every client. Failures are logged and do not stop the sweep.
    pub async fn destroy_all(&self) {
        for (name, store) in &self.stores {
            if let Err(e) = store.client.destroy().await {
                error!(store = %name, error = %e, "Failed to destroy event store client");
            }
        }
    }
}
