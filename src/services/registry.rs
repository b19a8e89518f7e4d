use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::FrameConfig;
use crate::error::FrameError;
use crate::models::ConnectorDescriptor;
use crate::services::database::{
    create_backend, ConnectorBackend, DriverConnection, PoolStatus,
};

/// A registered connector: immutable descriptor plus the live backend that
/// owns its pool
pub struct RegisteredConnector {
    descriptor: ConnectorDescriptor,
    backend: Arc<dyn ConnectorBackend>,
}

impl std::fmt::Debug for RegisteredConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredConnector")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl RegisteredConnector {
    pub fn descriptor(&self) -> &ConnectorDescriptor {
        &self.descriptor
    }

    pub fn backend(&self) -> Arc<dyn ConnectorBackend> {
        Arc::clone(&self.backend)
    }
}

/// Connector registry that maintains every configured data source keyed by
/// logical name. Names are unique; registration of a duplicate fails.
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<String, Arc<RegisteredConnector>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: RwLock::new(HashMap::new()),
        }
    }

    /// Build a registry from the configuration's connector declarations.
    pub async fn from_config(config: &FrameConfig) -> Result<Self, FrameError> {
        let registry = Self::new();
        for descriptor in config.descriptors()? {
            registry.register(descriptor).await?;
        }
        Ok(registry)
    }

    /// Register a connector and build its pool. Fails with
    /// `DuplicateConnector` when the name is already taken.
    pub async fn register(&self, descriptor: ConnectorDescriptor) -> Result<(), FrameError> {
        let mut connectors = self.connectors.write().await;
        if connectors.contains_key(&descriptor.name) {
            return Err(FrameError::DuplicateConnector(descriptor.name.clone()));
        }

        tracing::info!(
            "Registering connector '{}' ({}, {})",
            descriptor.name,
            descriptor.driver.as_str(),
            descriptor.mode.as_str()
        );

        let backend = create_backend(descriptor.clone())?;
        connectors.insert(
            descriptor.name.clone(),
            Arc::new(RegisteredConnector {
                descriptor,
                backend,
            }),
        );
        Ok(())
    }

    /// Look a connector up by name, failing with `UnknownConnector` when
    /// absent.
    pub async fn resolve(&self, name: &str) -> Result<Arc<RegisteredConnector>, FrameError> {
        let connectors = self.connectors.read().await;
        connectors
            .get(name)
            .cloned()
            .ok_or_else(|| FrameError::UnknownConnector(name.to_string()))
    }

    /// Take a scoped connection from a connector's pool. The handle returns
    /// to the pool when dropped, on every exit path.
    pub async fn acquire(&self, name: &str) -> Result<DriverConnection, FrameError> {
        let connector = self.resolve(name).await?;
        connector.backend.acquire().await
    }

    /// Remove a connector and tear its pool down. Returns false when the
    /// name was not registered.
    pub async fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut connectors = self.connectors.write().await;
            connectors.remove(name)
        };
        match removed {
            Some(connector) => {
                tracing::info!("Removing connector '{}'", name);
                connector.backend.shutdown().await;
                true
            }
            None => false,
        }
    }

    /// Number of registered connectors.
    pub async fn connector_count(&self) -> usize {
        self.connectors.read().await.len()
    }

    /// Registered connector names.
    pub async fn names(&self) -> Vec<String> {
        self.connectors.read().await.keys().cloned().collect()
    }

    /// Pool status of one connector.
    pub async fn status(&self, name: &str) -> Option<PoolStatus> {
        let connectors = self.connectors.read().await;
        connectors.get(name).map(|c| c.backend.status())
    }

    /// Tear down every pool, for process shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<RegisteredConnector>> = {
            let mut connectors = self.connectors.write().await;
            connectors.drain().map(|(_, c)| c).collect()
        };
        for connector in drained {
            connector.backend.shutdown().await;
        }
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
