//! Connector registry for managing named connectors

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use unibase_core::{ConnectorConfig, Model, Result, UnibaseError};
use unibase_types::{ConnectorKind, ConnectorStatus};

use super::api::ApiConnector;
use super::file::FileConnector;
use super::mongodb::MongoConnector;
use super::redis::RedisConnector;
use super::sql::SqlConnector;
use super::traits::Connector;

/// Maximum number of pings in flight during [`ConnectorRegistry::ping_all`]
const PING_CONCURRENCY: usize = 16;

/// Build the connector matching `config.kind`
pub fn create_connector(config: ConnectorConfig) -> Result<Arc<dyn Connector>> {
    let connector: Arc<dyn Connector> = match config.kind {
        ConnectorKind::Sql => Arc::new(SqlConnector::new(config)?),
        ConnectorKind::Document => Arc::new(MongoConnector::new(config)?),
        ConnectorKind::Cache => Arc::new(RedisConnector::new(config)?),
        ConnectorKind::File => Arc::new(FileConnector::new(config)?),
        ConnectorKind::Api => Arc::new(ApiConnector::new(config)?),
    };
    Ok(connector)
}

/// Named, shared connectors
///
/// Lookups and the `*_all` walks take the read lock; `add`/`remove` take the
/// write lock. Iteration is in name order.
pub struct ConnectorRegistry {
    connectors: RwLock<BTreeMap<String, Arc<dyn Connector>>>,
}

impl ConnectorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            connectors: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a connector from `config` and register it under `name`
    pub async fn add(&self, name: &str, config: ConnectorConfig) -> Result<()> {
        let connector =
            create_connector(config).map_err(|e| e.with_context("connector", name))?;
        self.register(name, connector).await
    }

    /// Register an already-built connector
    pub async fn register(&self, name: &str, connector: Arc<dyn Connector>) -> Result<()> {
        let mut connectors = self.connectors.write().await;
        if connectors.contains_key(name) {
            return Err(UnibaseError::configuration(format!(
                "connector '{}' is already registered",
                name
            )));
        }
        connectors.insert(name.to_string(), connector);
        Ok(())
    }

    /// Get a connector by name
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Connector>> {
        let connectors = self.connectors.read().await;
        connectors
            .get(name)
            .cloned()
            .ok_or_else(|| UnibaseError::not_found(format!("connector '{}' not found", name)))
    }

    /// Drop the entry for `name` without closing it
    pub async fn remove(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.write().await.remove(name)
    }

    /// Check if a connector exists
    pub async fn has(&self, name: &str) -> bool {
        self.connectors.read().await.contains_key(name)
    }

    /// Names of all registered connectors, sorted
    pub async fn names(&self) -> Vec<String> {
        self.connectors.read().await.keys().cloned().collect()
    }

    /// Register every connector in `model`, then connect them all
    pub async fn initialize(&self, model: &Model, cancel: &CancellationToken) -> Result<()> {
        for (name, config) in &model.connectors {
            self.add(name, config.clone()).await?;
        }
        info!(model = %model.name, connectors = model.connectors.len(), "registry initialized");
        self.connect_all(cancel).await
    }

    /// Connect every connector, stopping at the first failure
    pub async fn connect_all(&self, cancel: &CancellationToken) -> Result<()> {
        let connectors = self.connectors.read().await;
        let mut succeeded = Vec::new();
        for (name, connector) in connectors.iter() {
            if let Err(e) = connector.connect(cancel).await {
                warn!(connector = %name, error = %e, "connect failed");
                return Err(fail_fast(e, name, &succeeded));
            }
            info!(connector = %name, kind = %connector.kind(), "connected");
            succeeded.push(name.as_str());
        }
        Ok(())
    }

    /// Close every connector, stopping at the first failure
    pub async fn close_all(&self) -> Result<()> {
        let connectors = self.connectors.read().await;
        let mut succeeded = Vec::new();
        for (name, connector) in connectors.iter() {
            if let Err(e) = connector.close().await {
                warn!(connector = %name, error = %e, "close failed");
                return Err(fail_fast(e, name, &succeeded));
            }
            succeeded.push(name.as_str());
        }
        Ok(())
    }

    /// Ping all connectors concurrently, reporting each one's health
    pub async fn ping_all(&self, cancel: &CancellationToken) -> Vec<ConnectorStatus> {
        let connectors = self.connectors.read().await;
        let snapshot: Vec<_> = connectors
            .iter()
            .map(|(name, connector)| (name.clone(), connector.clone()))
            .collect();
        drop(connectors);

        let mut statuses: Vec<ConnectorStatus> = stream::iter(snapshot)
            .map(|(name, connector)| async move {
                let result = connector.ping(cancel).await;
                ConnectorStatus {
                    name,
                    kind: connector.kind().to_string(),
                    healthy: result.is_ok(),
                    detail: result.err().map(|e| e.to_string()),
                }
            })
            .buffer_unordered(PING_CONCURRENCY)
            .collect()
            .await;

        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn fail_fast(err: UnibaseError, name: &str, succeeded: &[&str]) -> UnibaseError {
    err.with_context("connector", name)
        .with_context("succeeded", succeeded.join(","))
}
