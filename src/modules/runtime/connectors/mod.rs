//! Backend connectors for Unibase
//!
//! One implementation of [`Connector`] per backend kind: SQL (PostgreSQL,
//! MySQL, SQLite), MongoDB documents, Redis cache, flat files and remote
//! HTTP/WebSocket APIs. [`ConnectorRegistry`] holds them by name.

mod api;
mod file;
mod manager;
mod mongodb;
mod redis;
mod slot;
mod sql;
mod traits;

pub use api::{ApiConnector, FrameSink, FrameSource, StreamDialer, WebSocketDialer};
pub use file::FileConnector;
pub use manager::{create_connector, ConnectorRegistry};
pub use mongodb::MongoConnector;
pub use redis::RedisConnector;
pub use slot::{is_lifecycle_error, HandleSlot};
pub use sql::SqlConnector;
pub use traits::{Connector, Isolation, Transaction};

use unibase_core::{ConnectorConfig, Result, UnibaseError};
use unibase_types::ConnectorKind;

/// Refuse to build a connector from a configuration of another kind
pub(crate) fn expect_kind(config: &ConnectorConfig, kind: ConnectorKind) -> Result<()> {
    if config.kind == kind {
        Ok(())
    } else {
        Err(UnibaseError::configuration(format!(
            "expected a {} connector configuration, got {}",
            kind, config.kind
        )))
    }
}
