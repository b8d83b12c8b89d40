//! Connector and transaction trait definitions

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tokio_util::sync::CancellationToken;
use unibase_core::{Result, UnibaseError};
use unibase_types::{ConnectorKind, Records};

/// How strong the guarantees of a backend's transaction scope are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Native ACID transaction (SQL)
    Acid,
    /// Best-effort multi-document session; aborts as a whole on failure
    Session,
    /// Queued command batch flushed atomically, with no read isolation
    Batch,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Acid => write!(f, "acid"),
            Isolation::Session => write!(f, "session"),
            Isolation::Batch => write!(f, "batch"),
        }
    }
}

/// Trait for data backends
///
/// All connectors implement this trait to provide a unified interface
/// over SQL databases, document stores, caches, files and remote APIs.
/// What `statement` and `args` mean is backend-specific; the
/// [`QueryExecutor`](crate::QueryExecutor) produces them from a
/// [`GenericQuery`](unibase_core::GenericQuery).
#[async_trait]
pub trait Connector: Send + Sync {
    /// The backend family this connector belongs to
    fn kind(&self) -> ConnectorKind;

    /// Open the backend handle; a no-op when already connected
    async fn connect(&self, cancel: &CancellationToken) -> Result<()>;

    /// Release the backend handle. Terminal: every later call fails.
    async fn close(&self) -> Result<()>;

    /// Run a read and return the resulting records
    async fn query(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<Records>;

    /// Run a mutation and return the number of affected items
    async fn execute(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<u64>;

    /// Check that the backend is reachable
    async fn ping(&self, cancel: &CancellationToken) -> Result<()>;

    /// Open a transaction scope
    async fn begin_transaction(&self, cancel: &CancellationToken) -> Result<Box<dyn Transaction>> {
        let _ = cancel;
        Err(UnibaseError::unsupported(format!(
            "{} connector does not support transactions",
            self.kind()
        )))
    }
}

/// A bounded unit of work opened by [`Connector::begin_transaction`]
///
/// `commit` and `rollback` consume the scope, so exactly one of them runs.
/// Dropping a scope without either discards its work.
#[async_trait]
pub trait Transaction: Send {
    fn isolation(&self) -> Isolation;

    async fn query(
        &mut self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<Records>;

    async fn execute(
        &mut self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<u64>;

    async fn commit(self: Box<Self>, cancel: &CancellationToken) -> Result<()>;

    async fn rollback(self: Box<Self>, cancel: &CancellationToken) -> Result<()>;
}
