//! Runtime for Unibase
//!
//! This crate provides the backend connectors, the connector registry, the
//! retry policy, and the generic query executor.

pub mod cancel;
pub mod connectors;
pub mod executor;
pub mod retry;

pub use cancel::{with_cancel, with_timeout};
pub use connectors::{Connector, ConnectorRegistry, Isolation, Transaction};
pub use executor::QueryExecutor;
pub use retry::{execute_with_retry, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
