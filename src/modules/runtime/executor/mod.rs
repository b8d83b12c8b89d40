//! Generic query execution
//!
//! A [`GenericQuery`] is translated into the native call shape of the target
//! connector's kind (a [`Plan`]), then run as a `query` or an `execute`.
//! Translation never touches the backend; a bad query fails before any I/O.

mod api;
mod cache;
mod document;
mod file;
mod sql;

pub use file::RowFilter;

use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use unibase_core::{GenericQuery, Result};
use unibase_types::{affected_record, ConnectorKind, Records};

use crate::connectors::{is_lifecycle_error, Connector, ConnectorRegistry, Transaction};
use crate::retry::{execute_with_retry, RetryPolicy};

/// Which connector method a plan runs through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Query,
    Execute,
}

/// A query translated for one backend kind
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub call: Call,
    pub statement: String,
    pub args: Vec<Value>,
    /// In-memory filtering applied to the rows a read returns
    pub filter: Option<RowFilter>,
}

impl Plan {
    pub(crate) fn query(statement: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            call: Call::Query,
            statement: statement.into(),
            args,
            filter: None,
        }
    }

    pub(crate) fn execute(statement: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            call: Call::Execute,
            statement: statement.into(),
            args,
            filter: None,
        }
    }

    fn finish(&self, rows: Records) -> Records {
        match &self.filter {
            Some(filter) => filter.apply(rows),
            None => rows,
        }
    }
}

/// Translate `query` into the native shape of a `kind` connector
pub fn translate(kind: ConnectorKind, query: &GenericQuery) -> Result<Plan> {
    match kind {
        ConnectorKind::Sql => sql::translate(query),
        ConnectorKind::Document => document::translate(query),
        ConnectorKind::Cache => cache::translate(query),
        ConnectorKind::File => file::translate(query),
        ConnectorKind::Api => api::translate(query),
    }
}

/// Runs generic queries against registered connectors
pub struct QueryExecutor {
    registry: Arc<ConnectorRegistry>,
    retry: RetryPolicy,
}

impl QueryExecutor {
    pub fn new(registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            registry,
            retry: RetryPolicy::default().never_retry_on(is_lifecycle_error),
        }
    }

    /// Policy applied to reads on backends that do not retry on their own.
    ///
    /// Reads on an unconnected or closed connector are never retried.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy.never_retry_on(is_lifecycle_error);
        self
    }

    /// Execute a query on the connector registered as `name`
    pub async fn execute(
        &self,
        name: &str,
        query: &GenericQuery,
        cancel: &CancellationToken,
    ) -> Result<Records> {
        let connector = self.registry.get(name).await?;
        self.execute_on(connector.as_ref(), query, cancel)
            .await
            .map_err(|e| e.with_context("connector", name))
    }

    /// Execute a query directly on `connector`, dispatching on its kind
    pub async fn execute_on(
        &self,
        connector: &dyn Connector,
        query: &GenericQuery,
        cancel: &CancellationToken,
    ) -> Result<Records> {
        let kind = connector.kind();
        let plan = translate(kind, query)?;
        debug!(kind = %kind, operation = %query.operation(), statement = %plan.statement, "executing plan");

        match plan.call {
            // API request mode retries inside the connector
            Call::Query if kind == ConnectorKind::Api => {
                let rows = connector.query(cancel, &plan.statement, &plan.args).await?;
                Ok(plan.finish(rows))
            }
            Call::Query => {
                let rows = execute_with_retry(
                    || connector.query(cancel, &plan.statement, &plan.args),
                    &self.retry,
                    cancel,
                )
                .await?;
                Ok(plan.finish(rows))
            }
            Call::Execute => {
                let affected = connector.execute(cancel, &plan.statement, &plan.args).await?;
                Ok(affected_record(affected))
            }
        }
    }

    /// Execute a query inside an open transaction scope of a `kind` connector
    pub async fn execute_in(
        &self,
        tx: &mut dyn Transaction,
        kind: ConnectorKind,
        query: &GenericQuery,
        cancel: &CancellationToken,
    ) -> Result<Records> {
        let plan = translate(kind, query)?;
        match plan.call {
            Call::Query => {
                let rows = tx.query(cancel, &plan.statement, &plan.args).await?;
                Ok(plan.finish(rows))
            }
            Call::Execute => {
                let affected = tx.execute(cancel, &plan.statement, &plan.args).await?;
                Ok(affected_record(affected))
            }
        }
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }
}
