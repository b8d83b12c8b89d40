//! Query command implementation

use clap::Args;
use std::sync::Arc;
use tracing::{info, warn};
use unibase_core::{GenericQuery, UnibaseError};
use unibase_parser::parse_file;
use unibase_runtime::{ConnectorRegistry, QueryExecutor};
use unibase_types::QueryResponse;

use super::interrupt_token;

/// Query command arguments
#[derive(Args, Debug)]
pub struct QueryCommand {
    /// Name of the connector to run against
    pub connector: String,

    /// Generic query as JSON, or `@path` to read it from a file
    pub query: String,
}

impl QueryCommand {
    /// Execute the query command
    pub async fn execute(&self, config_path: &str) -> Result<(), UnibaseError> {
        let query = GenericQuery::from_json(&self.load_query()?)?;
        let model = parse_file(config_path)?;
        let config = model.find_connector(&self.connector).cloned().ok_or_else(|| {
            UnibaseError::not_found(format!(
                "connector '{}' is not configured in {}",
                self.connector, config_path
            ))
        })?;

        let cancel = interrupt_token();
        let registry = Arc::new(ConnectorRegistry::new());
        registry.add(&self.connector, config).await?;
        registry.connect_all(&cancel).await?;

        info!(connector = %self.connector, operation = %query.operation(), "running query");
        let executor = QueryExecutor::new(registry.clone());
        let outcome = executor.execute(&self.connector, &query, &cancel).await;

        if let Err(e) = registry.close_all().await {
            warn!(error = %e, "closing connector failed");
        }

        let response = match &outcome {
            Ok(rows) => QueryResponse::success(rows.clone()),
            Err(e) => QueryResponse::error(e.sanitized_message()),
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        outcome.map(|_| ())
    }

    fn load_query(&self) -> Result<String, UnibaseError> {
        match self.query.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| UnibaseError::from(e).with_context("path", path)),
            None => Ok(self.query.clone()),
        }
    }
}
