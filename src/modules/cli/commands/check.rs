//! Check command implementation

use clap::Args;
use std::time::Duration;
use tracing::{info, warn};
use unibase_core::{Model, UnibaseError};
use unibase_parser::parse_file;
use unibase_runtime::{with_timeout, ConnectorRegistry};
use unibase_types::ConnectorStatus;

use super::interrupt_token;

/// Check command arguments
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Give up connecting after this many seconds
    #[arg(short, long, default_value_t = 30)]
    pub timeout: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl CheckCommand {
    /// Execute the check command
    pub async fn execute(&self, config_path: &str) -> Result<(), UnibaseError> {
        info!("Loading configuration from: {}", config_path);
        let model = parse_file(config_path)?;
        let cancel = interrupt_token();

        let registry = ConnectorRegistry::new();
        for (name, config) in &model.connectors {
            registry.add(name, config.clone()).await?;
        }

        let connected = with_timeout(
            Duration::from_secs(self.timeout),
            "connect",
            registry.connect_all(&cancel),
        )
        .await;
        if let Err(e) = &connected {
            warn!(error = %e, "not every connector could connect");
        }

        let statuses = registry.ping_all(&cancel).await;
        if let Err(e) = registry.close_all().await {
            warn!(error = %e, "closing connectors failed");
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&statuses)?);
        } else {
            print!("{}", render_table(&model, &statuses));
        }

        let unhealthy = statuses.iter().filter(|s| !s.healthy).count();
        match (connected, unhealthy) {
            (Ok(()), 0) => Ok(()),
            (Err(e), _) => Err(e),
            (Ok(()), n) => Err(UnibaseError::connection(format!(
                "{} of {} connectors unhealthy",
                n,
                statuses.len()
            ))),
        }
    }
}

/// Plain-text status report, one row per connector
fn render_table(model: &Model, statuses: &[ConnectorStatus]) -> String {
    let name_width = statuses
        .iter()
        .map(|s| s.name.len())
        .chain(std::iter::once("CONNECTOR".len()))
        .max()
        .unwrap_or(0);

    let mut out = format!("{}\n", model.name);
    out.push_str(&format!(
        "{:<width$}  {:<8}  {:<9}  {}\n",
        "CONNECTOR",
        "KIND",
        "STATUS",
        "DETAIL",
        width = name_width
    ));
    for status in statuses {
        out.push_str(&format!(
            "{:<width$}  {:<8}  {:<9}  {}\n",
            status.name,
            status.kind,
            if status.healthy { "healthy" } else { "unhealthy" },
            status.detail.as_deref().unwrap_or(""),
            width = name_width
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use unibase_core::ErrorKind;

    #[test]
    fn test_render_table() {
        let statuses = vec![
            ConnectorStatus {
                name: "exports".to_string(),
                kind: "file".to_string(),
                healthy: true,
                detail: None,
            },
            ConnectorStatus {
                name: "main-database".to_string(),
                kind: "sql".to_string(),
                healthy: false,
                detail: Some("not connected".to_string()),
            },
        ];
        let table = render_table(&Model::new("shop"), &statuses);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "shop");
        assert!(lines[1].starts_with("CONNECTOR    "));
        assert!(lines[2].starts_with("exports        file      healthy"));
        assert!(lines[3].contains("unhealthy  not connected"));
    }

    #[tokio::test]
    async fn test_check_file_connector() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("unibase.yaml");
        fs::write(
            &config,
            format!(
                "name: local\nconnectors:\n  files:\n    kind: file\n    base_path: {}\n",
                dir.path().display()
            ),
        )
        .unwrap();

        let cmd = CheckCommand {
            timeout: 5,
            json: true,
        };
        cmd.execute(config.to_str().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_check_reports_failure() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("unibase.yaml");
        fs::write(
            &config,
            format!(
                "connectors:\n  files:\n    kind: file\n    base_path: {}\n",
                dir.path().join("missing").display()
            ),
        )
        .unwrap();

        let cmd = CheckCommand {
            timeout: 5,
            json: false,
        };
        let err = cmd.execute(config.to_str().unwrap()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.context_value("connector"), Some("files"));
    }
}
