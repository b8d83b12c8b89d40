//! Flat-file connector: read-only JSON and CSV under a base directory

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use unibase_core::{ConnectorConfig, ErrorKind, Result, UnibaseError};
use unibase_types::{record_from_value, ConnectorKind, Record, Records};

use super::slot::HandleSlot;
use super::traits::Connector;
use crate::cancel::with_cancel;

/// Supported file formats, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Json,
    Csv,
}

impl FileFormat {
    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            Some(other) => Err(UnibaseError::unsupported(format!(
                "unsupported file format: .{}",
                other
            ))),
            None => Err(UnibaseError::unsupported(format!(
                "cannot determine file format of '{}'",
                path.display()
            ))),
        }
    }
}

/// File connector; the live handle is the resolved base directory
pub struct FileConnector {
    base_path: PathBuf,
    slot: HandleSlot<PathBuf>,
}

impl FileConnector {
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        super::expect_kind(&config, ConnectorKind::File)?;
        config.validate()?;
        let base_path = config
            .base_path
            .ok_or_else(|| UnibaseError::configuration("file connector requires 'base_path'"))?;

        Ok(Self {
            base_path,
            slot: HandleSlot::new(),
        })
    }
}

/// Join `relative` onto `base`, refusing absolute paths and `..` escapes
fn resolve(base: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative.trim());
    if relative.as_os_str().is_empty() {
        return Err(UnibaseError::query("file query requires a path"));
    }

    let mut resolved = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(UnibaseError::permission(format!(
                    "path '{}' escapes the base directory",
                    relative.display()
                )));
            }
        }
    }
    Ok(resolved)
}

fn parse_json(content: &[u8]) -> Result<Records> {
    let value: Value = serde_json::from_slice(content)
        .map_err(|e| UnibaseError::wrap(ErrorKind::Query, "malformed JSON file", e))?;
    let Value::Array(items) = value else {
        return Err(UnibaseError::query(
            "JSON file must contain a top-level array of objects",
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            record_from_value(item).ok_or_else(|| {
                UnibaseError::query(format!("JSON array element {} is not an object", i))
            })
        })
        .collect()
}

/// Header row names the fields; every value stays a string
fn parse_csv(content: &[u8]) -> Result<Records> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content);

    let headers = reader
        .headers()
        .map_err(|e| UnibaseError::wrap(ErrorKind::Query, "malformed CSV header", e))?
        .clone();

    let mut records = Records::new();
    for row in reader.records() {
        let row = row.map_err(|e| UnibaseError::wrap(ErrorKind::Query, "malformed CSV row", e))?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
            .collect();
        records.push(record);
    }
    Ok(records)
}

async fn read_records(path: PathBuf) -> Result<Records> {
    let format = FileFormat::from_path(&path)?;
    let content = tokio::fs::read(&path).await.map_err(|e| {
        UnibaseError::from(e).with_context("path", path.display())
    })?;
    match format {
        FileFormat::Json => parse_json(&content),
        FileFormat::Csv => parse_csv(&content),
    }
}

#[async_trait]
impl Connector for FileConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::File
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        self.slot
            .get_or_connect(|| async {
                let base = with_cancel(cancel, async {
                    tokio::fs::canonicalize(&self.base_path).await.map_err(|e| {
                        UnibaseError::from(e).with_context("base_path", self.base_path.display())
                    })
                })
                .await?;
                let meta = tokio::fs::metadata(&base).await?;
                if !meta.is_dir() {
                    return Err(UnibaseError::configuration(format!(
                        "base_path '{}' is not a directory",
                        base.display()
                    )));
                }
                info!(base_path = %base.display(), "file connector ready");
                Ok(base)
            })
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        self.slot.close().await;
        Ok(())
    }

    async fn query(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        _args: &[Value],
    ) -> Result<Records> {
        let base = self.slot.get().await?;
        let path = resolve(&base, statement)?;
        debug!(path = %path.display(), "file query");
        with_cancel(cancel, read_records(path)).await
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        _statement: &str,
        _args: &[Value],
    ) -> Result<u64> {
        Err(UnibaseError::unsupported(
            "file connector does not support mutations",
        ))
    }

    async fn ping(&self, _cancel: &CancellationToken) -> Result<()> {
        let base = self.slot.get().await?;
        let meta = tokio::fs::metadata(&base).await?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(UnibaseError::connection(format!(
                "base_path '{}' is no longer a directory",
                base.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    async fn connector_in(dir: &TempDir) -> FileConnector {
        let mut config = ConnectorConfig::new(ConnectorKind::File);
        config.base_path = Some(dir.path().to_path_buf());
        let connector = FileConnector::new(config).unwrap();
        connector.connect(&CancellationToken::new()).await.unwrap();
        connector
    }

    #[tokio::test]
    async fn test_csv_values_are_strings() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("people.csv"), "name,age\nAlice,30\nBob,40\n").unwrap();
        let connector = connector_in(&dir).await;

        let rows = connector
            .query(&CancellationToken::new(), "people.csv", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], json!("Alice"));
        assert_eq!(rows[0]["age"], json!("30"));
        assert_eq!(rows[1]["name"], json!("Bob"));
        assert_eq!(rows[1]["age"], json!("40"));
    }

    #[tokio::test]
    async fn test_json_array_of_objects() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(
            dir.path().join("data/items.json"),
            r#"[{"sku": "a", "qty": 2}, {"sku": "b", "qty": null}]"#,
        )
        .unwrap();
        let connector = connector_in(&dir).await;

        let rows = connector
            .query(&CancellationToken::new(), "./data/items.json", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["qty"], json!(2));
        assert_eq!(rows[1]["qty"], Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_content_is_query_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("object.json"), r#"{"not": "an array"}"#).unwrap();
        fs::write(dir.path().join("scalars.json"), "[1, 2]").unwrap();
        fs::write(dir.path().join("broken.json"), "[{").unwrap();
        fs::write(dir.path().join("ragged.csv"), "a,b\n1,2,3\n").unwrap();
        let connector = connector_in(&dir).await;
        let cancel = CancellationToken::new();

        for file in ["object.json", "scalars.json", "broken.json", "ragged.csv"] {
            let err = connector.query(&cancel, file, &[]).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Query, "{}", file);
        }
    }

    #[tokio::test]
    async fn test_path_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let connector = connector_in(&dir).await;
        let cancel = CancellationToken::new();

        let err = connector.query(&cancel, "missing.csv", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = connector.query(&cancel, "notes.txt", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let err = connector.query(&cancel, "../etc/passwd.csv", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);

        let err = connector.query(&cancel, "/etc/passwd.csv", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[tokio::test]
    async fn test_mutations_and_transactions_unsupported() {
        let dir = TempDir::new().unwrap();
        let connector = connector_in(&dir).await;
        let cancel = CancellationToken::new();

        let err = connector.execute(&cancel, "x.csv", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        let err = connector.begin_transaction(&cancel).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_connect_requires_existing_directory() {
        let dir = TempDir::new().unwrap();
        let mut config = ConnectorConfig::new(ConnectorKind::File);
        config.base_path = Some(dir.path().join("nope"));
        let connector = FileConnector::new(config).unwrap();

        let err = connector.connect(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        fs::write(dir.path().join("plain"), "").unwrap();
        let mut config = ConnectorConfig::new(ConnectorKind::File);
        config.base_path = Some(dir.path().join("plain"));
        let connector = FileConnector::new(config).unwrap();
        let err = connector.connect(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_closed_connector_rejects_queries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.csv"), "x\n1\n").unwrap();
        let connector = connector_in(&dir).await;
        connector.close().await.unwrap();

        let err = connector
            .query(&CancellationToken::new(), "a.csv", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
