//! Connector configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use unibase_types::ConnectorKind;

use super::PoolConfig;
use crate::error::{Result, UnibaseError};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default capacity of the streaming message buffer
const DEFAULT_WEBSOCKET_BUFFER: usize = 100;

/// Option key selecting the SQL driver
pub const DRIVER_OPTION: &str = "driver";

/// Option key naming the path re-issued by a polling API connector
pub const POLL_PATH_OPTION: &str = "poll_path";

/// Configuration for a single connector
///
/// Immutable once handed to a connector constructor; the constructor calls
/// [`ConnectorConfig::validate`] and refuses to build on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Backend kind
    pub kind: ConnectorKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database / namespace (SQLite: file path or `:memory:`; Redis: DB index)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Pool limits
    #[serde(default)]
    pub pool: PoolConfig,

    /// Root directory for the file backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,

    /// Root URL for the API backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Hold one persistent streaming connection instead of issuing requests
    #[serde(default)]
    pub streaming: bool,

    /// Re-issue the poll query every N seconds (API backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_secs: Option<u64>,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Capacity of the inbound streaming buffer (default: 100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub websocket_buffer_size: Option<usize>,

    /// Backend-specific options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// SQL drivers available to the relational backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDriver {
    Postgres,
    Mysql,
    Sqlite,
}

impl FromStr for SqlDriver {
    type Err = UnibaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(SqlDriver::Postgres),
            "mysql" => Ok(SqlDriver::Mysql),
            "sqlite" => Ok(SqlDriver::Sqlite),
            other => Err(UnibaseError::configuration(format!(
                "unsupported SQL driver: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SqlDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDriver::Postgres => write!(f, "postgres"),
            SqlDriver::Mysql => write!(f, "mysql"),
            SqlDriver::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// How an API connector talks to its backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMode {
    /// One HTTP call per query/execute
    Request,
    /// One persistent WebSocket feeding a buffer
    Stream,
    /// Request mode plus a background timer re-issuing a fixed query
    Poll(Duration),
}

impl ConnectorConfig {
    /// Create a configuration of the given kind with every other field empty
    pub fn new(kind: ConnectorKind) -> Self {
        Self {
            kind,
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            pool: PoolConfig::default(),
            base_path: None,
            base_url: None,
            streaming: false,
            polling_interval_secs: None,
            timeout_secs: None,
            websocket_buffer_size: None,
            options: BTreeMap::new(),
        }
    }

    /// Create a configuration from a kind name, rejecting unknown kinds
    pub fn for_kind(kind: &str) -> Result<Self> {
        let kind = kind
            .parse::<ConnectorKind>()
            .map_err(UnibaseError::configuration)?;
        Ok(Self::new(kind))
    }

    /// Builder helper for backend options
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Look up a backend option
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Request timeout with default fallback
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Streaming buffer capacity with default fallback
    pub fn buffer_size(&self) -> usize {
        self.websocket_buffer_size
            .unwrap_or(DEFAULT_WEBSOCKET_BUFFER)
            .max(1)
    }

    /// SQL driver named by the `driver` option (default: postgres)
    pub fn sql_driver(&self) -> Result<SqlDriver> {
        self.option(DRIVER_OPTION).unwrap_or("postgres").parse()
    }

    /// API interaction mode derived from `streaming` and `polling_interval_secs`
    pub fn api_mode(&self) -> ApiMode {
        match (self.streaming, self.polling_interval_secs) {
            (true, _) => ApiMode::Stream,
            (false, Some(secs)) if secs > 0 => ApiMode::Poll(Duration::from_secs(secs)),
            _ => ApiMode::Request,
        }
    }

    /// Check that every field required by `kind` is present and coherent
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            ConnectorKind::Sql => self.validate_sql(),
            ConnectorKind::Document => self.require_host().map(|_| ()),
            ConnectorKind::Cache => self.validate_cache(),
            ConnectorKind::File => match &self.base_path {
                Some(path) if !path.as_os_str().is_empty() => Ok(()),
                _ => Err(self.missing("base_path")),
            },
            ConnectorKind::Api => self.validate_api(),
        }
    }

    /// Host, failing with a configuration error when absent
    pub fn require_host(&self) -> Result<&str> {
        match self.host.as_deref() {
            Some(host) if !host.trim().is_empty() => Ok(host),
            _ => Err(self.missing("host")),
        }
    }

    /// Database name, failing with a configuration error when absent
    pub fn require_database(&self) -> Result<&str> {
        match self.database.as_deref() {
            Some(db) if !db.trim().is_empty() => Ok(db),
            _ => Err(self.missing("database")),
        }
    }

    /// Base URL, failing with a configuration error when absent
    pub fn require_base_url(&self) -> Result<&str> {
        match self.base_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(self.missing("base_url")),
        }
    }

    fn validate_sql(&self) -> Result<()> {
        match self.sql_driver()? {
            SqlDriver::Sqlite => self.require_database().map(|_| ()),
            SqlDriver::Postgres | SqlDriver::Mysql => {
                self.require_host()?;
                self.require_database().map(|_| ())
            }
        }
    }

    fn validate_cache(&self) -> Result<()> {
        self.require_host()?;
        if let Some(db) = self.database.as_deref() {
            db.parse::<u32>().map_err(|_| {
                UnibaseError::configuration(format!(
                    "cache database must be a numeric index, got '{}'",
                    db
                ))
            })?;
        }
        Ok(())
    }

    fn validate_api(&self) -> Result<()> {
        let url = self.require_base_url()?;
        if self.streaming && self.polling_interval_secs.is_some_and(|s| s > 0) {
            return Err(UnibaseError::configuration(
                "api connector cannot be both streaming and polling",
            ));
        }
        let schemes: &[&str] = if self.streaming {
            &["ws://", "wss://"]
        } else {
            &["http://", "https://"]
        };
        if !schemes.iter().any(|s| url.starts_with(s)) {
            return Err(UnibaseError::configuration(format!(
                "base_url '{}' must start with one of {}",
                url,
                schemes.join(", ")
            )));
        }
        Ok(())
    }

    fn missing(&self, field: &str) -> UnibaseError {
        UnibaseError::configuration(format!(
            "{} connector requires '{}'",
            self.kind, field
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn sql(driver: &str) -> ConnectorConfig {
        ConnectorConfig::new(ConnectorKind::Sql).with_option(DRIVER_OPTION, driver)
    }

    #[test]
    fn test_unknown_kind_is_configuration_error() {
        let err = ConnectorConfig::for_kind("cassandra").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("unsupported connector type: cassandra"));
    }

    #[test]
    fn test_sql_validation() {
        let mut config = sql("postgres");
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Configuration);

        config.host = Some("localhost".to_string());
        config.database = Some("app".to_string());
        assert!(config.validate().is_ok());

        let mut lite = sql("sqlite");
        lite.database = Some(":memory:".to_string());
        assert!(lite.validate().is_ok());

        let oracle = sql("oracle");
        assert!(oracle.validate().unwrap_err().to_string().contains("oracle"));
    }

    #[test]
    fn test_cache_database_must_be_numeric() {
        let mut config = ConnectorConfig::new(ConnectorKind::Cache);
        config.host = Some("localhost".to_string());
        config.database = Some("zero".to_string());
        assert!(config.validate().is_err());

        config.database = Some("2".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_requires_base_path() {
        let mut config = ConnectorConfig::new(ConnectorKind::File);
        assert!(config.validate().is_err());
        config.base_path = Some(PathBuf::from("/srv/data"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_modes_and_validation() {
        let mut config = ConnectorConfig::new(ConnectorKind::Api);
        config.base_url = Some("https://api.example.com".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.api_mode(), ApiMode::Request);

        config.polling_interval_secs = Some(5);
        assert_eq!(config.api_mode(), ApiMode::Poll(Duration::from_secs(5)));

        config.streaming = true;
        assert!(config.validate().is_err());

        config.polling_interval_secs = None;
        assert!(config.validate().is_err(), "http url is not a stream url");
        config.base_url = Some("wss://stream.example.com/feed".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.api_mode(), ApiMode::Stream);
    }

    #[test]
    fn test_config_serde_defaults() {
        let yaml = r#"
kind: redis
host: cache.internal
port: 6380
options:
  b: "2"
  a: "1"
"#;
        let config: ConnectorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.kind, ConnectorKind::Cache);
        assert_eq!(config.port, Some(6380));
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.buffer_size(), 100);
        let keys: Vec<&String> = config.options.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
