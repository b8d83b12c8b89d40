//! Redis cache connector

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Cmd, ConnectionInfo, IntoConnectionInfo, Pipeline, RedisError};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use unibase_core::{ConnectorConfig, ErrorKind, Result, UnibaseError};
use unibase_types::{ConnectorKind, Record, Records};

use super::slot::{ensure_open, HandleSlot};
use super::traits::{Connector, Isolation, Transaction};
use crate::cancel::with_cancel;
use crate::retry::{execute_with_retry, RetryPolicy};

const DEFAULT_PORT: u16 = 6379;

/// Redis key-value store connector
pub struct RedisConnector {
    info: ConnectionInfo,
    retry: RetryPolicy,
    slot: HandleSlot<ConnectionManager>,
}

impl RedisConnector {
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        super::expect_kind(&config, ConnectorKind::Cache)?;
        config.validate()?;

        Ok(Self {
            info: connection_info(&config)?,
            retry: RetryPolicy::default(),
            slot: HandleSlot::new(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

/// Connection settings for the configured server.
///
/// Credentials are set on the parsed info rather than spliced into the URL,
/// so passwords may contain URL delimiters.
fn connection_info(config: &ConnectorConfig) -> Result<ConnectionInfo> {
    let scheme = if config.option("tls") == Some("true") {
        "rediss"
    } else {
        "redis"
    };
    let address = format!(
        "{}://{}:{}",
        scheme,
        config.require_host()?,
        config.port.unwrap_or(DEFAULT_PORT)
    );
    let mut info = address
        .as_str()
        .into_connection_info()
        .map_err(|e| UnibaseError::wrap(ErrorKind::Configuration, "invalid cache address", e))?;

    info.redis.db = match config.database.as_deref() {
        Some(db) => db.parse().map_err(|_| {
            UnibaseError::configuration(format!("cache database must be a number, got '{}'", db))
        })?,
        None => 0,
    };
    info.redis.username = config.username.clone();
    info.redis.password = config.password.clone();
    Ok(info)
}

fn redis_error(err: RedisError, fallback: ErrorKind, message: impl Into<String>) -> UnibaseError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        ErrorKind::Connection
    } else if err.kind() == redis::ErrorKind::AuthenticationFailed || err.code() == Some("NOPERM") {
        ErrorKind::Permission
    } else if err.kind() == redis::ErrorKind::TypeError {
        ErrorKind::Query
    } else {
        fallback
    };
    UnibaseError::wrap(kind, message, err)
}

/// Records for a single-key lookup: nothing when the key is absent
fn lookup_records(key: &str, raw: Option<Vec<u8>>) -> Records {
    let Some(bytes) = raw else {
        return Vec::new();
    };
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let value = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    let mut record = Record::new();
    record.insert("key".to_string(), Value::String(key.to_string()));
    record.insert("value".to_string(), value);
    vec![record]
}

/// Affected count implied by a command reply
fn reply_count(reply: &redis::Value) -> u64 {
    match reply {
        redis::Value::Int(n) => (*n).max(0) as u64,
        redis::Value::Nil => 0,
        _ => 1,
    }
}

/// Build a command; strings go verbatim, anything else JSON-encoded
fn build_command(name: &str, args: &[Value]) -> Result<Cmd> {
    if name.trim().is_empty() {
        return Err(UnibaseError::execution("empty cache command"));
    }
    let mut cmd = redis::cmd(&name.to_uppercase());
    for arg in args {
        match arg {
            Value::String(s) => cmd.arg(s.as_str()),
            other => cmd.arg(serde_json::to_string(other)?),
        };
    }
    Ok(cmd)
}

async fn get_key(conn: &mut ConnectionManager, key: &str) -> Result<Records> {
    let raw: Option<Vec<u8>> = redis::cmd("GET")
        .arg(key)
        .query_async(conn)
        .await
        .map_err(|e| redis_error(e, ErrorKind::Query, "cache lookup failed"))?;
    Ok(lookup_records(key, raw))
}

#[async_trait]
impl Connector for RedisConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Cache
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        self.slot
            .get_or_connect(|| async {
                let client = Client::open(self.info.clone()).map_err(|e| {
                    UnibaseError::wrap(ErrorKind::Configuration, "invalid cache address", e)
                })?;
                let manager = execute_with_retry(
                    || async {
                        ConnectionManager::new(client.clone())
                            .await
                            .map_err(|e| redis_error(e, ErrorKind::Connection, "cache connection failed"))
                    },
                    &self.retry,
                    cancel,
                )
                .await?;
                info!("cache connector ready");
                Ok(manager)
            })
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        // Dropping the last manager clone closes the multiplexed connection
        if self.slot.close().await.is_some() {
            info!("cache connector closed");
        }
        Ok(())
    }

    async fn query(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        _args: &[Value],
    ) -> Result<Records> {
        let mut conn = self.slot.get().await?;
        with_cancel(cancel, get_key(&mut conn, statement)).await
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<u64> {
        let cmd = build_command(statement, args)?;
        let mut conn = self.slot.get().await?;
        debug!(command = statement, "cache execute");
        with_cancel(cancel, async {
            let reply: redis::Value = cmd
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error(e, ErrorKind::Execution, "cache command failed"))?;
            Ok(reply_count(&reply))
        })
        .await
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        let mut conn = self.slot.get().await?;
        with_cancel(cancel, async {
            let pong: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error(e, ErrorKind::Connection, "cache ping failed"))?;
            if pong == "PONG" {
                Ok(())
            } else {
                Err(UnibaseError::connection(format!("unexpected PING response: {}", pong)))
            }
        })
        .await
    }

    async fn begin_transaction(&self, _cancel: &CancellationToken) -> Result<Box<dyn Transaction>> {
        let conn = self.slot.get().await?;
        let mut pipeline = redis::pipe();
        pipeline.atomic();

        Ok(Box::new(RedisBatch {
            conn,
            pipeline,
            queued: 0,
            parent: self.slot.close_signal(),
        }))
    }
}

/// Commands queued in a `MULTI`/`EXEC` pipeline.
///
/// Reads go straight to the server and do not see queued writes.
pub struct RedisBatch {
    conn: ConnectionManager,
    pipeline: Pipeline,
    queued: usize,
    parent: CancellationToken,
}

#[async_trait]
impl Transaction for RedisBatch {
    fn isolation(&self) -> Isolation {
        Isolation::Batch
    }

    async fn query(
        &mut self,
        cancel: &CancellationToken,
        statement: &str,
        _args: &[Value],
    ) -> Result<Records> {
        ensure_open(&self.parent)?;
        with_cancel(cancel, get_key(&mut self.conn, statement)).await
    }

    /// Queue the command; the reply is only known after commit, so this returns 0
    async fn execute(
        &mut self,
        _cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<u64> {
        ensure_open(&self.parent)?;
        let cmd = build_command(statement, args)?;
        self.pipeline.add_command(cmd);
        self.queued += 1;
        Ok(0)
    }

    async fn commit(self: Box<Self>, cancel: &CancellationToken) -> Result<()> {
        ensure_open(&self.parent)?;
        if self.queued == 0 {
            return Ok(());
        }
        debug!(commands = self.queued, "flushing cache batch");
        let RedisBatch {
            mut conn, pipeline, ..
        } = *self;
        with_cancel(cancel, async move {
            pipeline
                .query_async::<_, redis::Value>(&mut conn)
                .await
                .map(|_| ())
                .map_err(|e| redis_error(e, ErrorKind::Transaction, "cache batch failed"))
        })
        .await
    }

    async fn rollback(self: Box<Self>, _cancel: &CancellationToken) -> Result<()> {
        debug!(commands = self.queued, "discarding cache batch");
        Ok(())
    }
}
