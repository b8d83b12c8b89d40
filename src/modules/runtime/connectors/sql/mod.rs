//! Relational connector over PostgreSQL, MySQL and SQLite
//!
//! Statements use `?` placeholders with positional arguments; the PostgreSQL
//! driver rebinds them to `$n` before execution.

mod mysql;
mod postgres;
mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::database::HasArguments;
use sqlx::pool::PoolOptions;
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Database, Encode, MySqlPool, PgPool, SqlitePool, Type};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unibase_core::{ConnectorConfig, ErrorKind, PoolConfig, Result, SqlDriver, UnibaseError};
use unibase_types::{ConnectorKind, Records};

use super::slot::{closed_error, ensure_open, HandleSlot, OpenScopes, ScopeHandle};
use super::traits::{Connector, Isolation, Transaction};
use crate::cancel::with_cancel;
use crate::retry::{execute_with_retry, RetryPolicy};

type Arguments<'q, DB> = <DB as HasArguments<'q>>::Arguments;

/// Pool settings shared by every driver
fn pool_options<DB: Database>(pool: &PoolConfig) -> PoolOptions<DB> {
    PoolOptions::<DB>::new()
        .max_connections(pool.max_open())
        .min_connections(pool.max_idle())
        .acquire_timeout(pool.acquire_timeout())
        .idle_timeout(pool.idle_timeout())
        .max_lifetime(pool.max_lifetime())
}

/// Bind positional JSON arguments onto a query
fn bind_args<'q, DB>(
    mut query: Query<'q, DB, Arguments<'q, DB>>,
    args: &[Value],
) -> Query<'q, DB, Arguments<'q, DB>>
where
    DB: Database,
    Option<String>: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Json<Value>: Encode<'q, DB> + Type<DB>,
{
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            nested => query.bind(Json(nested.clone())),
        };
    }
    query
}

/// Translate a driver error into the taxonomy.
///
/// `fallback` is the kind used for statement-level failures the driver
/// does not classify further.
fn driver_error(err: sqlx::Error, fallback: ErrorKind, message: impl Into<String>) -> UnibaseError {
    let kind = match &err {
        sqlx::Error::Database(db) => {
            let code = db.code();
            let mysql_number = db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|e| e.number());
            if matches!(code.as_deref(), Some("42501" | "28000" | "28P01"))
                || matches!(mysql_number, Some(1044 | 1045 | 1142))
            {
                ErrorKind::Permission
            } else if db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.is_check_violation()
            {
                ErrorKind::Execution
            } else {
                fallback
            }
        }
        sqlx::Error::PoolTimedOut => ErrorKind::Timeout,
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => ErrorKind::Connection,
        sqlx::Error::Configuration(_) => ErrorKind::Configuration,
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => ErrorKind::Query,
        _ => fallback,
    };
    UnibaseError::wrap(kind, message, err)
}

#[derive(Clone)]
enum SqlPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl SqlPool {
    /// Build the pool without opening a connection yet
    fn open(driver: SqlDriver, config: &ConnectorConfig) -> Result<Self> {
        let pool = match driver {
            SqlDriver::Postgres => Self::Postgres(postgres::open_pool(config)?),
            SqlDriver::Mysql => Self::MySql(mysql::open_pool(config)?),
            SqlDriver::Sqlite => Self::Sqlite(sqlite::open_pool(config)?),
        };
        Ok(pool)
    }

    async fn ping(&self) -> std::result::Result<(), sqlx::Error> {
        match self {
            Self::Postgres(pool) => postgres::execute(pool, "SELECT 1", &[]).await.map(|_| ()),
            Self::MySql(pool) => mysql::execute(pool, "SELECT 1", &[]).await.map(|_| ()),
            Self::Sqlite(pool) => sqlite::execute(pool, "SELECT 1", &[]).await.map(|_| ()),
        }
    }

    async fn fetch(&self, sql: &str, args: &[Value]) -> std::result::Result<Records, sqlx::Error> {
        match self {
            Self::Postgres(pool) => postgres::fetch(pool, sql, args).await,
            Self::MySql(pool) => mysql::fetch(pool, sql, args).await,
            Self::Sqlite(pool) => sqlite::fetch(pool, sql, args).await,
        }
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> std::result::Result<u64, sqlx::Error> {
        match self {
            Self::Postgres(pool) => postgres::execute(pool, sql, args).await,
            Self::MySql(pool) => mysql::execute(pool, sql, args).await,
            Self::Sqlite(pool) => sqlite::execute(pool, sql, args).await,
        }
    }

    async fn begin(&self) -> std::result::Result<TxHandle, sqlx::Error> {
        let tx = match self {
            Self::Postgres(pool) => TxHandle::Postgres(pool.begin().await?),
            Self::MySql(pool) => TxHandle::MySql(pool.begin().await?),
            Self::Sqlite(pool) => TxHandle::Sqlite(pool.begin().await?),
        };
        Ok(tx)
    }

    async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }
}

/// Relational database connector
pub struct SqlConnector {
    config: ConnectorConfig,
    driver: SqlDriver,
    retry: RetryPolicy,
    slot: HandleSlot<SqlPool>,
    scopes: OpenScopes<TxHandle>,
}

impl SqlConnector {
    /// Create a connector; no connection is opened until [`Connector::connect`]
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        super::expect_kind(&config, ConnectorKind::Sql)?;
        config.validate()?;
        let driver = config.sql_driver()?;

        Ok(Self {
            config,
            driver,
            retry: RetryPolicy::default(),
            slot: HandleSlot::new(),
            scopes: OpenScopes::new(),
        })
    }

    /// Replace the policy used for the connect ping
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn driver(&self) -> SqlDriver {
        self.driver
    }
}

#[async_trait]
impl Connector for SqlConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Sql
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        self.slot
            .get_or_connect(|| async {
                let pool = SqlPool::open(self.driver, &self.config)?;
                let ping = execute_with_retry(
                    || async {
                        pool.ping().await.map_err(|e| {
                            driver_error(e, ErrorKind::Connection, "database ping failed")
                        })
                    },
                    &self.retry,
                    cancel,
                )
                .await;

                if let Err(err) = ping {
                    pool.close().await;
                    return Err(err.with_context("driver", self.driver));
                }

                info!(driver = %self.driver, "SQL connector ready");
                Ok(pool)
            })
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        if let Some(pool) = self.slot.close().await {
            for tx in self.scopes.reclaim().await {
                warn!(driver = %self.driver, "rolling back transaction left open at close");
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "rollback at close failed");
                }
            }
            pool.close().await;
            info!(driver = %self.driver, "SQL connector closed");
        }
        Ok(())
    }

    async fn query(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<Records> {
        let pool = self.slot.get().await?;
        debug!(driver = %self.driver, statement, "SQL query");
        with_cancel(cancel, async {
            pool.fetch(statement, args)
                .await
                .map_err(|e| driver_error(e, ErrorKind::Query, "SQL query failed"))
        })
        .await
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<u64> {
        let pool = self.slot.get().await?;
        debug!(driver = %self.driver, statement, "SQL execute");
        with_cancel(cancel, async {
            pool.execute(statement, args)
                .await
                .map_err(|e| driver_error(e, ErrorKind::Execution, "SQL execution failed"))
        })
        .await
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        let pool = self.slot.get().await?;
        with_cancel(cancel, async {
            pool.ping()
                .await
                .map_err(|e| driver_error(e, ErrorKind::Connection, "database ping failed"))
        })
        .await
    }

    async fn begin_transaction(&self, cancel: &CancellationToken) -> Result<Box<dyn Transaction>> {
        let pool = self.slot.get().await?;
        let tx = with_cancel(cancel, async {
            pool.begin()
                .await
                .map_err(|e| driver_error(e, ErrorKind::Transaction, "failed to begin transaction"))
        })
        .await?;

        let parent = self.slot.close_signal();
        let tx = self.scopes.track(tx).await;
        if parent.is_cancelled() {
            // Closed while beginning; close may already have reclaimed it
            if let Some(tx) = tx.lock().await.take() {
                let _ = tx.rollback().await;
            }
            return Err(closed_error());
        }

        Ok(Box::new(SqlTransaction { tx, parent }))
    }
}

enum TxHandle {
    Postgres(sqlx::Transaction<'static, sqlx::Postgres>),
    MySql(sqlx::Transaction<'static, sqlx::MySql>),
    Sqlite(sqlx::Transaction<'static, sqlx::Sqlite>),
}

impl TxHandle {
    async fn commit(self) -> std::result::Result<(), sqlx::Error> {
        match self {
            Self::Postgres(tx) => tx.commit().await,
            Self::MySql(tx) => tx.commit().await,
            Self::Sqlite(tx) => tx.commit().await,
        }
    }

    async fn rollback(self) -> std::result::Result<(), sqlx::Error> {
        match self {
            Self::Postgres(tx) => tx.rollback().await,
            Self::MySql(tx) => tx.rollback().await,
            Self::Sqlite(tx) => tx.rollback().await,
        }
    }
}

/// Native ACID transaction; dropping it without commit rolls back.
///
/// Closing the connector rolls back a scope that is still open.
pub struct SqlTransaction {
    tx: ScopeHandle<TxHandle>,
    parent: CancellationToken,
}

#[async_trait]
impl Transaction for SqlTransaction {
    fn isolation(&self) -> Isolation {
        Isolation::Acid
    }

    async fn query(
        &mut self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<Records> {
        ensure_open(&self.parent)?;
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(closed_error)?;
        with_cancel(cancel, async {
            let rows = match tx {
                TxHandle::Postgres(tx) => postgres::fetch(&mut **tx, statement, args).await,
                TxHandle::MySql(tx) => mysql::fetch(&mut **tx, statement, args).await,
                TxHandle::Sqlite(tx) => sqlite::fetch(&mut **tx, statement, args).await,
            };
            rows.map_err(|e| driver_error(e, ErrorKind::Query, "SQL query failed"))
        })
        .await
    }

    async fn execute(
        &mut self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<u64> {
        ensure_open(&self.parent)?;
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(closed_error)?;
        with_cancel(cancel, async {
            let affected = match tx {
                TxHandle::Postgres(tx) => postgres::execute(&mut **tx, statement, args).await,
                TxHandle::MySql(tx) => mysql::execute(&mut **tx, statement, args).await,
                TxHandle::Sqlite(tx) => sqlite::execute(&mut **tx, statement, args).await,
            };
            affected.map_err(|e| driver_error(e, ErrorKind::Execution, "SQL execution failed"))
        })
        .await
    }

    async fn commit(self: Box<Self>, cancel: &CancellationToken) -> Result<()> {
        ensure_open(&self.parent)?;
        let tx = self.tx.lock().await.take().ok_or_else(closed_error)?;
        with_cancel(cancel, async move {
            tx.commit()
                .await
                .map_err(|e| driver_error(e, ErrorKind::Transaction, "commit failed"))
        })
        .await
    }

    async fn rollback(self: Box<Self>, cancel: &CancellationToken) -> Result<()> {
        // Already rolled back when the connector was closed
        let Some(tx) = self.tx.lock().await.take() else {
            return Ok(());
        };
        with_cancel(cancel, async move {
            tx.rollback()
                .await
                .map_err(|e| driver_error(e, ErrorKind::Transaction, "rollback failed"))
        })
        .await
    }
}
