//! SQLite driver

use serde_json::Value;
use sqlx::sqlite::{SqliteColumn, SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::{Column, Executor, Row, Sqlite, TypeInfo, ValueRef};
use std::str::FromStr;
use unibase_core::{ConnectorConfig, ErrorKind, Result, UnibaseError};
use unibase_types::{Record, Records};

use super::{bind_args, pool_options};

const MEMORY_DATABASE: &str = ":memory:";

pub(super) fn open_pool(config: &ConnectorConfig) -> Result<SqlitePool> {
    let database = config.require_database()?;
    if database == MEMORY_DATABASE {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            UnibaseError::wrap(ErrorKind::Configuration, "invalid sqlite database", e)
        })?;
        // Each connection to :memory: is a separate database; keep exactly one alive
        let pool = pool_options::<Sqlite>(&config.pool)
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_lazy_with(options);
        return Ok(pool);
    }

    let options = SqliteConnectOptions::new()
        .filename(database)
        .create_if_missing(config.option("create_if_missing") == Some("true"));
    Ok(pool_options::<Sqlite>(&config.pool).connect_lazy_with(options))
}

pub(super) async fn fetch<'c, E>(
    executor: E,
    sql: &str,
    args: &[Value],
) -> std::result::Result<Records, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows = bind_args(sqlx::query(sql), args).fetch_all(executor).await?;
    Ok(rows.iter().map(row_to_record).collect())
}

pub(super) async fn execute<'c, E>(
    executor: E,
    sql: &str,
    args: &[Value],
) -> std::result::Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Sqlite>,
{
    let done = bind_args(sqlx::query(sql), args).execute(executor).await?;
    Ok(done.rows_affected())
}

fn row_to_record(row: &SqliteRow) -> Record {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), column_value(row, column)))
        .collect()
}

/// SQLite is dynamically typed, so the stored value's type wins over the
/// declared column type except for BOOLEAN columns.
fn column_value(row: &SqliteRow, column: &SqliteColumn) -> Value {
    let idx = column.ordinal();
    let storage = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    let declared = column.type_info().name();
    let decoded = match (declared, storage.as_str()) {
        ("BOOLEAN", _) => row.try_get::<bool, _>(idx).ok().map(Value::Bool),
        (_, "INTEGER") => row.try_get::<i64, _>(idx).ok().map(|v| Value::Number(v.into())),
        (_, "REAL") => row
            .try_get::<f64, _>(idx)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        (_, "BLOB") => row
            .try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        _ => row.try_get::<String, _>(idx).ok().map(Value::String),
    };
    decoded.unwrap_or(Value::Null)
}
