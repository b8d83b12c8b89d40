//! MySQL driver

use serde_json::Value;
use sqlx::mysql::{MySqlColumn, MySqlConnectOptions, MySqlPool, MySqlRow, MySqlSslMode};
use sqlx::{Column, Executor, MySql, Row};
use std::str::FromStr;
use unibase_core::{ConnectorConfig, ErrorKind, Result, UnibaseError};
use unibase_types::{Record, Records};

use super::{bind_args, pool_options};

const DEFAULT_PORT: u16 = 3306;

pub(super) fn open_pool(config: &ConnectorConfig) -> Result<MySqlPool> {
    let mut options = MySqlConnectOptions::new()
        .host(config.require_host()?)
        .port(config.port.unwrap_or(DEFAULT_PORT))
        .database(config.require_database()?);

    if let Some(user) = config.username.as_deref() {
        options = options.username(user);
    }
    if let Some(password) = config.password.as_deref() {
        options = options.password(password);
    }
    if let Some(mode) = config.option("ssl_mode") {
        let mode = MySqlSslMode::from_str(mode).map_err(|e| {
            UnibaseError::wrap(ErrorKind::Configuration, "invalid ssl_mode", e)
        })?;
        options = options.ssl_mode(mode);
    }

    Ok(pool_options::<MySql>(&config.pool).connect_lazy_with(options))
}

pub(super) async fn fetch<'c, E>(
    executor: E,
    sql: &str,
    args: &[Value],
) -> std::result::Result<Records, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
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
    E: Executor<'c, Database = MySql>,
{
    let done = bind_args(sqlx::query(sql), args).execute(executor).await?;
    Ok(done.rows_affected())
}

/// Convert a MySQL row to a record
fn row_to_record(row: &MySqlRow) -> Record {
    let mut record = Record::new();
    for column in row.columns() {
        record.insert(column.name().to_string(), column_value(row, column));
    }
    record
}

fn column_value(row: &MySqlRow, column: &MySqlColumn) -> Value {
    use sqlx::TypeInfo;

    let idx = column.ordinal();
    let decoded = match column.type_info().name() {
        "BOOLEAN" => row.try_get::<Option<bool>, _>(idx).ok().flatten().map(Value::Bool),
        "TINYINT" | "SMALLINT" | "INT" | "MEDIUMINT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into())),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "INT UNSIGNED" | "MEDIUMINT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into())),
        "FLOAT" => row
            .try_get::<Option<f32>, _>(idx)
            .ok()
            .flatten()
            .and_then(|v| serde_json::Number::from_f64(v as f64))
            .map(Value::Number),
        "DOUBLE" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S").to_string())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string())),
        "JSON" => row.try_get::<Option<Value>, _>(idx).ok().flatten(),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::String),
    };
    decoded.unwrap_or(Value::Null)
}
