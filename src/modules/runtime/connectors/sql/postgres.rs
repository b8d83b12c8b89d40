//! PostgreSQL driver

use serde_json::Value;
use sqlx::postgres::{PgColumn, PgConnectOptions, PgPool, PgRow, PgSslMode};
use sqlx::{Column, Executor, Postgres, Row};
use std::str::FromStr;
use unibase_core::{ConnectorConfig, ErrorKind, Result, UnibaseError};
use unibase_types::{Record, Records};

use super::{bind_args, pool_options};

const DEFAULT_PORT: u16 = 5432;

pub(super) fn open_pool(config: &ConnectorConfig) -> Result<PgPool> {
    let mut options = PgConnectOptions::new()
        .host(config.require_host()?)
        .port(config.port.unwrap_or(DEFAULT_PORT))
        .database(config.require_database()?);

    if let Some(user) = config.username.as_deref() {
        options = options.username(user);
    }
    if let Some(password) = config.password.as_deref() {
        options = options.password(password);
    }
    if let Some(mode) = config.option("sslmode") {
        let mode = PgSslMode::from_str(mode).map_err(|e| {
            UnibaseError::wrap(ErrorKind::Configuration, "invalid sslmode", e)
        })?;
        options = options.ssl_mode(mode);
    }

    Ok(pool_options::<Postgres>(&config.pool).connect_lazy_with(options))
}

/// Rewrite `?` placeholders to `$1, $2, ...`, leaving quoted text alone
pub(super) fn rebind(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (Some(_), c) => out.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                out.push(c);
            }
            (None, '?') => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            (None, c) => out.push(c),
        }
    }
    out
}

pub(super) async fn fetch<'c, E>(
    executor: E,
    sql: &str,
    args: &[Value],
) -> std::result::Result<Records, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let sql = rebind(sql);
    let rows = bind_args(sqlx::query(&sql), args)
        .fetch_all(executor)
        .await?;
    Ok(rows.iter().map(row_to_record).collect())
}

pub(super) async fn execute<'c, E>(
    executor: E,
    sql: &str,
    args: &[Value],
) -> std::result::Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = Postgres>,
{
    let sql = rebind(sql);
    let done = bind_args(sqlx::query(&sql), args).execute(executor).await?;
    Ok(done.rows_affected())
}

/// Convert a PostgreSQL row to a record
fn row_to_record(row: &PgRow) -> Record {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), column_value(row, column)))
        .collect()
}

/// Decode a column by its declared type name
fn column_value(row: &PgRow, column: &PgColumn) -> Value {
    use sqlx::TypeInfo;

    let idx = column.ordinal();
    match column.type_info().name() {
        "BOOL" => row.try_get::<Option<bool>, _>(idx).ok().flatten().map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into())),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into())),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .ok()
            .flatten()
            .and_then(|v| serde_json::Number::from_f64(v as f64))
            .map(Value::Number),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx).ok().flatten(),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::String),
    }
    .unwrap_or(Value::Null)
}
