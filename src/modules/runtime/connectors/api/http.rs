//! HTTP request/response transport

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use unibase_core::{ErrorKind, Result, UnibaseError};
use unibase_types::{record_from_value, Record, Records};

/// Options with this prefix become default request headers
pub(crate) const HEADER_OPTION_PREFIX: &str = "header.";

/// Fields read, in order, for a mutation's affected count
const AFFECTED_FIELDS: &[&str] = &["affected", "affected_items", "count"];

/// Error body text kept in diagnostics
const MAX_BODY_SNIPPET: usize = 200;

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    pub(crate) fn new<'a>(
        base_url: &str,
        timeout: Duration,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                UnibaseError::wrap(ErrorKind::Configuration, format!("invalid header name '{}'", name), e)
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                UnibaseError::wrap(ErrorKind::Configuration, "invalid header value", e)
            })?;
            default_headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .default_headers(default_headers)
            .user_agent(concat!("unibase/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UnibaseError::wrap(ErrorKind::Configuration, "HTTP client creation failed", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Join a path onto the base URL
    pub(crate) fn url(&self, path: &str) -> String {
        let path = path.trim().trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// GET `path`, decoding the JSON body into records
    pub(crate) async fn get(&self, path: &str, params: Option<&Value>) -> Result<Records> {
        let url = self.url(path);
        let mut request = self.client.get(&url);
        if let Some(params) = params {
            request = request.query(&query_pairs(params)?);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, ErrorKind::Query, &url))?;
        let response = check_status(response, ErrorKind::Query).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| transport_error(e, ErrorKind::Query, &url))?;
        body_records(body)
    }

    /// POST a JSON body to `path`, returning the affected count it reports
    pub(crate) async fn post(&self, path: &str, body: &Value) -> Result<u64> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(e, ErrorKind::Execution, &url))?;
        let response = check_status(response, ErrorKind::Execution).await?;

        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, ErrorKind::Execution, &url))?;
        let reply = serde_json::from_str::<Value>(&text).unwrap_or(Value::Null);
        Ok(affected_count(&reply))
    }

    /// Reachability check: any non-5xx answer counts as healthy
    pub(crate) async fn probe(&self, path: &str) -> Result<()> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(e, ErrorKind::Connection, &url))?;
        if response.status().is_server_error() {
            return Err(UnibaseError::connection(format!(
                "health check returned HTTP {}",
                response.status()
            ))
            .with_context("url", url));
        }
        Ok(())
    }
}

/// Map an HTTP status to a taxonomy kind; `None` for success
pub(crate) fn status_kind(status: StatusCode, fallback: ErrorKind) -> Option<ErrorKind> {
    if status.is_success() || status.is_redirection() || status.is_informational() {
        return None;
    }
    Some(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Permission,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::Connection,
        s if s.is_server_error() => ErrorKind::Connection,
        _ => fallback,
    })
}

async fn check_status(response: reqwest::Response, fallback: ErrorKind) -> Result<reqwest::Response> {
    let status = response.status();
    let Some(kind) = status_kind(status, fallback) else {
        return Ok(response);
    };

    let url = response.url().to_string();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_BODY_SNIPPET {
        let cut = (0..=MAX_BODY_SNIPPET)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }

    let mut err = UnibaseError::new(kind, format!("HTTP {}", status))
        .with_context("status", status.as_u16())
        .with_context("url", url);
    if !body.is_empty() {
        err = err.with_context("body", body);
    }
    Err(err)
}

fn transport_error(err: reqwest::Error, fallback: ErrorKind, url: &str) -> UnibaseError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        ErrorKind::Connection
    } else if err.is_decode() {
        ErrorKind::Query
    } else if err.is_builder() {
        ErrorKind::Configuration
    } else if let Some(kind) = err.status().and_then(|s| status_kind(s, fallback)) {
        kind
    } else {
        fallback
    };
    UnibaseError::wrap(kind, "HTTP request failed", err).with_context("url", url)
}

/// Query-string pairs from a JSON object; strings verbatim, others JSON-encoded
pub(crate) fn query_pairs(params: &Value) -> Result<Vec<(String, String)>> {
    match params {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()),
        _ => Err(UnibaseError::query("request parameters must be a JSON object")),
    }
}

/// A JSON array yields one record per element, an object yields one record
pub(crate) fn body_records(body: Value) -> Result<Records> {
    match body {
        Value::Array(items) => Ok(items.into_iter().map(element_record).collect()),
        Value::Object(_) => Ok(record_from_value(body).into_iter().collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(UnibaseError::query(format!(
            "expected a JSON array or object, got {}",
            other
        ))),
    }
}

fn element_record(item: Value) -> Record {
    match item {
        Value::Object(_) => record_from_value(item).unwrap_or_default(),
        scalar => Record::from([("value".to_string(), scalar)]),
    }
}

/// Affected count reported by a mutation reply, defaulting to 1
pub(crate) fn affected_count(reply: &Value) -> u64 {
    AFFECTED_FIELDS
        .iter()
        .find_map(|field| reply.get(field).and_then(Value::as_u64))
        .unwrap_or(1)
}
