//! Remote API connector
//!
//! Three modes, picked from the configuration:
//! - request: one HTTP call per `query`/`execute`
//! - poll: request mode plus a background task re-issuing `GET <poll_path>`
//! - stream: one persistent WebSocket feeding a bounded buffer

mod http;
mod poll;
mod stream;

pub use stream::{FrameSink, FrameSource, StreamDialer, WebSocketDialer};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use unibase_core::{ApiMode, ConnectorConfig, Result, UnibaseError, POLL_PATH_OPTION};
use unibase_types::{ConnectorKind, Records};

use self::http::{HttpClient, HEADER_OPTION_PREFIX};
use self::poll::{spawn_poller, Poller};
use self::stream::StreamSession;
use super::slot::HandleSlot;
use super::traits::Connector;
use crate::cancel::with_cancel;
use crate::retry::{execute_with_retry, RetryPolicy};

/// Option naming the path probed by `ping` (default: the base URL)
const HEALTH_PATH_OPTION: &str = "health_path";

#[derive(Clone)]
enum ApiHandle {
    Request(HttpClient),
    Poll(HttpClient, Arc<Poller>),
    Stream(Arc<StreamSession>),
}

impl ApiHandle {
    fn client(&self) -> Option<&HttpClient> {
        match self {
            ApiHandle::Request(client) | ApiHandle::Poll(client, _) => Some(client),
            ApiHandle::Stream(_) => None,
        }
    }
}

/// HTTP / WebSocket API connector
pub struct ApiConnector {
    config: ConnectorConfig,
    mode: ApiMode,
    retry: RetryPolicy,
    dialer: Arc<dyn StreamDialer>,
    slot: HandleSlot<ApiHandle>,
}

impl ApiConnector {
    pub fn new(config: ConnectorConfig) -> Result<Self> {
        super::expect_kind(&config, ConnectorKind::Api)?;
        config.validate()?;
        let dialer = Arc::new(WebSocketDialer::new(config.require_base_url()?));

        Ok(Self {
            mode: config.api_mode(),
            config,
            retry: RetryPolicy::default(),
            dialer,
            slot: HandleSlot::new(),
        })
    }

    /// Replace the transport used in stream mode
    pub fn with_dialer(mut self, dialer: Arc<dyn StreamDialer>) -> Self {
        self.dialer = dialer;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn mode(&self) -> ApiMode {
        self.mode
    }

    fn http_client(&self) -> Result<HttpClient> {
        let headers = self.config.options.iter().filter_map(|(key, value)| {
            key.strip_prefix(HEADER_OPTION_PREFIX)
                .map(|name| (name, value.as_str()))
        });
        HttpClient::new(self.config.require_base_url()?, self.config.timeout(), headers)
    }

    async fn open(&self, cancel: &CancellationToken) -> Result<ApiHandle> {
        match self.mode {
            ApiMode::Request => Ok(ApiHandle::Request(self.http_client()?)),
            ApiMode::Poll(period) => {
                let client = self.http_client()?;
                let path = self.config.option(POLL_PATH_OPTION).unwrap_or("").to_string();
                info!(path = %path, period_secs = period.as_secs(), "starting api poller");
                let poller = spawn_poller(client.clone(), path, period);
                Ok(ApiHandle::Poll(client, Arc::new(poller)))
            }
            ApiMode::Stream => {
                let (sink, source) =
                    execute_with_retry(|| self.dialer.dial(), &self.retry, cancel).await?;
                let session = StreamSession::start(
                    self.dialer.clone(),
                    sink,
                    source,
                    self.config.buffer_size(),
                );
                Ok(ApiHandle::Stream(Arc::new(session)))
            }
        }
    }
}

/// Query-string parameters carried in `args[0]`
fn params_arg(args: &[Value]) -> Option<&Value> {
    args.first().filter(|v| !v.is_null())
}

/// Outbound stream frame: `args[0]` (strings verbatim), else the statement
fn frame_text(statement: &str, args: &[Value]) -> String {
    match args.first() {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => statement.to_string(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl Connector for ApiConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Api
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        self.slot
            .get_or_connect(|| async {
                let handle = self.open(cancel).await?;
                info!(base_url = ?self.config.base_url, mode = ?self.mode, "api connector ready");
                Ok(handle)
            })
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        match self.slot.close().await {
            Some(ApiHandle::Poll(_, poller)) => poller.shutdown().await,
            Some(ApiHandle::Stream(session)) => session.shutdown().await,
            Some(ApiHandle::Request(_)) | None => {}
        }
        info!("api connector closed");
        Ok(())
    }

    async fn query(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<Records> {
        match self.slot.get().await? {
            ApiHandle::Stream(session) => session.next(cancel).await,
            handle => {
                let client = handle.client().cloned().ok_or_else(|| {
                    UnibaseError::unsupported("api handle has no HTTP client")
                })?;
                let params = params_arg(args);
                debug!(path = statement, "api query");
                execute_with_retry(|| client.get(statement, params), &self.retry, cancel).await
            }
        }
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        statement: &str,
        args: &[Value],
    ) -> Result<u64> {
        match self.slot.get().await? {
            ApiHandle::Stream(session) => {
                session.send(cancel, frame_text(statement, args)).await?;
                Ok(1)
            }
            handle => {
                let client = handle.client().cloned().ok_or_else(|| {
                    UnibaseError::unsupported("api handle has no HTTP client")
                })?;
                let body = args.first().cloned().unwrap_or_else(|| Value::Object(Default::default()));
                debug!(path = statement, "api execute");
                with_cancel(cancel, client.post(statement, &body)).await
            }
        }
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<()> {
        match self.slot.get().await? {
            ApiHandle::Stream(session) if session.is_connected() => Ok(()),
            ApiHandle::Stream(_) => Err(UnibaseError::connection("stream is reconnecting")),
            handle => {
                let client = handle.client().cloned().ok_or_else(|| {
                    UnibaseError::unsupported("api handle has no HTTP client")
                })?;
                let path = self.config.option(HEALTH_PATH_OPTION).unwrap_or("");
                with_cancel(cancel, client.probe(path)).await
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::Router;

    /// Serve `router` on an ephemeral localhost port, returning its base URL
    pub(crate) async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

#[cfg(test)]
mod tests {
    use super::stream::testing::{scripted_session, ScriptedDialer};
    use super::testing::serve;
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use unibase_core::ErrorKind;

    fn request_config(base: &str) -> ConnectorConfig {
        let mut config = ConnectorConfig::new(ConnectorKind::Api);
        config.base_url = Some(base.to_string());
        config
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn test_mode_selection() {
        let config = request_config("http://localhost");
        assert_eq!(ApiConnector::new(config.clone()).unwrap().mode(), ApiMode::Request);

        let mut polling = config.clone();
        polling.polling_interval_secs = Some(30);
        assert_eq!(
            ApiConnector::new(polling).unwrap().mode(),
            ApiMode::Poll(Duration::from_secs(30))
        );

        let mut streaming = request_config("wss://feed.example.com");
        streaming.streaming = true;
        assert_eq!(ApiConnector::new(streaming).unwrap().mode(), ApiMode::Stream);

        let mut wrong_scheme = config;
        wrong_scheme.streaming = true;
        let err = ApiConnector::new(wrong_scheme).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_frame_text() {
        assert_eq!(frame_text("ping", &[]), "ping");
        assert_eq!(frame_text("ping", &[json!("raw")]), "raw");
        assert_eq!(frame_text("ping", &[json!({"op": "sub"})]), r#"{"op":"sub"}"#);
    }

    #[tokio::test]
    async fn test_request_mode_retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Router::new()
            .route(
                "/items",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(StatusCode::SERVICE_UNAVAILABLE)
                        } else {
                            Ok(Json(json!([{"id": 1}, {"id": 2}])))
                        }
                    }
                })
                .post(|| async { Json(json!({"affected": 5})) }),
            )
            .route("/health", get(|| async { "ok" }));
        let base = serve(router).await;

        let connector = ApiConnector::new(request_config(&base).with_option("health_path", "/health"))
            .unwrap()
            .with_retry_policy(fast_retry());
        let cancel = CancellationToken::new();
        connector.connect(&cancel).await.unwrap();
        connector.ping(&cancel).await.unwrap();

        let rows = connector.query(&cancel, "items", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let affected = connector
            .execute(&cancel, "/items", &[json!({"name": "x"})])
            .await
            .unwrap();
        assert_eq!(affected, 5);

        connector.close().await.unwrap();
        let err = connector.query(&cancel, "items", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_request_mode_permission_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Router::new().route(
            "/secret",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::FORBIDDEN
                }
            }),
        );
        let base = serve(router).await;

        let connector = ApiConnector::new(request_config(&base))
            .unwrap()
            .with_retry_policy(fast_retry());
        let cancel = CancellationToken::new();
        connector.connect(&cancel).await.unwrap();

        let err = connector.query(&cancel, "secret", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transactions_unsupported() {
        let connector = ApiConnector::new(request_config("http://localhost:1")).unwrap();
        let err = connector
            .begin_transaction(&CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_mode_query_and_execute() {
        let (first, mut peer) = scripted_session();
        let dialer = Arc::new(ScriptedDialer::new(vec![Ok(first)]));

        let mut config = request_config("ws://feed.test");
        config.streaming = true;
        config.websocket_buffer_size = Some(2);
        let connector = ApiConnector::new(config).unwrap().with_dialer(dialer);
        let cancel = CancellationToken::new();
        connector.connect(&cancel).await.unwrap();
        connector.ping(&cancel).await.unwrap();

        assert_eq!(
            connector.execute(&cancel, "subscribe", &[]).await.unwrap(),
            1
        );
        assert_eq!(peer.outbound.next().await.unwrap(), "subscribe");

        peer.inbound
            .unbounded_send(Ok(r#"[{"tick": 1}, {"tick": 2}]"#.to_string()))
            .unwrap();
        let rows = connector.query(&cancel, "", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["tick"], json!(2));

        connector.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_initial_dial_uses_retry_policy() {
        let dialer = Arc::new(ScriptedDialer::new(Vec::new()));
        let mut config = request_config("ws://feed.test");
        config.streaming = true;
        let connector = ApiConnector::new(config)
            .unwrap()
            .with_dialer(dialer.clone())
            .with_retry_policy(fast_retry());

        let err = connector.connect(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 3);
    }
}
