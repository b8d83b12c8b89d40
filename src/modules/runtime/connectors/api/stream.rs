//! Persistent streaming transport
//!
//! One background task reads inbound frames into a bounded buffer that
//! `query` drains. When the transport fails, the task runs the reconnect
//! loop while holding the sink lock, so writers wait for the new session.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use unibase_core::{ErrorKind, Result, UnibaseError};
use unibase_types::{record_from_value, Record, Records};

use crate::cancel::with_cancel;

/// Outbound half of a stream session
pub type FrameSink = Pin<Box<dyn Sink<String, Error = UnibaseError> + Send>>;

/// Inbound half of a stream session; the stream ending means the peer went away
pub type FrameSource = BoxStream<'static, Result<String>>;

const INITIAL_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(120);

/// Opens a fresh session with the remote end
#[async_trait]
pub trait StreamDialer: Send + Sync {
    async fn dial(&self) -> Result<(FrameSink, FrameSource)>;
}

/// WebSocket dialer; text frames carry the payload
pub struct WebSocketDialer {
    url: String,
}

impl WebSocketDialer {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

fn ws_error(err: tokio_tungstenite::tungstenite::Error) -> UnibaseError {
    use tokio_tungstenite::tungstenite::Error as WsError;

    let kind = match &err {
        WsError::Http(resp) if matches!(resp.status().as_u16(), 401 | 403) => ErrorKind::Permission,
        WsError::Url(_) => ErrorKind::Configuration,
        _ => ErrorKind::Connection,
    };
    UnibaseError::wrap(kind, "websocket failure", err)
}

#[async_trait]
impl StreamDialer for WebSocketDialer {
    async fn dial(&self) -> Result<(FrameSink, FrameSource)> {
        let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(ws_error)?;
        let (sink, source) = socket.split();

        let sink = sink
            .sink_map_err(ws_error)
            .with(|text: String| futures::future::ready(Ok::<_, UnibaseError>(Message::Text(text))));

        let source = source.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(_)) => Some(Err(UnibaseError::connection("peer closed the stream"))),
                Ok(_) => None,
                Err(e) => Some(Err(ws_error(e))),
            }
        });

        Ok((Box::pin(sink), source.boxed()))
    }
}

/// Decode one inbound frame: array, object, or plain text
pub(crate) fn decode_frame(text: &str) -> Records {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(_) => record_from_value(item).unwrap_or_default(),
                scalar => Record::from([("value".to_string(), scalar)]),
            })
            .collect(),
        Ok(value @ Value::Object(_)) => record_from_value(value).into_iter().collect(),
        _ => vec![Record::from([(
            "message".to_string(),
            Value::String(text.to_string()),
        )])],
    }
}

/// Delay after `current`: doubled, capped at two minutes
pub(crate) fn next_reconnect_delay(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_RECONNECT_BACKOFF)
}

struct Shared {
    sink: Mutex<Option<FrameSink>>,
    connected: AtomicBool,
    shutdown: CancellationToken,
}

/// A live stream: read loop, inbound buffer and outbound sink
pub(crate) struct StreamSession {
    shared: Arc<Shared>,
    inbox: Mutex<mpsc::Receiver<Records>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    /// Start the read loop over an already-dialed session
    pub(crate) fn start(
        dialer: Arc<dyn StreamDialer>,
        sink: FrameSink,
        source: FrameSource,
        buffer_size: usize,
    ) -> Self {
        let shared = Arc::new(Shared {
            sink: Mutex::new(Some(sink)),
            connected: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
        });
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let reader = tokio::spawn(read_loop(shared.clone(), dialer, source, tx));

        Self {
            shared,
            inbox: Mutex::new(rx),
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Wait for the next buffered message
    pub(crate) async fn next(&self, cancel: &CancellationToken) -> Result<Records> {
        with_cancel(cancel, async {
            let mut inbox = self.inbox.lock().await;
            inbox
                .recv()
                .await
                .ok_or_else(|| UnibaseError::connection("stream is closed"))
        })
        .await
    }

    /// Send one text frame; waits while a reconnect is in progress
    pub(crate) async fn send(&self, cancel: &CancellationToken, text: String) -> Result<()> {
        with_cancel(cancel, async {
            let mut sink = self.shared.sink.lock().await;
            match sink.as_mut() {
                Some(sink) => sink.send(text).await,
                None => Err(UnibaseError::connection("stream is closed")),
            }
        })
        .await
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst) && !self.shared.shutdown.is_cancelled()
    }

    /// Stop the read loop and close the sink
    pub(crate) async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        if let Some(reader) = self.reader.lock().await.take() {
            if let Err(e) = reader.await {
                warn!(error = %e, "stream read loop ended abnormally");
            }
        }
        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "closing stream sink failed");
            }
        }
        self.inbox.lock().await.close();
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    dialer: Arc<dyn StreamDialer>,
    mut source: FrameSource,
    tx: mpsc::Sender<Records>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            frame = source.next() => frame,
        };

        let failure = match frame {
            Some(Ok(text)) => {
                let records = decode_frame(&text);
                tokio::select! {
                    biased;
                    _ = shared.shutdown.cancelled() => break,
                    sent = tx.send(records) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }
            Some(Err(err)) => err,
            None => UnibaseError::connection("stream ended"),
        };

        warn!(error = %failure, "stream read failed");
        match reconnect(&shared, dialer.as_ref()).await {
            Some(fresh) => source = fresh,
            None => break,
        }
    }
    debug!("stream read loop stopped");
}

/// Redial until it works or shutdown is requested.
///
/// Not bounded by any retry policy; only shutdown ends it. Holds the sink
/// lock for the whole attempt.
async fn reconnect(shared: &Shared, dialer: &dyn StreamDialer) -> Option<FrameSource> {
    let mut sink = shared.sink.lock().await;
    shared.connected.store(false, Ordering::SeqCst);
    *sink = None;

    let mut delay = INITIAL_RECONNECT_BACKOFF;
    loop {
        warn!(delay_secs = delay.as_secs(), "reconnecting stream");
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let dialed = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            dialed = dialer.dial() => dialed,
        };

        match dialed {
            Ok((fresh_sink, source)) => {
                *sink = Some(fresh_sink);
                shared.connected.store(true, Ordering::SeqCst);
                info!("stream reconnected");
                return Some(source);
            }
            Err(err) => {
                warn!(error = %err, "stream reconnect failed");
                delay = next_reconnect_delay(delay);
            }
        }
    }
    error!("stream shut down before it could reconnect");
    None
}
