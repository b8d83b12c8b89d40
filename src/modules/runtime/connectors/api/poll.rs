//! Background polling of a fixed API path

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::http::HttpClient;

/// Handle to a running poll loop
pub(crate) struct Poller {
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    /// Stop the loop and wait for the in-flight tick to finish
    pub(crate) async fn shutdown(&self) {
        self.stop.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "poll loop ended abnormally");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Re-issue `GET path` every `period` until stopped. Results are discarded;
/// failures are logged and never surface to callers.
pub(crate) fn spawn_poller(client: HttpClient, path: String, period: Duration) -> Poller {
    let stop = CancellationToken::new();
    let token = stop.clone();

    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                outcome = client.get(&path, None) => outcome,
            };
            match outcome {
                Ok(rows) => debug!(path = %path, rows = rows.len(), "poll tick"),
                Err(e) => error!(path = %path, error = %e, "poll failed"),
            }
        }
        debug!(path = %path, "poll loop stopped");
    });

    Poller {
        stop,
        task: Mutex::new(Some(task)),
    }
}
