//! Retry policy with deterministic exponential backoff
//!
//! A [`RetryPolicy`] is stateless and shared freely; the attempt counter and
//! the current backoff live on the stack of each [`execute_with_retry`] call.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use unibase_core::{Result, UnibaseError};

/// Predicate deciding whether an error belongs to a class
pub type Classifier = Arc<dyn Fn(&UnibaseError) -> bool + Send + Sync>;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Retry configuration: attempt budget, backoff curve, and error classifiers
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    backoff_factor: f64,
    retryable: Vec<Classifier>,
    non_retryable: Vec<Classifier>,
}

impl Default for RetryPolicy {
    /// Three attempts, 100ms doubling up to 10s; connection and timeout
    /// errors are retried, permission errors never are.
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retryable: vec![
                Arc::new(|e: &UnibaseError| e.is_connection_error()),
                Arc::new(|e: &UnibaseError| e.is_timeout_error()),
            ],
            non_retryable: vec![Arc::new(|e: &UnibaseError| e.is_permission_error())],
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_backoff", &self.initial_backoff)
            .field("max_backoff", &self.max_backoff)
            .field("backoff_factor", &self.backoff_factor)
            .field("retryable", &self.retryable.len())
            .field("non_retryable", &self.non_retryable.len())
            .finish()
    }
}

/// How the policy treats one failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    NonRetryable,
    Retryable,
    Fatal,
}

impl RetryPolicy {
    /// Policy with the given budget and curve and the default classifiers
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self::default()
            .with_max_attempts(max_attempts)
            .with_initial_backoff(initial_backoff)
            .with_max_backoff(max_backoff)
    }

    /// Total invocations allowed, clamped to at least one
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Growth factor, clamped to at least 1.0
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        self
    }

    /// Add a predicate marking errors worth retrying
    pub fn retry_on<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&UnibaseError) -> bool + Send + Sync + 'static,
    {
        self.retryable.push(Arc::new(classifier));
        self
    }

    /// Add a predicate marking errors that must never be retried
    pub fn never_retry_on<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&UnibaseError) -> bool + Send + Sync + 'static,
    {
        self.non_retryable.push(Arc::new(classifier));
        self
    }

    /// Drop every classifier, so nothing is retried until some are added
    pub fn without_classifiers(mut self) -> Self {
        self.retryable.clear();
        self.non_retryable.clear();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The sequence of waits between attempts
    pub fn backoff(&self) -> Backoff {
        Backoff {
            current: self.initial_backoff.min(self.max_backoff),
            max: self.max_backoff,
            factor: self.backoff_factor,
        }
    }

    fn classify(&self, err: &UnibaseError) -> Verdict {
        if self.non_retryable.iter().any(|c| c(err)) {
            Verdict::NonRetryable
        } else if self.retryable.iter().any(|c| c(err)) {
            Verdict::Retryable
        } else {
            Verdict::Fatal
        }
    }
}

/// Capped geometric backoff sequence; never decreases, never exceeds the cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    factor: f64,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.factor)
            .unwrap_or(self.max)
            .min(self.max);
        Some(delay)
    }
}

/// Run `operation` until it succeeds, fails fatally, is cancelled, or the
/// policy's attempt budget runs out.
///
/// Non-retryable classifiers are consulted first and return the error as-is.
/// Errors matching no classifier are also returned immediately. Exhaustion
/// yields a `RetriesExhausted` error wrapping the last failure.
pub async fn execute_with_retry<T, F, Fut>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.backoff();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(UnibaseError::cancelled());
        }
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match policy.classify(&err) {
            Verdict::NonRetryable | Verdict::Fatal => return Err(err),
            Verdict::Retryable if attempt >= policy.max_attempts => {
                return Err(UnibaseError::retries_exhausted(attempt, err));
            }
            Verdict::Retryable => {}
        }

        let delay = backoff.next().unwrap_or(policy.max_backoff);
        debug!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after transient failure"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UnibaseError::cancelled()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use unibase_core::ErrorKind;

    fn counting<F>(calls: &Arc<AtomicU32>, fail: F) -> impl FnMut() -> futures::future::Ready<Result<u32>>
    where
        F: Fn(u32) -> Option<UnibaseError>,
    {
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            futures::future::ready(match fail(n) {
                Some(err) => Err(err),
                None => Ok(n),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_error_invoked_exactly_max_attempts() {
        for max in [1, 3, 5] {
            let calls = Arc::new(AtomicU32::new(0));
            let policy = RetryPolicy::default().with_max_attempts(max);
            let op = counting(&calls, |n| {
                Some(UnibaseError::connection(format!("attempt {}", n)))
            });

            let err = execute_with_retry(op, &policy, &CancellationToken::new())
                .await
                .unwrap_err();

            assert_eq!(calls.load(Ordering::SeqCst), max);
            assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
            assert_eq!(err.inner().unwrap().message(), format!("attempt {}", max));
            assert!(err.is_connection_error());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_invoked_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default().with_max_attempts(10);
        let op = counting(&calls, |_| Some(UnibaseError::permission("denied")));

        let err = execute_with_retry(op, &policy, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::Permission);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_checked_before_retryable() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default()
            .with_max_attempts(4)
            .never_retry_on(|e| e.message() == "poisoned");
        let op = counting(&calls, |_| Some(UnibaseError::connection("poisoned")));

        let err = execute_with_retry(op, &policy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_error_is_fatal() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default().with_max_attempts(5);
        let op = counting(&calls, |_| Some(UnibaseError::query("syntax error")));

        let err = execute_with_retry(op, &policy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::Query);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default().with_max_attempts(5);
        let op = counting(&calls, |n| (n < 3).then(|| UnibaseError::timeout("slow")));

        let started = tokio::time::Instant::now();
        let value = execute_with_retry(op, &policy, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(value, 3);
        // waited 100ms then 200ms
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn test_backoff_sequence_is_capped_and_monotonic() {
        let policy = RetryPolicy::default()
            .with_initial_backoff(Duration::from_millis(100))
            .with_backoff_factor(2.0)
            .with_max_backoff(Duration::from_secs(10));

        let delays: Vec<Duration> = policy.backoff().take(12).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[6], Duration::from_millis(6400));
        assert_eq!(delays[7], Duration::from_secs(10));
        assert_eq!(delays[11], Duration::from_secs(10));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(10)));
    }

    #[test]
    fn test_factor_below_one_is_clamped() {
        let policy = RetryPolicy::default().with_backoff_factor(0.5);
        let delays: Vec<Duration> = policy.backoff().take(3).collect();
        assert!(delays.iter().all(|d| *d == Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff_wait() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::default()
            .with_max_attempts(5)
            .with_initial_backoff(Duration::from_secs(60))
            .with_max_backoff(Duration::from_secs(60));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let op = counting(&calls, |_| Some(UnibaseError::connection("down")));
        let started = tokio::time::Instant::now();
        let err = execute_with_retry(op, &policy, &token).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_operation() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();
        token.cancel();

        let op = counting(&calls, |_| None);
        let err = execute_with_retry(op, &RetryPolicy::default(), &token)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_max_attempts_clamped() {
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts(), 1);
    }
}
