//! Cancellation and deadline helpers shared by every blocking operation

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use unibase_core::{ErrorKind, Result, UnibaseError};

/// Race `fut` against `cancel`, returning a cancelled error if the token wins.
pub async fn with_cancel<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UnibaseError::cancelled()),
        res = fut => res,
    }
}

/// Bound `fut` by a deadline, mapping expiry to a timeout error.
pub async fn with_timeout<T, F>(deadline: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(elapsed) => Err(UnibaseError::wrap(
            ErrorKind::Timeout,
            format!("{} exceeded {:?}", what, deadline),
            elapsed,
        )),
    }
}
