//! Connector lifecycle tracking
//!
//! A connector owns at most one live backend handle. [`HandleSlot`] holds it
//! and walks the `unconnected -> ready -> closed` lifecycle; `closed` is
//! terminal.

use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use unibase_core::{Result, UnibaseError};

enum State<H> {
    Unconnected,
    Ready(H),
    Closed,
}

/// Shared holder for a connector's backend handle
pub struct HandleSlot<H> {
    state: RwLock<State<H>>,
    connecting: Mutex<()>,
    closed: CancellationToken,
}

/// Context key carried by errors that report the lifecycle state
const LIFECYCLE: &str = "lifecycle";

pub(crate) fn not_connected() -> UnibaseError {
    UnibaseError::connection("not connected").with_context(LIFECYCLE, "unconnected")
}

pub(crate) fn closed_error() -> UnibaseError {
    UnibaseError::connection("connector is closed").with_context(LIFECYCLE, "closed")
}

/// True for errors raised because a connector is not in its ready state.
///
/// These are Connection errors, but no retry can change the outcome.
pub fn is_lifecycle_error(err: &UnibaseError) -> bool {
    err.context_value(LIFECYCLE).is_some()
        || err.inner().map_or(false, is_lifecycle_error)
}

impl<H: Clone + Send + Sync> HandleSlot<H> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::Unconnected),
            connecting: Mutex::new(()),
            closed: CancellationToken::new(),
        }
    }

    /// The current handle, failing unless the slot is ready
    pub async fn get(&self) -> Result<H> {
        self.peek().await?.ok_or_else(not_connected)
    }

    async fn peek(&self) -> Result<Option<H>> {
        match &*self.state.read().await {
            State::Ready(handle) => Ok(Some(handle.clone())),
            State::Unconnected => Ok(None),
            State::Closed => Err(closed_error()),
        }
    }

    /// Return the ready handle, or run `connect` to create one.
    ///
    /// Concurrent callers are serialized so only one of them connects.
    pub async fn get_or_connect<F, Fut>(&self, connect: F) -> Result<H>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<H>>,
    {
        if let Some(handle) = self.peek().await? {
            return Ok(handle);
        }

        let _guard = self.connecting.lock().await;
        if let Some(handle) = self.peek().await? {
            return Ok(handle);
        }

        let handle = connect().await?;

        let mut state = self.state.write().await;
        match &*state {
            State::Closed => Err(closed_error()),
            _ => {
                *state = State::Ready(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Move to the terminal state, returning the handle if one was live
    pub async fn close(&self) -> Option<H> {
        self.closed.cancel();
        let mut state = self.state.write().await;
        match std::mem::replace(&mut *state, State::Closed) {
            State::Ready(handle) => Some(handle),
            _ => None,
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.read().await, State::Ready(_))
    }

    /// Token fired once the slot is closed; transaction scopes watch it
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }
}

impl<H: Clone + Send + Sync> Default for HandleSlot<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fail with a Connection error if the parent connector has been closed
pub(crate) fn ensure_open(parent: &CancellationToken) -> Result<()> {
    if parent.is_cancelled() {
        Err(closed_error())
    } else {
        Ok(())
    }
}

/// Backend handle shared between a transaction scope and its connector
pub(crate) type ScopeHandle<T> = Arc<Mutex<Option<T>>>;

/// Handles lent to open transaction scopes.
///
/// A scope keeps the strong reference; closing the connector takes every
/// handle still in place so the backend can be released without waiting
/// on the caller to finish the scope.
pub(crate) struct OpenScopes<T> {
    scopes: Mutex<Vec<Weak<Mutex<Option<T>>>>>,
}

impl<T> OpenScopes<T> {
    pub(crate) fn new() -> Self {
        Self {
            scopes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn track(&self, handle: T) -> ScopeHandle<T> {
        let shared = Arc::new(Mutex::new(Some(handle)));
        let mut scopes = self.scopes.lock().await;
        scopes.retain(|scope| scope.strong_count() > 0);
        scopes.push(Arc::downgrade(&shared));
        shared
    }

    /// Take the handles of every scope that has not finished yet
    pub(crate) async fn reclaim(&self) -> Vec<T> {
        let live: Vec<ScopeHandle<T>> = self
            .scopes
            .lock()
            .await
            .drain(..)
            .filter_map(|scope| scope.upgrade())
            .collect();

        let mut handles = Vec::new();
        for scope in live {
            if let Some(handle) = scope.lock().await.take() {
                handles.push(handle);
            }
        }
        handles
    }
}
