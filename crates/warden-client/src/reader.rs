//! Cached reader for one coordination-service node
//!
//! `CachedReader` mirrors a remote node's JSON value locally. A watch loop
//! keeps the mirror fresh: every change notification triggers a re-read
//! that also arms the next one-shot watch, so each snapshot is paired with
//! the registration that invalidates it.
//!
//! Rapid successive remote writes coalesce into whatever value is present
//! when a watch actually fires; consumers are guaranteed convergence to
//! the final value, not delivery of every intermediate write.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use warden_api::{CoordinationClient, NodeWatch};

use crate::error::{ClientError, Result};
use crate::listener::{ChangeEvent, ChangeListener};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// How long to wait before re-polling a watched node that went missing.
const MISSING_NODE_RETRY: Duration = Duration::from_millis(500);

struct ReaderShared {
    path: String,
    /// Swapping in a new value and capturing the old one happen under this
    /// mutex, so readers and the notify pipeline agree on every transition.
    cached: Mutex<Value>,
    changes: broadcast::Sender<ChangeEvent>,
    closed: watch::Sender<bool>,
    listener: Option<Arc<dyn ChangeListener>>,
}

/// A locally mirrored, watch-refreshed view of one remote JSON node.
pub struct CachedReader {
    shared: Arc<ReaderShared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CachedReader {
    /// Mirror `path`, reading its current value synchronously.
    ///
    /// Fails with the service's missing-node error when the node does not
    /// exist; nothing is created or retried.
    pub async fn new(client: Arc<dyn CoordinationClient>, path: &str) -> Result<Self> {
        Self::with_listener(client, path, None).await
    }

    /// Like [`new`](Self::new), additionally invoking `listener` on every
    /// observed change.
    pub async fn with_listener(
        client: Arc<dyn CoordinationClient>,
        path: &str,
        listener: Option<Arc<dyn ChangeListener>>,
    ) -> Result<Self> {
        let (raw, _stat, node_watch) = client.get_with_watch(path).await?;
        let value: Value = serde_json::from_slice(&raw).map_err(|e| ClientError::Decode {
            path: path.to_string(),
            source: e,
        })?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (closed, _) = watch::channel(false);
        let shared = Arc::new(ReaderShared {
            path: path.to_string(),
            cached: Mutex::new(value),
            changes,
            closed,
            listener,
        });

        info!(path = %path, "cached reader started");
        let task = tokio::spawn(watch_loop(client, shared.clone(), node_watch));

        Ok(Self {
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    /// A snapshot of the most recently observed value.
    pub fn value(&self) -> Value {
        self.shared.cached.lock().clone()
    }

    /// The watched node path.
    pub fn path(&self) -> &str {
        &self.shared.path
    }

    /// Block until the next observed change.
    ///
    /// Returns `Some((old, new))` for a change, or `None` once the reader
    /// is closed (not an error).
    pub async fn watch(&self) -> Result<Option<(Value, Value)>> {
        self.watch_inner(None).await
    }

    /// Like [`watch`](Self::watch), failing with
    /// [`ClientError::WatchTimeout`] when no change arrives within
    /// `timeout`.
    pub async fn watch_timeout(&self, timeout: Duration) -> Result<Option<(Value, Value)>> {
        self.watch_inner(Some(timeout)).await
    }

    async fn watch_inner(&self, timeout: Option<Duration>) -> Result<Option<(Value, Value)>> {
        // Subscribe before looking at the closed flag: a close racing this
        // call must wake us, not leave us blocked on a dead channel.
        let mut change_rx = self.shared.changes.subscribe();
        let mut closed_rx = self.shared.closed.subscribe();
        if *closed_rx.borrow() {
            return Ok(None);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let next_change = async {
            loop {
                match change_rx.recv().await {
                    Ok(event) => return Some(event),
                    // Overrun waiters pick up the next transition instead.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        tokio::select! {
            event = next_change => {
                match event {
                    Some(event) => Ok(Some((event.old, event.new))),
                    None => Ok(None),
                }
            }
            _ = closed_rx.wait_for(|closed| *closed) => Ok(None),
            _ = sleep_until_opt(deadline) => {
                Err(ClientError::WatchTimeout(timeout.unwrap_or_default()))
            }
        }
    }

    /// Stop the watch loop and release all current and future waiters with
    /// the closed sentinel. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.send_replace(true) {
            return;
        }
        info!(path = %self.shared.path, "cached reader closed");
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for CachedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedReader")
            .field("path", &self.shared.path)
            .finish_non_exhaustive()
    }
}

impl Drop for CachedReader {
    fn drop(&mut self) {
        self.close();
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// The persistent watch loop: wait for the armed watch, re-read with a
/// fresh watch, publish the transition.
async fn watch_loop(
    client: Arc<dyn CoordinationClient>,
    shared: Arc<ReaderShared>,
    node_watch: NodeWatch,
) {
    let mut closed_rx = shared.closed.subscribe();
    let mut armed = Some(node_watch);

    loop {
        if let Some(watch) = armed.take() {
            tokio::select! {
                fired = watch => {
                    match fired {
                        Ok(event) => {
                            debug!(path = %shared.path, kind = ?event.kind, "node change notification");
                        }
                        Err(_) => {
                            debug!(path = %shared.path, "watch cancelled by client shutdown");
                            break;
                        }
                    }
                }
                _ = closed_rx.wait_for(|closed| *closed) => break,
            }
        }

        match client.get_with_watch(&shared.path).await {
            Ok((raw, _stat, next_watch)) => {
                armed = Some(next_watch);
                match serde_json::from_slice::<Value>(&raw) {
                    Ok(new_value) => publish(&shared, new_value),
                    Err(e) => {
                        // A malformed payload must neither poison the cache
                        // nor kill the loop; the previous value stands.
                        warn!(
                            path = %shared.path,
                            error = %e,
                            "malformed remote value, keeping cached value"
                        );
                    }
                }
            }
            Err(e) if e.is_node_missing() => {
                info!(path = %shared.path, "watched node missing, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(MISSING_NODE_RETRY) => {}
                    _ = closed_rx.wait_for(|closed| *closed) => break,
                }
            }
            Err(warden_api::CoordError::Closed) => break,
            Err(e) => {
                // Transport trouble: stall until the connection recovers.
                warn!(path = %shared.path, error = %e, "re-read failed, stalling");
                tokio::select! {
                    _ = tokio::time::sleep(MISSING_NODE_RETRY) => {}
                    _ = closed_rx.wait_for(|closed| *closed) => break,
                }
            }
        }
    }
}

/// Swap in `new_value`, then notify: listener first, blocked waiters next.
fn publish(shared: &ReaderShared, new_value: Value) {
    let old = {
        let mut cached = shared.cached.lock();
        std::mem::replace(&mut *cached, new_value.clone())
    };

    let event = ChangeEvent {
        path: shared.path.clone(),
        old,
        new: new_value,
    };
    if let Some(listener) = &shared.listener {
        listener.on_change(&event);
    }
    let _ = shared.changes.send(event);
}
