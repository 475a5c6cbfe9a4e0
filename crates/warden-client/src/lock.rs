//! Distributed mutual-exclusion lock
//!
//! `DistributedLock` implements a coordination-service based lock: holding
//! the lock is holding the node at `lock_path`, and ownership is decided
//! by comparing the identifier stored in that node against our own, never
//! by node existence alone and never by trusting a create's own outcome.
//!
//! The acquire loop alternates create / authoritative-read rounds gated by
//! an availability signal; a one-shot watch armed with every read and a
//! connection-state listener feed that signal (and the `on_lost` callback)
//! from the service's notification side.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use warden_api::{AclEntry, CoordinationClient, NodeWatch};

use crate::conf::PathConfig;
use crate::error::{ClientError, Result};
use crate::identifier::Identifier;

/// Callback invoked when continued ownership can no longer be assumed.
pub type OnLost = Arc<dyn Fn() + Send + Sync>;

/// Options for constructing a [`DistributedLock`].
pub struct LockOptions {
    /// Claimant identity; derived from the configured node id when `None`.
    pub identifier: Option<Identifier>,
    /// Create the lock node session-bound, so a crashed holder releases.
    pub ephemeral: bool,
    /// Default timeout for blocking [`DistributedLock::acquire`] calls.
    pub timeout: Duration,
    /// Invoked on any event that invalidates an ownership assumption.
    pub on_lost: Option<OnLost>,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            identifier: None,
            ephemeral: true,
            timeout: warden_common::DEFAULT_ACQUIRE_TIMEOUT,
            on_lost: None,
        }
    }
}

/// State shared with the watch and connection listener tasks.
///
/// The availability signal and the last-observed holder form one
/// mutual-exclusion domain: every writer takes `holder`'s mutex before
/// touching the signal, so a waiter can never observe one without the
/// matching state of the other.
struct LockShared {
    lock_path: String,
    my_id: String,
    holder: Mutex<Option<(Identifier, i64)>>,
    available: watch::Sender<bool>,
    on_lost: Option<OnLost>,
}

impl LockShared {
    fn signal_available(&self) {
        let _guard = self.holder.lock();
        self.available.send_replace(true);
    }

    fn held_by_me(&self) -> bool {
        self.holder
            .lock()
            .as_ref()
            .is_some_and(|(h, _)| h.id == self.my_id)
    }

    fn notify_lost(&self) {
        if let Some(cb) = &self.on_lost {
            cb();
        }
    }
}

/// A distributed mutual-exclusion lock over one coordination-service node.
///
/// Must be constructed inside a Tokio runtime: the connection listener is
/// spawned at construction time.
pub struct DistributedLock {
    client: Arc<dyn CoordinationClient>,
    owns_client: bool,
    lock_name: String,
    ephemeral: bool,
    timeout: Duration,
    acl: Vec<AclEntry>,
    /// Mutable payload carried in our identifier; `set_lock_val` updates it.
    val: Mutex<Value>,
    shared: Arc<LockShared>,
    conn_task: Mutex<Option<JoinHandle<()>>>,
}

impl DistributedLock {
    /// Create a lock over a caller-supplied (possibly shared) client.
    pub fn new(
        client: Arc<dyn CoordinationClient>,
        conf: &PathConfig,
        lock_name: &str,
        options: LockOptions,
    ) -> Result<Self> {
        Self::build(client, false, conf, lock_name, options)
    }

    /// Create a lock that exclusively owns `client` and tears it down on
    /// [`close`](Self::close).
    ///
    /// `on_lost` is mandatory here: nobody else observes the owned
    /// client's health, so connection trouble must reach the caller
    /// through the lock.
    pub fn with_owned_client(
        client: Arc<dyn CoordinationClient>,
        conf: &PathConfig,
        lock_name: &str,
        mut options: LockOptions,
        on_lost: OnLost,
    ) -> Result<Self> {
        options.on_lost = Some(on_lost);
        Self::build(client, true, conf, lock_name, options)
    }

    fn build(
        client: Arc<dyn CoordinationClient>,
        owns_client: bool,
        conf: &PathConfig,
        lock_name: &str,
        options: LockOptions,
    ) -> Result<Self> {
        let lock_path = conf.lock(lock_name)?;
        let identifier = options
            .identifier
            .unwrap_or_else(|| Identifier::derive(&conf.node_id));

        let (available, _) = watch::channel(true);
        let shared = Arc::new(LockShared {
            lock_path,
            my_id: identifier.id,
            holder: Mutex::new(None),
            available,
            on_lost: options.on_lost,
        });

        let lock = Self {
            client,
            owns_client,
            lock_name: lock_name.to_string(),
            ephemeral: options.ephemeral,
            timeout: options.timeout,
            acl: conf.digest_acl()?,
            val: Mutex::new(identifier.val),
            shared,
            conn_task: Mutex::new(None),
        };

        info!(lock = %lock, "adding connection listener");
        lock.start_connection_listener();
        Ok(lock)
    }

    /// Acquire the lock, blocking up to the construction-time timeout.
    pub async fn acquire(&self) -> Result<()> {
        self.acquire_inner(self.timeout, None).await
    }

    /// Acquire the lock, blocking up to `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        self.acquire_inner(timeout, None).await
    }

    /// Acquire the lock, invoking `inspect` with the current holder's
    /// identifier and node version before every contended retry.
    pub async fn acquire_inspect(
        &self,
        timeout: Duration,
        mut inspect: impl FnMut(&Identifier, i64) + Send,
    ) -> Result<()> {
        self.acquire_inner(timeout, Some(&mut inspect)).await
    }

    async fn acquire_inner(
        &self,
        timeout: Duration,
        mut inspect: Option<&mut (dyn FnMut(&Identifier, i64) + Send)>,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut avail_rx = self.shared.available.subscribe();

        loop {
            // The loop keeps going past the deadline as long as the signal
            // stays set: a create-exists / node-vanished ping-pong must not
            // time out while the lock looks takeable.
            let waited = tokio::time::timeout_at(deadline, async {
                avail_rx.wait_for(|ready| *ready).await.map(|_| ())
            })
            .await;
            match waited {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    return Err(ClientError::InvalidState(
                        "availability signal closed".to_string(),
                    ));
                }
                Err(_) => {
                    debug!(lock = %self, "lock is still held by others");
                    return Err(ClientError::AcquireTimeout(self.shared.lock_path.clone()));
                }
            }

            self.create_node().await?;
            if self.acquire_by_get().await? {
                return Ok(());
            }

            // Contended (signal cleared): report the holder, then wait.
            // A vanished-node race leaves the signal set and retries
            // silently.
            if !*self.shared.available.borrow() {
                if let Some(f) = inspect.as_mut() {
                    let observed = self.shared.holder.lock().clone();
                    if let Some((holder, version)) = observed {
                        f(&holder, version);
                    }
                }
            }
        }
    }

    /// Try to acquire the lock without blocking.
    ///
    /// Returns `(held, holder, version)`: `(true, own identifier, -1)` on
    /// success, otherwise `false` with the last observed holder and its
    /// node version.
    pub async fn try_acquire(&self) -> Result<(bool, Identifier, i64)> {
        match self.acquire_inner(Duration::ZERO, None).await {
            Ok(()) | Err(ClientError::AcquireTimeout(_)) => {}
            Err(e) => return Err(e),
        }

        if self.is_locked() {
            Ok((true, self.identifier(), -1))
        } else {
            let observed = self.shared.holder.lock().clone();
            match observed {
                Some((holder, version)) => Ok((false, holder, version)),
                None => Ok((false, self.identifier(), -1)),
            }
        }
    }

    /// Release the lock iff this instance is the current holder, without
    /// blocking.
    ///
    /// Reads the node fresh and compares identifiers; only a match leads
    /// to a CAS delete at the read version. Returns `(released, holder,
    /// version)` with the same conventions as [`try_acquire`]
    /// (a node already gone counts as released: the desired end state
    /// holds).
    ///
    /// [`try_acquire`]: Self::try_acquire
    pub async fn try_release(&self) -> Result<(bool, Identifier, i64)> {
        debug!(lock = %self, "try to release if I am lock holder");

        match self.client.get(&self.shared.lock_path).await {
            Ok((raw, stat)) => {
                let holder = Identifier::decode(&raw, &self.shared.lock_path)?;
                *self.shared.holder.lock() = Some((holder.clone(), stat.version));

                if holder.id != self.shared.my_id {
                    return Ok((false, holder, stat.version));
                }

                self.stop_connection_listener();
                match self.client.delete(&self.shared.lock_path, stat.version).await {
                    Ok(()) => {}
                    Err(e) if e.is_node_missing() => {
                        info!(lock = %self, "node already gone while releasing");
                    }
                    Err(e) => return Err(e.into()),
                }
                *self.shared.holder.lock() = None;
                Ok((true, holder, -1))
            }
            Err(e) if e.is_node_missing() => {
                info!(lock = %self, "nothing to release, lock node missing");
                Ok((true, self.identifier(), -1))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release the lock if held, then close this instance.
    ///
    /// A node that is already gone is not an error. The instance is closed
    /// whether or not it held the lock.
    pub async fn release(&self) -> Result<()> {
        if self.is_locked() {
            // Stop listening before mutating, to avoid a self-inflicted
            // lost-lock notification for the delete below.
            self.stop_connection_listener();

            match self.client.delete(&self.shared.lock_path, -1).await {
                Ok(()) => {}
                Err(e) if e.is_node_missing() => {
                    info!(lock = %self, "node already gone while releasing");
                }
                Err(e) => return Err(e.into()),
            }
            *self.shared.holder.lock() = None;
            info!(lock = %self, "released");
        } else {
            info!(lock = %self, "not acquired, nothing to release");
        }

        self.close().await;
        Ok(())
    }

    /// Stop the connection listener and, when owned, tear down the client.
    pub async fn close(&self) {
        self.stop_connection_listener();
        if self.owns_client {
            info!(lock = %self, "closing owned client");
            self.client.close().await;
        }
    }

    /// Update the payload stored alongside the holder identity.
    ///
    /// Ownership is re-verified first; fails with
    /// [`ClientError::InvalidState`] when the lock is not held. `version`
    /// follows CAS semantics (`-1` writes unconditionally), so a stale
    /// version fails loudly instead of overwriting a concurrent change.
    pub async fn set_lock_val(&self, val: Value, version: i64) -> Result<i64> {
        let (locked, _, _) = self.try_acquire().await?;
        if !locked {
            return Err(ClientError::InvalidState(format!(
                "set value on lock not held: {}",
                self.lock_name
            )));
        }

        *self.val.lock() = val;
        let payload = self.identifier().encode()?;
        let stat = self
            .client
            .set(&self.shared.lock_path, &payload, version)
            .await?;
        Ok(stat.version)
    }

    /// Read the payload currently stored at the lock node.
    pub async fn get_lock_val(&self) -> Result<(Value, i64)> {
        let (raw, stat) = self.client.get(&self.shared.lock_path).await?;
        let holder = Identifier::decode(&raw, &self.shared.lock_path)?;
        Ok((holder.val, stat.version))
    }

    /// Whether the last observed remote state says this instance holds
    /// the lock.
    pub fn is_locked(&self) -> bool {
        self.shared.held_by_me()
    }

    /// The last locally observed `(holder, version)`, if any.
    pub fn last_holder(&self) -> Option<(Identifier, i64)> {
        self.shared.holder.lock().clone()
    }

    /// Authoritatively read the current holder from the service.
    ///
    /// `None` means the lock is currently free.
    pub async fn current_holder(&self) -> Result<Option<(Identifier, i64)>> {
        match self.client.get(&self.shared.lock_path).await {
            Ok((raw, stat)) => {
                let holder = Identifier::decode(&raw, &self.shared.lock_path)?;
                Ok(Some((holder, stat.version)))
            }
            Err(e) if e.is_node_missing() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// This claimant's identifier with the current payload.
    pub fn identifier(&self) -> Identifier {
        Identifier::new(&self.shared.my_id, self.val.lock().clone())
    }

    /// The absolute node path this lock contends on.
    pub fn lock_path(&self) -> &str {
        &self.shared.lock_path
    }

    /// The logical lock name.
    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    /// Create the lock node carrying our identifier.
    ///
    /// An exists-failure is not a verdict: it also happens when our own
    /// create succeeded but its acknowledgement was lost, so ownership is
    /// left to the authoritative get that follows.
    async fn create_node(&self) -> Result<()> {
        debug!(lock = %self, "to create");

        let payload = self.identifier().encode()?;
        match self
            .client
            .create(&self.shared.lock_path, &payload, self.ephemeral, &self.acl)
            .await
        {
            Ok(()) => {
                info!(lock = %self, "create ok");
                Ok(())
            }
            Err(e) if e.is_node_exists() => {
                debug!(lock = %self, "lock node exists");
                *self.shared.holder.lock() = None;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the node, arm a one-shot watch for it, and decide ownership by
    /// identifier comparison. Returns whether the lock is now held.
    async fn acquire_by_get(&self) -> Result<bool> {
        debug!(lock = %self, "to get");

        match self.client.get_with_watch(&self.shared.lock_path).await {
            Ok((raw, stat, node_watch)) => {
                let holder = Identifier::decode(&raw, &self.shared.lock_path)?;
                let locked = {
                    let mut guard = self.shared.holder.lock();
                    *guard = Some((holder.clone(), stat.version));
                    let locked = holder.id == self.shared.my_id;
                    if !locked {
                        self.shared.available.send_replace(false);
                    }
                    locked
                };
                self.spawn_watch_handler(node_watch);

                if locked {
                    info!(lock = %self, "acquired");
                } else {
                    debug!(lock = %self, "other holds");
                }
                Ok(locked)
            }
            Err(e) if e.is_node_missing() => {
                // Created then vanished between create and get: reset and
                // let the loop retry immediately.
                info!(lock = %self, "lock node vanished between create and get");
                let mut guard = self.shared.holder.lock();
                *guard = None;
                self.shared.available.send_replace(true);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Handle the firing of one watch registration.
    ///
    /// Any change sets the availability signal; a change while we believed
    /// ourselves the holder additionally means the lock state is no longer
    /// trustworthy, so `on_lost` fires.
    fn spawn_watch_handler(&self, node_watch: NodeWatch) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let Ok(event) = node_watch.await else {
                // Client shut down; the watch will never fire.
                return;
            };

            let was_held = {
                let guard = shared.holder.lock();
                shared.available.send_replace(true);
                guard.as_ref().is_some_and(|(h, _)| h.id == shared.my_id)
            };

            info!(
                path = %event.path,
                kind = ?event.kind,
                "node state changed, lock might be released"
            );
            if was_held {
                shared.notify_lost();
            }
        });
    }

    fn start_connection_listener(&self) {
        let shared = self.shared.clone();
        let mut conn_rx = self.client.subscribe_connection();

        let handle = tokio::spawn(async move {
            loop {
                match conn_rx.recv().await {
                    Ok(state) => {
                        info!(
                            state = %state,
                            path = %shared.lock_path,
                            "connection state changed"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Missed transitions are indistinguishable from
                        // disturbances.
                        warn!(missed, path = %shared.lock_path, "connection events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                // Every transition invalidates any ownership assumption:
                // writes during the disturbance were unobservable.
                shared.signal_available();
                shared.notify_lost();
            }
        });

        *self.conn_task.lock() = Some(handle);
    }

    fn stop_connection_listener(&self) {
        if let Some(handle) = self.conn_task.lock().take() {
            handle.abort();
        }
    }
}

impl fmt::Display for DistributedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observed = self.shared.holder.lock().clone();
        match observed {
            Some((holder, version)) => write!(
                f,
                "<id={} {}:[{}:{}]>",
                self.shared.my_id, self.shared.lock_path, holder.id, version
            ),
            None => write!(f, "<id={} {}:[]>", self.shared.my_id, self.shared.lock_path),
        }
    }
}

impl Drop for DistributedLock {
    fn drop(&mut self) {
        self.stop_connection_listener();
    }
}
