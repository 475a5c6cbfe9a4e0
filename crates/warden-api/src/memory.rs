//! In-memory coordination service
//!
//! `MemoryCoordination` implements [`CoordinationClient`] inside a single
//! process with the full watch, session, and CAS semantics the trait
//! promises. Tests and local development run against it; the fault hooks
//! (`expire_session`, `emit_state`, `fail_next_create_ack`) reproduce the
//! failure modes the lock and reader protocols have to absorb.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use crate::acl::AclEntry;
use crate::client::CoordinationClient;
use crate::error::CoordError;
use crate::model::{ConnectionState, EventKind, NodeWatch, Stat, WatchEvent};

const CONNECTION_CHANNEL_CAPACITY: usize = 16;

struct NodeEntry {
    data: Bytes,
    version: i64,
    /// Session that owns this node, when ephemeral.
    ephemeral_owner: Option<u64>,
}

#[derive(Default)]
struct TreeState {
    nodes: HashMap<String, NodeEntry>,
    watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    session: u64,
    fail_create_ack: bool,
    closed: bool,
}

impl TreeState {
    /// Fire and drop every watch armed on `path`.
    fn fire_watches(&mut self, path: &str, kind: EventKind) {
        if let Some(senders) = self.watches.remove(path) {
            for tx in senders {
                let _ = tx.send(WatchEvent {
                    path: path.to_string(),
                    kind,
                });
            }
        }
    }

    fn check_open(&self) -> Result<(), CoordError> {
        if self.closed {
            Err(CoordError::Closed)
        } else {
            Ok(())
        }
    }
}

/// Single-process implementation of [`CoordinationClient`].
///
/// ACLs are accepted and stored with the call but not enforced; the double
/// models consistency and liveness, not auth.
pub struct MemoryCoordination {
    state: Mutex<TreeState>,
    conn_tx: broadcast::Sender<ConnectionState>,
}

impl MemoryCoordination {
    pub fn new() -> Self {
        let (conn_tx, _) = broadcast::channel(CONNECTION_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(TreeState::default()),
            conn_tx,
        }
    }

    /// End the current session: every ephemeral node it owns is deleted
    /// (firing armed watches), then `Expired` is broadcast to connection
    /// subscribers.
    pub fn expire_session(&self) {
        let mut state = self.state.lock();
        let session = state.session;
        let doomed: Vec<String> = state
            .nodes
            .iter()
            .filter(|(_, entry)| entry.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();

        for path in doomed {
            state.nodes.remove(&path);
            state.fire_watches(&path, EventKind::Deleted);
            debug!(path = %path, "session expiry removed ephemeral node");
        }
        state.session += 1;
        drop(state);

        let _ = self.conn_tx.send(ConnectionState::Expired);
    }

    /// Inject a connection-state transition to all subscribers.
    pub fn emit_state(&self, state: ConnectionState) {
        let _ = self.conn_tx.send(state);
    }

    /// Make the next `create` persist the node on the "server" but report
    /// `NodeAlreadyExists`: the ambiguous outcome a network fault
    /// produces once the client's retry runs into its own first attempt.
    pub fn fail_next_create_ack(&self) {
        self.state.lock().fail_create_ack = true;
    }

    /// Number of nodes currently in the tree (test convenience).
    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordination {
    async fn create(
        &self,
        path: &str,
        value: &[u8],
        ephemeral: bool,
        _acl: &[AclEntry],
    ) -> Result<(), CoordError> {
        let mut state = self.state.lock();
        state.check_open()?;

        if state.nodes.contains_key(path) {
            return Err(CoordError::NodeAlreadyExists(path.to_string()));
        }

        let session = state.session;
        state.nodes.insert(
            path.to_string(),
            NodeEntry {
                data: Bytes::copy_from_slice(value),
                version: 0,
                ephemeral_owner: ephemeral.then_some(session),
            },
        );
        state.fire_watches(path, EventKind::Created);

        if state.fail_create_ack {
            state.fail_create_ack = false;
            debug!(path = %path, "create persisted but ack dropped");
            return Err(CoordError::NodeAlreadyExists(path.to_string()));
        }
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<(Bytes, Stat), CoordError> {
        let state = self.state.lock();
        state.check_open()?;

        let entry = state
            .nodes
            .get(path)
            .ok_or_else(|| CoordError::NodeMissing(path.to_string()))?;
        Ok((entry.data.clone(), Stat::new(entry.version)))
    }

    async fn get_with_watch(&self, path: &str) -> Result<(Bytes, Stat, NodeWatch), CoordError> {
        let mut state = self.state.lock();
        state.check_open()?;

        let (data, stat) = {
            let entry = state
                .nodes
                .get(path)
                .ok_or_else(|| CoordError::NodeMissing(path.to_string()))?;
            (entry.data.clone(), Stat::new(entry.version))
        };

        // Arm the watch under the same lock as the read: the snapshot and
        // the registration cannot be separated by a concurrent write.
        let (tx, rx) = oneshot::channel();
        state.watches.entry(path.to_string()).or_default().push(tx);

        Ok((data, stat, rx))
    }

    async fn set(&self, path: &str, value: &[u8], version: i64) -> Result<Stat, CoordError> {
        let mut state = self.state.lock();
        state.check_open()?;

        let entry = state
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordError::NodeMissing(path.to_string()))?;

        if version >= 0 && version != entry.version {
            return Err(CoordError::VersionMismatch {
                path: path.to_string(),
                expected: version,
                actual: entry.version,
            });
        }

        entry.data = Bytes::copy_from_slice(value);
        entry.version += 1;
        let stat = Stat::new(entry.version);

        state.fire_watches(path, EventKind::DataChanged);
        Ok(stat)
    }

    async fn delete(&self, path: &str, version: i64) -> Result<(), CoordError> {
        let mut state = self.state.lock();
        state.check_open()?;

        let current = state
            .nodes
            .get(path)
            .map(|entry| entry.version)
            .ok_or_else(|| CoordError::NodeMissing(path.to_string()))?;

        if version >= 0 && version != current {
            return Err(CoordError::VersionMismatch {
                path: path.to_string(),
                expected: version,
                actual: current,
            });
        }

        state.nodes.remove(path);
        state.fire_watches(path, EventKind::Deleted);
        Ok(())
    }

    fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionState> {
        self.conn_tx.subscribe()
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        // Dropping armed watch senders wakes their receivers with an error,
        // the same way a real client cancels outstanding watches on close.
        state.watches.clear();
        drop(state);

        let _ = self.conn_tx.send(ConnectionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let coord = MemoryCoordination::new();
        coord.create("/a", b"hello", false, &[]).await.unwrap();

        let (data, stat) = coord.get("/a").await.unwrap();
        assert_eq!(&data[..], b"hello");
        assert_eq!(stat.version, 0);
    }

    #[tokio::test]
    async fn test_create_exists() {
        let coord = MemoryCoordination::new();
        coord.create("/a", b"x", false, &[]).await.unwrap();
        let err = coord.create("/a", b"y", false, &[]).await.unwrap_err();
        assert!(err.is_node_exists());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let coord = MemoryCoordination::new();
        let err = coord.get("/nope").await.unwrap_err();
        assert!(err.is_node_missing());
    }

    #[tokio::test]
    async fn test_set_bumps_version_and_cas() {
        let coord = MemoryCoordination::new();
        coord.create("/a", b"v0", false, &[]).await.unwrap();

        let stat = coord.set("/a", b"v1", 0).await.unwrap();
        assert_eq!(stat.version, 1);

        // Stale CAS fails loudly
        let err = coord.set("/a", b"v2", 0).await.unwrap_err();
        assert!(matches!(err, CoordError::VersionMismatch { actual: 1, .. }));

        // Unconditional write succeeds
        let stat = coord.set("/a", b"v2", -1).await.unwrap();
        assert_eq!(stat.version, 2);
    }

    #[tokio::test]
    async fn test_delete_cas() {
        let coord = MemoryCoordination::new();
        coord.create("/a", b"x", false, &[]).await.unwrap();
        coord.set("/a", b"y", -1).await.unwrap();

        let err = coord.delete("/a", 0).await.unwrap_err();
        assert!(matches!(err, CoordError::VersionMismatch { .. }));

        coord.delete("/a", 1).await.unwrap();
        assert!(coord.get("/a").await.unwrap_err().is_node_missing());
    }

    #[tokio::test]
    async fn test_watch_fires_on_set() {
        let coord = MemoryCoordination::new();
        coord.create("/a", b"x", false, &[]).await.unwrap();

        let (_, _, watch) = coord.get_with_watch("/a").await.unwrap();
        coord.set("/a", b"y", -1).await.unwrap();

        let ev = watch.await.unwrap();
        assert_eq!(ev.kind, EventKind::DataChanged);
    }

    #[tokio::test]
    async fn test_watch_fires_once_per_registration() {
        let coord = MemoryCoordination::new();
        coord.create("/a", b"x", false, &[]).await.unwrap();

        let (_, _, watch) = coord.get_with_watch("/a").await.unwrap();
        coord.set("/a", b"y", -1).await.unwrap();
        coord.set("/a", b"z", -1).await.unwrap();

        // Only the first change is observed by this registration
        let ev = watch.await.unwrap();
        assert_eq!(ev.kind, EventKind::DataChanged);
        // A fresh registration sees the current value
        let (data, stat, _) = coord.get_with_watch("/a").await.unwrap();
        assert_eq!(&data[..], b"z");
        assert_eq!(stat.version, 2);
    }

    #[tokio::test]
    async fn test_watch_fires_on_delete() {
        let coord = MemoryCoordination::new();
        coord.create("/a", b"x", false, &[]).await.unwrap();

        let (_, _, watch) = coord.get_with_watch("/a").await.unwrap();
        coord.delete("/a", -1).await.unwrap();

        let ev = watch.await.unwrap();
        assert_eq!(ev.kind, EventKind::Deleted);
    }

    #[tokio::test]
    async fn test_expire_session_removes_ephemerals() {
        let coord = MemoryCoordination::new();
        coord.create("/eph", b"x", true, &[]).await.unwrap();
        coord.create("/persist", b"x", false, &[]).await.unwrap();

        let mut conn = coord.subscribe_connection();
        let (_, _, watch) = coord.get_with_watch("/eph").await.unwrap();

        coord.expire_session();

        assert!(coord.get("/eph").await.unwrap_err().is_node_missing());
        assert!(coord.get("/persist").await.is_ok());
        assert_eq!(watch.await.unwrap().kind, EventKind::Deleted);
        assert_eq!(conn.recv().await.unwrap(), ConnectionState::Expired);
    }

    #[tokio::test]
    async fn test_ephemeral_from_new_session_survives_old_expiry() {
        let coord = MemoryCoordination::new();
        coord.expire_session();

        coord.create("/eph", b"x", true, &[]).await.unwrap();
        coord.expire_session();
        assert!(coord.get("/eph").await.unwrap_err().is_node_missing());
    }

    #[tokio::test]
    async fn test_fail_next_create_ack_persists_node() {
        let coord = MemoryCoordination::new();
        coord.fail_next_create_ack();

        let err = coord.create("/a", b"x", true, &[]).await.unwrap_err();
        assert!(err.is_node_exists());

        // The node is there regardless of the reported failure
        let (data, _) = coord.get("/a").await.unwrap();
        assert_eq!(&data[..], b"x");
    }

    #[tokio::test]
    async fn test_close_rejects_operations() {
        let coord = MemoryCoordination::new();
        coord.create("/a", b"x", false, &[]).await.unwrap();

        let (_, _, watch) = coord.get_with_watch("/a").await.unwrap();
        let mut conn = coord.subscribe_connection();

        coord.close().await;

        assert!(matches!(coord.get("/a").await, Err(CoordError::Closed)));
        assert_eq!(conn.recv().await.unwrap(), ConnectionState::Closed);
        // Armed watches are cancelled, not left hanging
        assert!(watch.await.is_err());
    }
}
