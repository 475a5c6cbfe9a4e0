//! The coordination-service client seam
//!
//! Everything in Warden talks to the coordination service through
//! `CoordinationClient`. The service itself (consensus, replication,
//! session keep-alive, wire protocol) lives behind this trait and is not
//! implemented here.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::acl::AclEntry;
use crate::error::CoordError;
use crate::model::{ConnectionState, NodeWatch, Stat};

/// A strongly consistent hierarchical store with ephemeral nodes, one-shot
/// watches, and CAS writes keyed by the per-node version.
///
/// Implementations must deliver watch and connection events from their own
/// tasks, concurrently with caller operations.
#[async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// Create a node. Fails with [`CoordError::NodeAlreadyExists`] when a
    /// node is already present at `path`.
    ///
    /// An ephemeral node is removed automatically when the creating
    /// session ends.
    async fn create(
        &self,
        path: &str,
        value: &[u8],
        ephemeral: bool,
        acl: &[AclEntry],
    ) -> Result<(), CoordError>;

    /// Read a node's value and stat. Fails with
    /// [`CoordError::NodeMissing`] when absent.
    async fn get(&self, path: &str) -> Result<(Bytes, Stat), CoordError>;

    /// Read a node's value and stat, registering a one-shot watch for the
    /// next change (set or delete) at the same path.
    ///
    /// The watch is armed atomically with the read: the returned snapshot
    /// is exactly the state whose invalidation the watch reports.
    async fn get_with_watch(&self, path: &str) -> Result<(Bytes, Stat, NodeWatch), CoordError>;

    /// Write a node's value. `version >= 0` is a CAS write failing with
    /// [`CoordError::VersionMismatch`] on a stale version; `-1` writes
    /// unconditionally. Returns the new stat.
    async fn set(&self, path: &str, value: &[u8], version: i64) -> Result<Stat, CoordError>;

    /// Delete a node. Same version semantics as [`set`](Self::set). Fails
    /// with [`CoordError::NodeMissing`] when absent.
    async fn delete(&self, path: &str, version: i64) -> Result<(), CoordError>;

    /// Subscribe to connection-state transitions.
    ///
    /// Every subscriber receives every transition; dropping the receiver
    /// is deregistration, so tearing down one consumer never affects
    /// another sharing the client.
    fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionState>;

    /// Close the client. Subsequent operations fail with
    /// [`CoordError::Closed`]; connection subscribers observe
    /// [`ConnectionState::Closed`].
    async fn close(&self);
}
