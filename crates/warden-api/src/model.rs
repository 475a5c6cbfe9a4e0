//! Node metadata, watch-event, and connection-state models

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Metadata returned alongside a node's value.
///
/// `version` is the coordination service's native per-node counter: it
/// starts at 0 on create and increments on every data write. It is the
/// expected-version argument of CAS `set`/`delete` calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub version: i64,
}

impl Stat {
    pub fn new(version: i64) -> Self {
        Self { version }
    }
}

/// What happened to a watched node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Created,
    DataChanged,
    Deleted,
}

/// A change notification delivered through a one-shot watch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub kind: EventKind,
}

/// The receiving half of a one-shot watch registration.
///
/// A watch fires at most once per registration; re-observing a node means
/// issuing a fresh `get_with_watch`. The armed → fired → re-armed cycle is
/// therefore explicit in the types: each registration is its own channel.
/// The sender side is dropped without firing when the client shuts down,
/// which surfaces here as a receive error.
pub type NodeWatch = oneshot::Receiver<WatchEvent>;

/// Discrete connection states delivered to connection listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Session established (initially, or again after a disturbance).
    Connected,
    /// Connectivity lost; the session may still be alive on the server.
    Suspended,
    /// The session expired; all its ephemeral nodes are gone.
    Expired,
    /// The client was closed locally.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Suspended => "suspended",
            ConnectionState::Expired => "expired",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stat_roundtrip() {
        let stat = Stat::new(7);
        let encoded = serde_json::to_string(&stat).unwrap();
        let decoded: Stat = serde_json::from_str(&encoded).unwrap();
        assert_eq!(stat, decoded);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Suspended.to_string(), "suspended");
        assert_eq!(ConnectionState::Expired.to_string(), "expired");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }

    #[tokio::test]
    async fn test_node_watch_fires_once() {
        let (tx, rx) = oneshot::channel();
        tx.send(WatchEvent {
            path: "/a".to_string(),
            kind: EventKind::DataChanged,
        })
        .unwrap();

        let ev = rx.await.unwrap();
        assert_eq!(ev.kind, EventKind::DataChanged);
        assert_eq!(ev.path, "/a");
    }
}
