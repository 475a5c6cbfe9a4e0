//! Client error types for the Warden primitives

use std::time::Duration;

use warden_api::CoordError;

/// Error type for lock and cached-reader operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error("lock acquire timed out: {0}")]
    AcquireTimeout(String),

    #[error("watch timed out after {0:?}")]
    WatchTimeout(Duration),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed payload at {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// Whether the underlying cause is a missing target node.
    pub fn is_node_missing(&self) -> bool {
        matches!(self, ClientError::Coord(e) if e.is_node_missing())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
