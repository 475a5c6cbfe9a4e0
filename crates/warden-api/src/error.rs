//! Service-level error types for coordination operations

/// Error type for coordination-service operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    #[error("node not found: {0}")]
    NodeMissing(String),

    #[error("node already exists: {0}")]
    NodeAlreadyExists(String),

    #[error("version mismatch on {path}: expected {expected}, actual {actual}")]
    VersionMismatch {
        path: String,
        expected: i64,
        actual: i64,
    },

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("client closed")]
    Closed,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CoordError {
    /// Whether this error means the target node does not exist.
    pub fn is_node_missing(&self) -> bool {
        matches!(self, CoordError::NodeMissing(_))
    }

    /// Whether this error means a node was already present on create.
    pub fn is_node_exists(&self) -> bool {
        matches!(self, CoordError::NodeAlreadyExists(_))
    }
}

pub type Result<T> = std::result::Result<T, CoordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoordError::NodeMissing("/warden/lock/a".to_string());
        assert_eq!(err.to_string(), "node not found: /warden/lock/a");

        let err = CoordError::NodeAlreadyExists("/warden/lock/a".to_string());
        assert_eq!(err.to_string(), "node already exists: /warden/lock/a");

        let err = CoordError::VersionMismatch {
            path: "/warden/lock/a".to_string(),
            expected: 3,
            actual: 5,
        };
        assert_eq!(
            err.to_string(),
            "version mismatch on /warden/lock/a: expected 3, actual 5"
        );

        let err = CoordError::ConnectionLost("stream reset".to_string());
        assert_eq!(err.to_string(), "connection lost: stream reset");
    }

    #[test]
    fn test_predicates() {
        assert!(CoordError::NodeMissing("x".into()).is_node_missing());
        assert!(!CoordError::NodeMissing("x".into()).is_node_exists());
        assert!(CoordError::NodeAlreadyExists("x".into()).is_node_exists());
        assert!(!CoordError::Closed.is_node_missing());
    }
}
