//! Claimant identity and the lock-node wire format

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Identity of one lock claimant plus an optional user payload.
///
/// Serialized as `{"id": <string>, "val": <json>}`, which is exactly the
/// byte content of a lock node. Two identifiers denote the same holder iff
/// their `id` fields are equal; `val` never participates in ownership
/// comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub id: String,
    #[serde(default)]
    pub val: Value,
}

impl Identifier {
    pub fn new(id: &str, val: Value) -> Self {
        Self {
            id: id.to_string(),
            val,
        }
    }

    /// Derive a fresh, globally distinguishing identifier for this process.
    ///
    /// The token embeds the configured node id, the local IP, the pid, and
    /// a random fragment, so concurrent claimants on one host stay apart.
    pub fn derive(node_id: &str) -> Self {
        let fragment = uuid::Uuid::new_v4().simple().to_string();
        let id = format!(
            "{}-{}-{}-{}",
            node_id,
            warden_common::local_ip(),
            std::process::id(),
            &fragment[..8]
        );
        Self::new(&id, Value::Null)
    }

    /// Whether `other` names the same holder as `self`.
    pub fn same_holder(&self, other: &Identifier) -> bool {
        self.id == other.id
    }

    /// Encode to the node wire format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| ClientError::InvalidState(format!("encode identifier: {}", e)))
    }

    /// Decode a node's raw bytes, reporting `path` on malformed payloads.
    pub fn decode(raw: &[u8], path: &str) -> Result<Self> {
        serde_json::from_slice(raw).map_err(|e| ClientError::Decode {
            path: path.to_string(),
            source: e,
        })
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_roundtrip() {
        let ident = Identifier::new("node-1", json!({"x": 1}));
        let raw = ident.encode().unwrap();
        let back = Identifier::decode(&raw, "/a").unwrap();
        assert_eq!(ident, back);
    }

    #[test]
    fn test_decode_malformed() {
        let err = Identifier::decode(b"not json", "/warden/lock/a").unwrap_err();
        assert!(matches!(err, ClientError::Decode { ref path, .. } if path == "/warden/lock/a"));
    }

    #[test]
    fn test_decode_defaults_val() {
        let ident = Identifier::decode(br#"{"id": "n"}"#, "/a").unwrap();
        assert_eq!(ident.id, "n");
        assert_eq!(ident.val, Value::Null);
    }

    #[test]
    fn test_same_holder_ignores_val() {
        let a = Identifier::new("same", json!(1));
        let b = Identifier::new("same", json!(2));
        let c = Identifier::new("other", json!(1));
        assert!(a.same_holder(&b));
        assert!(!a.same_holder(&c));
    }

    #[test]
    fn test_derive_shape() {
        let ident = Identifier::derive("node-9");
        assert!(ident.id.starts_with("node-9-"));
        assert_eq!(ident.val, Value::Null);
        // Two derivations never collide
        assert_ne!(ident.id, Identifier::derive("node-9").id);
    }
}
