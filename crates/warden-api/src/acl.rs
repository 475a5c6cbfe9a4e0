//! ACL and auth credential types
//!
//! The coordination service guards nodes with per-node ACLs in the digest
//! scheme: an entry names a user and the hash of their secret, plus a
//! compact permission string ("cdrwa").

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Node permissions, parsed from the compact "cdrwa" form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub create: bool,
    pub delete: bool,
    pub read: bool,
    pub write: bool,
    pub admin: bool,
}

impl Permissions {
    /// All permissions granted.
    pub fn all() -> Self {
        Self {
            create: true,
            delete: true,
            read: true,
            write: true,
            admin: true,
        }
    }

    /// Parse a compact permission string such as "cdrwa" or "rw".
    ///
    /// Unknown characters are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let mut perms = Self::default();
        for c in s.chars() {
            match c {
                'c' => perms.create = true,
                'd' => perms.delete = true,
                'r' => perms.read = true,
                'w' => perms.write = true,
                'a' => perms.admin = true,
                _ => return None,
            }
        }
        Some(perms)
    }

    /// Render back to the compact form, in canonical "cdrwa" order.
    pub fn as_compact(&self) -> String {
        let mut s = String::new();
        if self.create {
            s.push('c');
        }
        if self.delete {
            s.push('d');
        }
        if self.read {
            s.push('r');
        }
        if self.write {
            s.push('w');
        }
        if self.admin {
            s.push('a');
        }
        s
    }
}

/// One digest-scheme ACL entry attached to a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub username: String,
    pub password: String,
    pub perms: Permissions,
}

impl AclEntry {
    pub fn new(username: &str, password: &str, perms: Permissions) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            perms,
        }
    }

    /// The digest identity for this entry: `user:base64(sha256(user:password))`.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", self.username, self.password).as_bytes());
        let hash = hasher.finalize();
        format!(
            "{}:{}",
            self.username,
            base64::engine::general_purpose::STANDARD.encode(hash)
        )
    }
}

/// Credentials a client presents to the coordination service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCredential {
    pub scheme: String,
    pub username: String,
    pub password: String,
}

impl AuthCredential {
    pub fn digest(username: &str, password: &str) -> Self {
        Self {
            scheme: "digest".to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// The `(scheme, "user:password")` pair handed to the service client.
    pub fn credential(&self) -> (String, String) {
        (
            self.scheme.clone(),
            format!("{}:{}", self.username, self.password),
        )
    }
}
