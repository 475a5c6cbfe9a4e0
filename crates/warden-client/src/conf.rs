//! Path configuration
//!
//! `PathConfig` maps logical lock/record names to absolute node paths and
//! supplies the ACL/auth material attached to created nodes. Resolution is
//! a pure function of the configuration; nothing here touches the network.

use serde::{Deserialize, Serialize};

use warden_api::{AclEntry, AuthCredential, Permissions};
use warden_common::{
    DEFAULT_LOCK_DIR, DEFAULT_RECORD_DIR, DEFAULT_SEQ_DIR, is_valid_name, local_node_id,
};

use crate::error::{ClientError, Result};

/// One configured ACL rule, perms in the compact "cdrwa" form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    pub username: String,
    pub password: String,
    pub perms: String,
}

/// Configuration for the coordination namespace a client operates in.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Coordination-service addresses, "host:port,host:port".
    pub hosts: String,
    /// Directory for lock nodes; must end with '/'.
    pub lock_dir: String,
    /// Directory for record nodes; must end with '/'.
    pub record_dir: String,
    /// Directory for sequence nodes; must end with '/'.
    pub seq_dir: String,
    /// Identity of this node, embedded in derived claimant identifiers.
    pub node_id: String,
    /// Credentials presented to the service, when authentication is on.
    pub auth: Option<AuthCredential>,
    /// ACL rules attached to created nodes.
    pub acl: Vec<AclRule>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            hosts: "127.0.0.1:2181".to_string(),
            lock_dir: DEFAULT_LOCK_DIR.to_string(),
            record_dir: DEFAULT_RECORD_DIR.to_string(),
            seq_dir: DEFAULT_SEQ_DIR.to_string(),
            node_id: local_node_id(),
            auth: None,
            acl: Vec::new(),
        }
    }
}

impl PathConfig {
    /// Resolve a lock name to its absolute node path.
    ///
    /// An empty name resolves to the lock directory itself.
    pub fn lock(&self, name: &str) -> Result<String> {
        Self::join(&self.lock_dir, name)
    }

    /// Resolve a record name to its absolute node path.
    pub fn record(&self, name: &str) -> Result<String> {
        Self::join(&self.record_dir, name)
    }

    /// Resolve a sequence name to its absolute node path.
    pub fn seq(&self, name: &str) -> Result<String> {
        Self::join(&self.seq_dir, name)
    }

    /// The digest ACL entries for created nodes.
    pub fn digest_acl(&self) -> Result<Vec<AclEntry>> {
        self.acl
            .iter()
            .map(|rule| {
                let perms = Permissions::parse(&rule.perms).ok_or_else(|| {
                    ClientError::Config(format!(
                        "invalid permission string '{}' for user '{}'",
                        rule.perms, rule.username
                    ))
                })?;
                Ok(AclEntry::new(&rule.username, &rule.password, perms))
            })
            .collect()
    }

    /// The `(scheme, "user:password")` pair for client authentication.
    pub fn auth_credential(&self) -> Option<(String, String)> {
        self.auth.as_ref().map(|a| a.credential())
    }

    fn join(dir: &str, name: &str) -> Result<String> {
        if !is_valid_name(name) {
            return Err(ClientError::Config(format!("invalid node name: {}", name)));
        }
        Ok(format!("{}{}", dir, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specified() -> PathConfig {
        PathConfig {
            hosts: "hosts".to_string(),
            lock_dir: "lock_dir/".to_string(),
            record_dir: "record_dir/".to_string(),
            seq_dir: "seq_dir/".to_string(),
            node_id: "node_id".to_string(),
            auth: Some(AuthCredential::digest("a", "b")),
            acl: vec![
                AclRule {
                    username: "foo".to_string(),
                    password: "bar".to_string(),
                    perms: "cd".to_string(),
                },
                AclRule {
                    username: "xp".to_string(),
                    password: "123".to_string(),
                    perms: "cdrwa".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_specified_resolution() {
        let c = specified();
        assert_eq!(c.hosts, "hosts");
        assert_eq!(c.node_id, "node_id");

        assert_eq!(c.lock("").unwrap(), "lock_dir/");
        assert_eq!(c.lock("a").unwrap(), "lock_dir/a");
        assert_eq!(c.record("").unwrap(), "record_dir/");
        assert_eq!(c.record("a").unwrap(), "record_dir/a");
        assert_eq!(c.seq("").unwrap(), "seq_dir/");
        assert_eq!(c.seq("a").unwrap(), "seq_dir/a");
    }

    #[test]
    fn test_digest_acl() {
        let c = specified();
        let acl = c.digest_acl().unwrap();
        assert_eq!(acl.len(), 2);
        assert_eq!(acl[0].username, "foo");
        assert_eq!(acl[0].perms, Permissions::parse("cd").unwrap());
        assert_eq!(acl[1].perms, Permissions::all());
    }

    #[test]
    fn test_digest_acl_invalid_perms() {
        let mut c = specified();
        c.acl[0].perms = "xyz".to_string();
        assert!(matches!(c.digest_acl(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_auth_credential() {
        let c = specified();
        assert_eq!(
            c.auth_credential(),
            Some(("digest".to_string(), "a:b".to_string()))
        );
        assert_eq!(PathConfig::default().auth_credential(), None);
    }

    #[test]
    fn test_default_dirs() {
        let c = PathConfig::default();
        assert_eq!(c.lock("a").unwrap(), "/warden/lock/a");
        assert_eq!(c.record("a").unwrap(), "/warden/record/a");
        assert_eq!(c.seq("a").unwrap(), "/warden/seq/a");
        assert!(!c.node_id.is_empty());
    }

    #[test]
    fn test_invalid_name_rejected() {
        let c = PathConfig::default();
        assert!(matches!(c.lock("../escape"), Err(ClientError::Config(_))));
        assert!(matches!(c.lock("a/b"), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_deserialize_partial() {
        let c: PathConfig =
            serde_json::from_str(r#"{"lock_dir": "custom/", "node_id": "n1"}"#).unwrap();
        assert_eq!(c.lock_dir, "custom/");
        assert_eq!(c.node_id, "n1");
        assert_eq!(c.record_dir, DEFAULT_RECORD_DIR);
    }
}
