//! Warden API - Coordination-service interface and models
//!
//! This crate provides:
//! - The `CoordinationClient` trait, the seam behind which a
//!   ZooKeeper-class coordination service is consumed
//! - Node metadata, watch-event, and connection-state models
//! - ACL and auth credential types with digest derivation
//! - The `CoordError` taxonomy for service-level failures
//! - `MemoryCoordination`, a single-process implementation used by tests
//!   and local development

pub mod acl;
pub mod client;
pub mod error;
pub mod memory;
pub mod model;

// Re-export commonly used types
pub use acl::{AclEntry, AuthCredential, Permissions};
pub use client::CoordinationClient;
pub use error::CoordError;
pub use memory::MemoryCoordination;
pub use model::{ConnectionState, EventKind, NodeWatch, Stat, WatchEvent};
