//! Warden Client - distributed coordination primitives
//!
//! This crate provides:
//! - `DistributedLock`: mutual exclusion over one coordination-service
//!   node, with watch-driven reacquisition, connection-loss detection, and
//!   crash-safe release via ephemeral nodes
//! - `CachedReader`: a locally mirrored, watch-refreshed view of a remote
//!   JSON node with push (listener) and pull (blocking watch) change
//!   notification
//! - `Identifier` and `PathConfig`: claimant identity and namespace
//!   resolution shared by both

pub mod conf;
pub mod error;
pub mod identifier;
pub mod listener;
pub mod lock;
pub mod reader;

// Re-exports for convenience
pub use conf::{AclRule, PathConfig};
pub use error::{ClientError, Result};
pub use identifier::Identifier;
pub use listener::{ChangeEvent, ChangeListener, FnChangeListener};
pub use lock::{DistributedLock, LockOptions, OnLost};
pub use reader::CachedReader;
