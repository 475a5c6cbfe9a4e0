//! Warden Common - Shared utilities and constants
//!
//! This crate provides the foundational pieces used across all Warden
//! components:
//! - Node-name validation
//! - Local host identity helpers
//! - Common defaults

pub mod utils;

// Re-exports for convenience
pub use utils::{is_valid_name, local_ip, local_node_id};

use std::time::Duration;

/// Default directory for lock nodes
pub const DEFAULT_LOCK_DIR: &str = "/warden/lock/";

/// Default directory for record nodes
pub const DEFAULT_RECORD_DIR: &str = "/warden/record/";

/// Default directory for sequence nodes
pub const DEFAULT_SEQ_DIR: &str = "/warden/seq/";

/// Default timeout for a blocking lock acquisition
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
