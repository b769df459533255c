//! Core types for docspace
//!
//! Defines the workspace descriptor handed to callers, its identifier, and
//! the bookkeeping types returned by the manager.

use crate::state::WorkspaceState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use ulid::Ulid;

/// Unique workspace identifier (ULID: timestamp + randomness)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub Ulid);

impl WorkspaceId {
    /// Generate new workspace ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WorkspaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of one isolated workspace directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Identity, never reused
    pub id: WorkspaceId,
    /// Absolute directory path
    pub path: PathBuf,
    /// Audit tag supplied by the caller
    pub owner: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time after which the reaper may reclaim the directory
    pub expires_at: DateTime<Utc>,
    /// Lifecycle state at the time the descriptor was taken
    pub state: WorkspaceState,
}

impl Workspace {
    /// Whether `now` is past the expiry deadline
    #[inline]
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Age at `now`, zero if the clock went backwards
    #[inline]
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }
}

/// Result of a release request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// This call removed the directory
    Removed,
    /// Workspace was unknown or already released/expired
    AlreadyGone,
    /// Removal failed; the workspace stays active for the reaper to retry
    Retained,
}

/// Manager counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    /// Workspaces created
    pub created: u64,
    /// Workspaces removed by release
    pub released: u64,
    /// Workspaces removed by the reaper
    pub expired: u64,
    /// Failed removal attempts
    pub reclaim_failures: u64,
    /// Currently active workspaces
    pub active: usize,
}
