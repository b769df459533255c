//! Testing utilities for docspace
//!
//! Shared fixtures: temporary roots, managers on a manual clock, and
//! directory assertions.

#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use docspace_core::{Clock, DocspaceConfig, ManualClock, WorkspaceId, WorkspaceManager};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Fixed start time for deterministic clocks (2023-11-14T22:13:20Z)
pub const EPOCH_SECS: i64 = 1_700_000_000;

pub fn test_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(EPOCH_SECS, 0).expect("valid epoch")
}

/// Manager bound to a temporary root that is deleted on drop
pub struct TestSpace {
    pub manager: Arc<WorkspaceManager>,
    pub clock: Arc<ManualClock>,
    _dir: TempDir,
}

impl TestSpace {
    pub fn new() -> Self {
        Self::with_config(DocspaceConfig::new())
    }

    /// `config.root` is replaced by the temporary root
    pub fn with_config(config: DocspaceConfig) -> Self {
        let dir = tempfile::tempdir().expect("create temp root");
        let clock = Arc::new(ManualClock::new(test_epoch()));
        let manager = WorkspaceManager::with_clock(config.with_root(dir.path()), clock.clone())
            .expect("create manager");
        Self {
            manager: Arc::new(manager),
            clock,
            _dir: dir,
        }
    }

    pub fn root(&self) -> &Path {
        self.manager.root()
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }

    /// Create an untracked directory named as if made `age_secs` ago
    pub fn plant_orphan(&self, owner: Option<&str>, age_secs: i64) -> PathBuf {
        let created_at = self.clock.now() - chrono::Duration::seconds(age_secs);
        let name = docspace_core::naming::workspace_dir_name(
            &self.manager.config().prefix,
            owner,
            created_at,
            WorkspaceId::new(),
        );
        let path = self.root().join(name);
        std::fs::create_dir(&path).expect("create orphan");
        path
    }
}

impl Default for TestSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Directories directly under `root`, sorted
pub fn list_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)
        .expect("read root")
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();
    dirs
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write file");
    path
}
