//! Workspace manager
//!
//! Allocates, tracks and reclaims isolated per-request directories:
//! - Collision-free creation under a single root
//! - Idempotent release, safe against a concurrent reaper
//! - Containment validation of externally supplied paths
//! - Basename-only document helpers inside active workspaces
//!
//! Every tracking entry guards its state with its own mutex. The
//! check-remove-mark sequence runs under that lock, so exactly one of
//! several racing releases (or the reaper) performs the removal. Entry
//! handles are always cloned out of the map before an entry lock is taken.

use crate::clock::{Clock, SystemClock};
use crate::config::DocspaceConfig;
use crate::error::{CreationError, DocspaceError, ReclaimError, ValidationError};
use crate::naming::{sanitize_owner, workspace_dir_name};
use crate::path_guard;
use crate::state::{validate_transition, WorkspaceState};
use crate::types::{ManagerStats, ReleaseOutcome, Workspace, WorkspaceId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Tracking entry for one workspace
#[derive(Debug)]
pub(crate) struct Entry {
    workspace: Workspace,
    state: Mutex<WorkspaceState>,
}

impl Entry {
    pub(crate) fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Descriptor with the current state, `None` once terminal
    fn snapshot_if_active(&self) -> Option<Workspace> {
        let state = self.state.lock();
        (*state == WorkspaceState::Active).then(|| self.workspace.clone())
    }
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    released: AtomicU64,
    expired: AtomicU64,
    reclaim_failures: AtomicU64,
}

/// Owner of all workspace directories below one root
#[derive(Debug)]
pub struct WorkspaceManager {
    config: DocspaceConfig,
    root: PathBuf,
    clock: Arc<dyn Clock>,
    entries: DashMap<PathBuf, Arc<Entry>>,
    counters: Counters,
}

impl WorkspaceManager {
    /// Create manager on the system clock
    ///
    /// # Errors
    /// See [`WorkspaceManager::with_clock`].
    pub fn new(config: DocspaceConfig) -> Result<Self, CreationError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create manager with an injected clock
    ///
    /// # Errors
    /// - `CreationError::InvalidConfig` if `config` fails validation
    /// - `CreationError::RootUnavailable` if the root cannot be created or
    ///   resolved
    pub fn with_clock(config: DocspaceConfig, clock: Arc<dyn Clock>) -> Result<Self, CreationError> {
        config.validate()?;
        let unavailable = |source| CreationError::RootUnavailable {
            path: config.root.clone(),
            source,
        };
        fs::create_dir_all(&config.root).map_err(unavailable)?;
        let root = fs::canonicalize(&config.root).map_err(unavailable)?;

        tracing::debug!(root = %root.display(), "workspace manager ready");

        Ok(Self {
            config,
            root,
            clock,
            entries: DashMap::new(),
            counters: Counters::default(),
        })
    }

    /// Canonical workspace root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &DocspaceConfig {
        &self.config
    }

    /// Current time according to the injected clock
    #[inline]
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create a workspace that the reaper reclaims after the sweep TTL
    ///
    /// # Errors
    /// Returns `CreationError` if the directory cannot be created.
    pub fn create(&self, owner: Option<&str>) -> Result<Workspace, CreationError> {
        self.create_with_ttl(owner, self.config.sweep_ttl())
    }

    /// Create a workspace expiring `ttl` after creation
    ///
    /// # Errors
    /// - `CreationError::Io` on permission, disk or other filesystem failures
    /// - `CreationError::CollisionExhausted` if every generated name existed
    pub fn create_with_ttl(
        &self,
        owner: Option<&str>,
        ttl: Duration,
    ) -> Result<Workspace, CreationError> {
        let tag = owner.and_then(sanitize_owner);
        let attempts = self.config.max_create_attempts;

        for attempt in 1..=attempts {
            let id = WorkspaceId::new();
            let created_at = self.clock.now();
            let name = workspace_dir_name(&self.config.prefix, tag.as_deref(), created_at, id);
            let path = self.root.join(name);

            // Non-recursive create so an existing directory is reported, not reused.
            match fs::create_dir(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::warn!(path = %path.display(), attempt, "workspace name collision");
                    continue;
                }
                Err(source) => return Err(CreationError::Io { path, source }),
            }

            let workspace = Workspace {
                id,
                path: path.clone(),
                owner: owner.map(str::to_string),
                created_at,
                expires_at: expiry(created_at, ttl),
                state: WorkspaceState::Active,
            };
            let entry = Arc::new(Entry {
                workspace: workspace.clone(),
                state: Mutex::new(WorkspaceState::Active),
            });
            self.entries.insert(path, entry);
            self.counters.created.fetch_add(1, Ordering::Relaxed);

            tracing::info!(
                id = %workspace.id,
                path = %workspace.path.display(),
                owner = workspace.owner.as_deref().unwrap_or("-"),
                "created workspace"
            );
            return Ok(workspace);
        }

        Err(CreationError::CollisionExhausted { attempts })
    }

    /// Release a workspace; repeated or concurrent calls are harmless
    pub fn release(&self, path: &Path) -> ReleaseOutcome {
        let Some(entry) = self.lookup(path) else {
            return ReleaseOutcome::AlreadyGone;
        };
        match self.reclaim(&entry, WorkspaceState::Released) {
            Ok(true) => ReleaseOutcome::Removed,
            Ok(false) => ReleaseOutcome::AlreadyGone,
            Err(err) => {
                tracing::warn!(error = %err, "release failed, leaving workspace for the reaper");
                ReleaseOutcome::Retained
            }
        }
    }

    /// Release `path` after `delay` on the tokio runtime
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn release_after(self: &Arc<Self>, path: PathBuf, delay: Duration) -> JoinHandle<ReleaseOutcome> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::task::spawn_blocking(move || manager.release(&path))
                .await
                .unwrap_or(ReleaseOutcome::Retained)
        })
    }

    /// Release `path` once the configured request TTL has elapsed
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn schedule_request_cleanup(self: &Arc<Self>, path: PathBuf) -> JoinHandle<ReleaseOutcome> {
        let delay = self.config.request_ttl();
        tracing::debug!(path = %path.display(), delay_secs = delay.as_secs(), "scheduled request cleanup");
        self.release_after(path, delay)
    }

    /// Confirm that `path` is a tracked, active workspace
    ///
    /// Returns `Ok(None)` for contained paths that are not active workspaces.
    ///
    /// # Errors
    /// Returns `ValidationError` if the path fails containment checks.
    pub fn resolve(&self, path: &Path) -> Result<Option<Workspace>, ValidationError> {
        let normalized = path_guard::contain(&self.root, path)?;
        Ok(self
            .entry(&normalized)
            .and_then(|entry| entry.snapshot_if_active()))
    }

    /// Containment check alone, returning the normalised path
    ///
    /// # Errors
    /// Returns `ValidationError` if the path is not strictly inside the root.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ValidationError> {
        path_guard::contain(&self.root, path)
    }

    /// Allocate a workspace and return its path
    ///
    /// # Errors
    /// Returns `CreationError` if the directory cannot be created.
    pub fn create_workspace(&self, owner: Option<&str>) -> Result<PathBuf, CreationError> {
        self.create(owner).map(|ws| ws.path)
    }

    /// Release a workspace path, ignoring the outcome
    pub fn release_workspace(&self, path: &Path) {
        let outcome = self.release(path);
        tracing::trace!(path = %path.display(), ?outcome, "release_workspace");
    }

    /// Whether `path` may be trusted as lying inside the workspace root
    #[must_use]
    pub fn validate_workspace_path(&self, path: &Path) -> bool {
        match self.validate_path(path) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "rejected workspace path");
                false
            }
        }
    }

    /// Write `contents` to `file_name` inside an active workspace
    ///
    /// Only the final component of `file_name` is used.
    ///
    /// # Errors
    /// - `ValidationError` if the workspace is not active or the name is invalid
    /// - `DocspaceError::Io` if the write fails
    pub fn write_document(
        &self,
        workspace: &Path,
        file_name: &str,
        contents: &[u8],
    ) -> Result<PathBuf, DocspaceError> {
        let name = path_guard::base_name(file_name)?;
        self.with_active(workspace, |ws| {
            let target = ws.path.join(name);
            fs::write(&target, contents).map_err(|e| DocspaceError::io(&target, e))?;
            tracing::debug!(path = %target.display(), bytes = contents.len(), "stored document");
            Ok(target)
        })
    }

    /// Remove `file_name` from an active workspace
    ///
    /// Returns `false` if no such file existed.
    ///
    /// # Errors
    /// - `ValidationError` if the workspace is not active or the name is invalid
    /// - `DocspaceError::Io` if the removal fails
    pub fn remove_document(&self, workspace: &Path, file_name: &str) -> Result<bool, DocspaceError> {
        let name = path_guard::base_name(file_name)?;
        self.with_active(workspace, |ws| {
            let target = ws.path.join(name);
            match fs::remove_file(&target) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(DocspaceError::io(&target, e)),
            }
        })
    }

    /// Files stored directly in an active workspace, sorted
    ///
    /// # Errors
    /// - `ValidationError` if the workspace is not active
    /// - `DocspaceError::Io` if the listing fails
    pub fn list_documents(&self, workspace: &Path) -> Result<Vec<PathBuf>, DocspaceError> {
        self.with_active(workspace, |ws| {
            let read = fs::read_dir(&ws.path).map_err(|e| DocspaceError::io(&ws.path, e))?;
            let mut files = Vec::new();
            for entry in read {
                let entry = entry.map_err(|e| DocspaceError::io(&ws.path, e))?;
                if entry.file_type().is_ok_and(|t| t.is_file()) {
                    files.push(entry.path());
                }
            }
            files.sort();
            Ok(files)
        })
    }

    /// Look up an active workspace by id
    #[must_use]
    pub fn get(&self, id: WorkspaceId) -> Option<Workspace> {
        self.tracked()
            .into_iter()
            .find(|entry| entry.workspace.id == id)
            .and_then(|entry| entry.snapshot_if_active())
    }

    /// All active workspaces, oldest first
    #[must_use]
    pub fn active(&self) -> Vec<Workspace> {
        let mut active: Vec<Workspace> = self
            .tracked()
            .iter()
            .filter_map(|entry| entry.snapshot_if_active())
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        active
    }

    /// Number of active workspaces
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tracked()
            .iter()
            .filter(|entry| *entry.state.lock() == WorkspaceState::Active)
            .count()
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            created: self.counters.created.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            reclaim_failures: self.counters.reclaim_failures.load(Ordering::Relaxed),
            active: self.active_count(),
        }
    }

    /// Snapshot of entry handles; no map lock is held afterwards
    pub(crate) fn tracked(&self) -> Vec<Arc<Entry>> {
        self.entries.iter().map(|r| Arc::clone(r.value())).collect()
    }

    pub(crate) fn is_tracked(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Reaper transition: remove an active entry as expired
    pub(crate) fn expire(&self, entry: &Arc<Entry>) -> Result<bool, ReclaimError> {
        self.reclaim(entry, WorkspaceState::Expired)
    }

    /// Single atomic transition out of `Active`
    ///
    /// Returns `Ok(false)` when the entry was already terminal.
    fn reclaim(&self, entry: &Arc<Entry>, to: WorkspaceState) -> Result<bool, ReclaimError> {
        let mut state = entry.state.lock();
        if validate_transition(*state, to).is_err() {
            return Ok(false);
        }

        let path = &entry.workspace.path;
        match fs::remove_dir_all(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "workspace directory already gone");
            }
            Err(source) => {
                self.counters.reclaim_failures.fetch_add(1, Ordering::Relaxed);
                return Err(ReclaimError::Remove {
                    path: path.clone(),
                    source,
                });
            }
        }

        *state = to;
        self.entries.remove_if(path, |_, current| Arc::ptr_eq(current, entry));
        drop(state);

        let counter = match to {
            WorkspaceState::Expired => &self.counters.expired,
            _ => &self.counters.released,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            id = %entry.workspace.id,
            path = %path.display(),
            owner = entry.workspace.owner.as_deref().unwrap_or("-"),
            state = %to,
            "reclaimed workspace"
        );
        Ok(true)
    }

    fn entry(&self, normalized: &Path) -> Option<Arc<Entry>> {
        self.entries.get(normalized).map(|r| Arc::clone(r.value()))
    }

    fn lookup(&self, path: &Path) -> Option<Arc<Entry>> {
        match path_guard::contain(&self.root, path) {
            Ok(normalized) => self.entry(&normalized),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "release of foreign path ignored");
                None
            }
        }
    }

    /// Run `f` while holding the entry lock of an active workspace
    fn with_active<R>(
        &self,
        path: &Path,
        f: impl FnOnce(&Workspace) -> Result<R, DocspaceError>,
    ) -> Result<R, DocspaceError> {
        let normalized = path_guard::contain(&self.root, path)?;
        let entry = self
            .entry(&normalized)
            .ok_or_else(|| ValidationError::UnknownWorkspace(normalized.clone()))?;
        let state = entry.state.lock();
        if *state != WorkspaceState::Active {
            return Err(ValidationError::UnknownWorkspace(normalized).into());
        }
        let result = f(&entry.workspace);
        drop(state);
        result
    }
}

fn expiry(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| created_at.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manager() -> (tempfile::TempDir, WorkspaceManager) {
        let dir = tempfile::tempdir().unwrap();
        let config = DocspaceConfig::new().with_root(dir.path().join("root"));
        let manager = WorkspaceManager::new(config).unwrap();
        (dir, manager)
    }

    #[test]
    fn create_makes_directory_under_root() {
        let (_dir, manager) = manager();
        let ws = manager.create(Some("user123")).unwrap();

        assert!(ws.path.is_dir());
        assert!(ws.path.starts_with(manager.root()));
        assert_eq!(ws.state, WorkspaceState::Active);
        assert_eq!(ws.owner.as_deref(), Some("user123"));

        let name = ws.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("docs_user123_"));
        assert!(name.ends_with(&ws.id.to_string()));
    }

    #[test]
    fn create_uses_sweep_ttl_by_default() {
        let (_dir, manager) = manager();
        let ws = manager.create(None).unwrap();
        assert_eq!(ws.expires_at - ws.created_at, chrono::Duration::hours(2));

        let short = manager.create_with_ttl(None, Duration::from_secs(300)).unwrap();
        assert_eq!(short.expires_at - short.created_at, chrono::Duration::minutes(5));
    }

    #[test]
    fn huge_ttl_saturates() {
        let (_dir, manager) = manager();
        let ws = manager.create_with_ttl(None, Duration::MAX).unwrap();
        assert_eq!(ws.expires_at, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn release_is_idempotent() {
        let (_dir, manager) = manager();
        let ws = manager.create(None).unwrap();

        assert_eq!(manager.release(&ws.path), ReleaseOutcome::Removed);
        assert!(!ws.path.exists());
        assert_eq!(manager.release(&ws.path), ReleaseOutcome::AlreadyGone);
        assert_eq!(manager.release(Path::new("/etc")), ReleaseOutcome::AlreadyGone);

        let stats = manager.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.active, 0);
    }

    #[test]
    fn release_retains_workspace_when_removal_fails() {
        let (_dir, manager) = manager();
        let ws = manager.create(None).unwrap();
        fs::remove_dir(&ws.path).unwrap();
        fs::write(&ws.path, b"not a directory").unwrap();

        assert_eq!(manager.release(&ws.path), ReleaseOutcome::Retained);
        assert_eq!(
            manager.resolve(&ws.path).unwrap().map(|w| w.state),
            Some(WorkspaceState::Active)
        );
        let stats = manager.stats();
        assert_eq!(stats.reclaim_failures, 1);
        assert_eq!(stats.released, 0);
        assert_eq!(stats.active, 1);

        fs::remove_file(&ws.path).unwrap();
        assert_eq!(manager.release(&ws.path), ReleaseOutcome::Removed);
    }

    #[test]
    fn constructor_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let mut no_attempts = DocspaceConfig::new();
        no_attempts.max_create_attempts = 0;

        for config in [
            DocspaceConfig::new().with_prefix("../escaped"),
            DocspaceConfig::new().with_prefix("docs_x"),
            DocspaceConfig::new().with_sweep_interval(Duration::ZERO),
            no_attempts,
        ] {
            let result = WorkspaceManager::new(config.with_root(&root));
            assert!(matches!(result, Err(CreationError::InvalidConfig(_))));
        }
        assert!(!root.exists());
        assert!(!dir.path().join("escaped").exists());
    }

    #[test]
    fn release_tolerates_missing_directory() {
        let (_dir, manager) = manager();
        let ws = manager.create(None).unwrap();
        fs::remove_dir_all(&ws.path).unwrap();

        assert_eq!(manager.release(&ws.path), ReleaseOutcome::Removed);
        assert!(manager.resolve(&ws.path).unwrap().is_none());
    }

    #[test]
    fn resolve_and_validate() {
        let (_dir, manager) = manager();
        let ws = manager.create(None).unwrap();

        assert_eq!(manager.resolve(&ws.path).unwrap(), Some(ws.clone()));
        assert!(manager.validate_workspace_path(&ws.path));
        assert!(!manager.validate_workspace_path(manager.root()));
        assert!(!manager.validate_workspace_path(&ws.path.join("../../escape")));

        let untracked = manager.root().join("docs_1_01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(manager.resolve(&untracked).unwrap(), None);
        assert!(matches!(
            manager.resolve(Path::new("/etc/passwd")),
            Err(ValidationError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn documents_are_confined_to_basename() {
        let (_dir, manager) = manager();
        let ws = manager.create(None).unwrap();

        let stored = manager
            .write_document(&ws.path, "../../notes.txt", b"hello")
            .unwrap();
        assert_eq!(stored, ws.path.join("notes.txt"));
        assert_eq!(fs::read(&stored).unwrap(), b"hello");

        assert_eq!(manager.list_documents(&ws.path).unwrap(), vec![stored.clone()]);
        assert!(manager.remove_document(&ws.path, "notes.txt").unwrap());
        assert!(!manager.remove_document(&ws.path, "notes.txt").unwrap());
        assert!(matches!(
            manager.write_document(&ws.path, "..", b""),
            Err(DocspaceError::Validation(ValidationError::InvalidFileName(_)))
        ));
    }

    #[test]
    fn documents_require_active_workspace() {
        let (_dir, manager) = manager();
        let ws = manager.create(None).unwrap();
        manager.release(&ws.path);

        assert!(matches!(
            manager.write_document(&ws.path, "a.txt", b"x"),
            Err(DocspaceError::Validation(ValidationError::UnknownWorkspace(_)))
        ));
    }

    #[test]
    fn clock_drives_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let manager = WorkspaceManager::with_clock(
            DocspaceConfig::new().with_root(dir.path()),
            clock.clone(),
        )
        .unwrap();

        let ws = manager.create(None).unwrap();
        assert_eq!(ws.created_at, start);
        assert!(ws
            .path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("docs_1700000000_"));
        assert_eq!(manager.get(ws.id), Some(ws));
    }

    #[cfg(unix)]
    #[test]
    fn create_surfaces_permission_errors() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, manager) = manager();
        fs::set_permissions(manager.root(), fs::Permissions::from_mode(0o500)).unwrap();
        let result = manager.create(None);
        fs::set_permissions(manager.root(), fs::Permissions::from_mode(0o700)).unwrap();

        // Root bypasses permission bits; only assert when the check applied.
        if let Err(err) = result {
            assert!(matches!(err, CreationError::Io { .. }));
        }
    }
}
