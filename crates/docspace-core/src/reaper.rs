//! Background reaper
//!
//! Periodically reclaims expired workspaces:
//! 1. Snapshot tracked entries (the map is never locked across removals)
//! 2. Expire each active entry whose deadline has passed
//! 3. Optionally remove stale untracked directories left by earlier processes
//!
//! Individual failures become [`ReclamationWarning`]s; a pass always runs to
//! completion.

use crate::error::{ReclaimError, ReclamationWarning};
use crate::manager::WorkspaceManager;
use crate::naming::parse_dir_name;
use crate::types::WorkspaceId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// One reclaimed directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reclaimed {
    /// Workspace id (parsed from the name for untracked directories)
    pub id: Option<WorkspaceId>,
    /// Removed directory
    pub path: PathBuf,
    /// Owner tag, if known
    pub owner: Option<String>,
    /// Age at reclamation
    pub age_secs: u64,
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Clock reading used for expiry decisions
    pub started_at: DateTime<Utc>,
    /// Tracked entries examined
    pub scanned: usize,
    /// Tracked workspaces transitioned to expired
    pub expired: Vec<Reclaimed>,
    /// Untracked stale directories removed
    pub orphans_removed: Vec<Reclaimed>,
    /// Failures that did not stop the pass
    pub warnings: Vec<ReclamationWarning>,
}

impl SweepReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            scanned: 0,
            expired: Vec::new(),
            orphans_removed: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Total directories removed in this pass
    #[inline]
    #[must_use]
    pub fn removed(&self) -> usize {
        self.expired.len() + self.orphans_removed.len()
    }
}

/// Totals across all passes of a running reaper
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReaperSummary {
    /// Completed passes
    pub passes: u64,
    /// Tracked workspaces expired
    pub expired: usize,
    /// Orphans removed
    pub orphans_removed: usize,
    /// Warnings recorded
    pub warnings: usize,
}

impl ReaperSummary {
    fn record(&mut self, report: &SweepReport) {
        self.passes += 1;
        self.expired += report.expired.len();
        self.orphans_removed += report.orphans_removed.len();
        self.warnings += report.warnings.len();
    }
}

/// Periodic reclamation task bound to one manager
#[derive(Debug)]
pub struct Reaper {
    manager: Arc<WorkspaceManager>,
    interval: Duration,
}

impl Reaper {
    /// Reaper using the manager's configured sweep interval
    #[must_use]
    pub fn new(manager: Arc<WorkspaceManager>) -> Self {
        let interval = manager.config().sweep_interval();
        Self { manager, interval }
    }

    /// Override the sweep interval
    #[inline]
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sweep interval
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one pass synchronously
    pub fn sweep(&self) -> SweepReport {
        let now = self.manager.now();
        let mut report = SweepReport::new(now);

        for entry in self.manager.tracked() {
            report.scanned += 1;
            let ws = entry.workspace();
            if !ws.is_expired(now) {
                continue;
            }
            match self.manager.expire(&entry) {
                Ok(true) => {
                    let age_secs = ws.age(now).as_secs();
                    tracing::info!(
                        path = %ws.path.display(),
                        owner = ws.owner.as_deref().unwrap_or("-"),
                        age_secs,
                        "reaped expired workspace"
                    );
                    report.expired.push(Reclaimed {
                        id: Some(ws.id),
                        path: ws.path.clone(),
                        owner: ws.owner.clone(),
                        age_secs,
                    });
                }
                // Released by a caller between the snapshot and the lock.
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(
                        path = %ws.path.display(),
                        owner = ws.owner.as_deref().unwrap_or("-"),
                        error = %err,
                        "could not reclaim expired workspace"
                    );
                    report
                        .warnings
                        .push(ReclamationWarning::from_error(&err, ws.owner.clone()));
                }
            }
        }

        if self.manager.config().reap_orphans {
            self.sweep_orphans(now, &mut report);
        }

        tracing::debug!(
            scanned = report.scanned,
            expired = report.expired.len(),
            orphans = report.orphans_removed.len(),
            warnings = report.warnings.len(),
            "sweep pass complete"
        );
        report
    }

    /// Remove untracked, prefixed directories older than the sweep TTL
    fn sweep_orphans(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let config = self.manager.config();
        let Some(cutoff) = chrono::Duration::from_std(config.sweep_ttl())
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return;
        };

        let root = self.manager.root();
        let listing = match fs::read_dir(root) {
            Ok(listing) => listing,
            Err(source) => {
                let err = ReclaimError::List {
                    path: root.to_path_buf(),
                    source,
                };
                tracing::warn!(error = %err, "could not list workspace root");
                report.warnings.push(ReclamationWarning::from_error(&err, None));
                return;
            }
        };

        let marker = format!("{}_", config.prefix);
        for dirent in listing.flatten() {
            // DirEntry::file_type does not follow links, so links are never removed.
            if !dirent.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let path = dirent.path();
            if self.manager.is_tracked(&path) {
                continue;
            }
            let Some(name) = dirent.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.starts_with(&marker) {
                continue;
            }

            let parsed = parse_dir_name(&config.prefix, &name);
            let created_at = parsed.as_ref().map(|p| p.created_at).or_else(|| {
                dirent
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from)
            });
            let Some(created_at) = created_at else {
                continue;
            };
            if created_at >= cutoff {
                continue;
            }

            let owner = parsed.as_ref().and_then(|p| p.owner.clone());
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    let age_secs = (now - created_at).to_std().unwrap_or_default().as_secs();
                    tracing::info!(
                        path = %path.display(),
                        owner = owner.as_deref().unwrap_or("-"),
                        age_secs,
                        "removed orphaned workspace"
                    );
                    report.orphans_removed.push(Reclaimed {
                        id: parsed.map(|p| WorkspaceId(p.id)),
                        path,
                        owner,
                        age_secs,
                    });
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    let err = ReclaimError::Remove { path, source };
                    tracing::warn!(error = %err, "could not remove orphaned workspace");
                    report.warnings.push(ReclamationWarning::from_error(&err, owner));
                }
            }
        }
    }

    /// Start the periodic loop on the current tokio runtime
    ///
    /// The first pass runs immediately. Dropping the returned handle stops
    /// the loop after the pass in progress.
    #[must_use]
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (passes_tx, passes_rx) = watch::channel(0u64);
        let reaper = Arc::new(self);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reaper.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut summary = ReaperSummary::default();

            tracing::info!(
                root = %reaper.manager.root().display(),
                interval_secs = reaper.interval.as_secs(),
                "reaper started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let pass = Arc::clone(&reaper);
                        match tokio::task::spawn_blocking(move || pass.sweep()).await {
                            Ok(report) => {
                                summary.record(&report);
                                passes_tx.send_replace(summary.passes);
                            }
                            Err(err) => tracing::error!(error = %err, "sweep pass panicked"),
                        }
                    }
                }
            }

            tracing::info!(passes = summary.passes, "reaper stopped");
            summary
        });

        ReaperHandle {
            shutdown: shutdown_tx,
            passes: passes_rx,
            join,
        }
    }
}

/// Control handle for a spawned reaper
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown: oneshot::Sender<()>,
    passes: watch::Receiver<u64>,
    join: JoinHandle<ReaperSummary>,
}

impl ReaperHandle {
    /// Receiver of the completed pass count
    #[must_use]
    pub fn passes(&self) -> watch::Receiver<u64> {
        self.passes.clone()
    }

    /// Wait until at least `n` passes have completed
    pub async fn wait_for_passes(&mut self, n: u64) {
        // An error means the loop ended; there is nothing left to wait for.
        let _ = self.passes.wait_for(|done| *done >= n).await;
    }

    /// Stop the loop and return its totals
    pub async fn shutdown(self) -> ReaperSummary {
        let _ = self.shutdown.send(());
        match self.join.await {
            Ok(summary) => summary,
            Err(err) => {
                tracing::error!(error = %err, "reaper task failed");
                ReaperSummary::default()
            }
        }
    }
}
