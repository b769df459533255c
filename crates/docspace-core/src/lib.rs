//! docspace core - isolated per-request workspaces
//!
//! Provides:
//! - A [`WorkspaceManager`] that creates, tracks and releases temporary
//!   directories below one root
//! - A [`Reaper`] that periodically reclaims expired workspaces and stale
//!   leftovers from earlier processes
//! - Containment validation for paths supplied by callers
//!
//! # Example
//!
//! ```rust,ignore
//! use docspace_core::{DocspaceConfig, Reaper, WorkspaceManager};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Arc::new(WorkspaceManager::new(DocspaceConfig::load(None)?)?);
//! let reaper = Reaper::new(Arc::clone(&manager)).spawn();
//!
//! let ws = manager.create(Some("user123"))?;
//! manager.write_document(&ws.path, "notes.md", b"# findings")?;
//! manager.schedule_request_cleanup(ws.path.clone());
//!
//! reaper.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod clock;
pub mod config;
pub mod error;
pub mod manager;
pub mod naming;
pub mod path_guard;
pub mod reaper;
pub mod state;
pub mod types;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DocspaceConfig;
pub use error::{
    ConfigError, CreationError, DocspaceError, ReclaimError, ReclamationWarning, ValidationError,
};
pub use manager::WorkspaceManager;
pub use reaper::{Reaper, ReaperHandle, ReaperSummary, Reclaimed, SweepReport};
pub use state::{allowed_transitions, validate_transition, TransitionError, WorkspaceState};
pub use types::{ManagerStats, ReleaseOutcome, Workspace, WorkspaceId};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with docspace
    pub use crate::{
        DocspaceConfig, DocspaceError, Reaper, ReleaseOutcome, Workspace, WorkspaceManager,
        WorkspaceState,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
