//! Workspace lifecycle state machine

use serde::{Deserialize, Serialize};

/// Lifecycle state of a tracked workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceState {
    /// Directory exists and may be used
    Active,
    /// Removed by an explicit or deferred release
    Released,
    /// Removed by the reaper after expiry
    Expired,
}

impl WorkspaceState {
    /// Terminal states admit no further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

impl std::fmt::Display for WorkspaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Released => "released",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Illegal lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal workspace transition {from} -> {to}")]
pub struct TransitionError {
    /// Current state
    pub from: WorkspaceState,
    /// Requested state
    pub to: WorkspaceState,
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: WorkspaceState) -> &'static [WorkspaceState] {
    use WorkspaceState::{Active, Expired, Released};
    match from {
        Active => &[Released, Expired],
        Released | Expired => &[],
    }
}

/// Validate a single transition
///
/// # Errors
/// Returns `TransitionError` when `to` is not reachable from `from`.
pub fn validate_transition(from: WorkspaceState, to: WorkspaceState) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}
