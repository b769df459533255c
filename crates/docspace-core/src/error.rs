//! Error types for docspace
//!
//! Provides error handling for:
//! - Workspace creation failures (fatal to the request)
//! - Path validation failures (traversal, containment)
//! - Configuration loading and validation
//! - Reclamation failures (reported by the reaper, never propagated)

use serde::Serialize;
use std::path::PathBuf;

/// Main docspace error type
#[derive(Debug, thiserror::Error)]
pub enum DocspaceError {
    /// Workspace directory could not be created
    #[error("creation failed: {0}")]
    Creation(#[from] CreationError),

    /// Supplied path failed containment checks
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem operation on workspace contents failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being operated on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl DocspaceError {
    /// Check if the error was caused by caller input rather than the environment
    #[inline]
    #[must_use]
    pub fn is_caller_fault(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if retrying the same operation may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Creation(e) => e.is_retryable(),
            Self::Io { .. } => true,
            Self::Validation(_) | Self::Config(_) => false,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Workspace creation errors
#[derive(Debug, thiserror::Error)]
pub enum CreationError {
    /// Root directory could not be prepared
    #[error("workspace root {path} unavailable: {source}")]
    RootUnavailable {
        /// Configured root
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("cannot create {path}: {source}")]
    Io {
        /// Attempted workspace path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Every generated name already existed on disk
    #[error("path collision persisted after {attempts} attempts")]
    CollisionExhausted {
        /// Number of names tried
        attempts: u32,
    },

    /// Manager configuration rejected at construction
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl CreationError {
    /// Check if creation may succeed on a later attempt
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CollisionExhausted { .. } => true,
            Self::Io { source, .. } => !matches!(
                source.kind(),
                std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::NotFound
            ),
            Self::RootUnavailable { .. } | Self::InvalidConfig(_) => false,
        }
    }
}

/// Path validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Empty path or file name
    #[error("empty path")]
    Empty,

    /// Relative paths are never trusted
    #[error("path is not absolute: {0}")]
    NotAbsolute(PathBuf),

    /// Path contains `..` segments
    #[error("path contains traversal segments: {0}")]
    Traversal(PathBuf),

    /// Path lies outside (or equals) the workspace root
    #[error("path {path} is not inside {root}")]
    OutsideRoot {
        /// Offending path
        path: PathBuf,
        /// Configured root
        root: PathBuf,
    },

    /// Path resolves through a symlink to a location outside the root
    #[error("path {0} escapes the workspace root through a link")]
    LinkEscape(PathBuf),

    /// Path is contained but is not an active workspace
    #[error("no active workspace at {0}")]
    UnknownWorkspace(PathBuf),

    /// File name cannot be used inside a workspace
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("cannot parse {path}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// Environment override has the wrong shape
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv {
        /// Environment variable name
        key: String,
        /// Raw value
        value: String,
    },

    /// Field value out of range
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Reason a single reclamation failed
#[derive(Debug, thiserror::Error)]
pub enum ReclaimError {
    /// Directory removal failed
    #[error("remove {path}: {source}")]
    Remove {
        /// Directory being removed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Directory listing failed
    #[error("list {path}: {source}")]
    List {
        /// Directory being listed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl ReclaimError {
    /// Path the failure relates to
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Remove { path, .. } | Self::List { path, .. } => path,
        }
    }
}

/// Non-fatal record of a failed reclamation
///
/// Collected by the reaper and logged; never surfaced to request handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReclamationWarning {
    /// Directory that could not be reclaimed
    pub path: PathBuf,
    /// Owner tag, if the workspace was tracked with one
    pub owner: Option<String>,
    /// Human-readable failure reason
    pub reason: String,
}

impl ReclamationWarning {
    pub(crate) fn from_error(err: &ReclaimError, owner: Option<String>) -> Self {
        Self {
            path: err.path().to_path_buf(),
            owner,
            reason: err.to_string(),
        }
    }
}
