//! Workspace manager configuration
//!
//! Defaults match the per-request document flow: a 5 minute request TTL, an
//! hourly sweep, and a 2 hour sweep horizon. Values are read from an optional
//! TOML file and then overridden by `DOCSPACE_*` environment variables.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for any configured duration (one year)
pub const MAX_DURATION_SECS: u64 = 366 * 24 * 3600;

/// docspace configuration
///
/// Durations are stored in whole seconds; the `with_*` duration builders
/// round sub-second parts up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocspaceConfig {
    /// Directory under which all workspaces are created
    pub root: PathBuf,
    /// Namespace prefix of workspace directory names
    pub prefix: String,
    /// Delay before a request's workspace is released
    pub request_ttl_secs: u64,
    /// Period of the background reaper
    pub sweep_interval_secs: u64,
    /// Age after which the reaper reclaims a workspace
    pub sweep_ttl_secs: u64,
    /// Names tried before creation gives up on collisions
    pub max_create_attempts: u32,
    /// Whether the reaper also removes stale untracked directories
    pub reap_orphans: bool,
}

impl DocspaceConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With workspace root
    #[inline]
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// With directory name prefix
    #[inline]
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// With per-request TTL
    #[inline]
    #[must_use]
    pub fn with_request_ttl(mut self, ttl: Duration) -> Self {
        self.request_ttl_secs = whole_secs(ttl);
        self
    }

    /// With reaper interval
    #[inline]
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = whole_secs(interval);
        self
    }

    /// With reaper horizon
    #[inline]
    #[must_use]
    pub fn with_sweep_ttl(mut self, ttl: Duration) -> Self {
        self.sweep_ttl_secs = whole_secs(ttl);
        self
    }

    /// With orphan reclamation toggled
    #[inline]
    #[must_use]
    pub fn with_reap_orphans(mut self, enabled: bool) -> Self {
        self.reap_orphans = enabled;
        self
    }

    /// Per-request TTL
    #[inline]
    #[must_use]
    pub fn request_ttl(&self) -> Duration {
        Duration::from_secs(self.request_ttl_secs)
    }

    /// Reaper interval
    #[inline]
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reaper horizon
    #[inline]
    #[must_use]
    pub fn sweep_ttl(&self) -> Duration {
        Duration::from_secs(self.sweep_ttl_secs)
    }

    /// Load configuration: file (if any), then environment, then validation
    ///
    /// # Errors
    /// Returns `ConfigError` when the file is unreadable or malformed, an
    /// environment override does not parse, or a value is out of range.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file; missing fields take defaults
    ///
    /// # Errors
    /// Returns `ConfigError::Read` or `ConfigError::Parse`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `DOCSPACE_*` overrides using `lookup` to read variables
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidEnv` for values that do not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("DOCSPACE_ROOT") {
            self.root = PathBuf::from(root);
        }
        if let Some(prefix) = lookup("DOCSPACE_PREFIX") {
            self.prefix = prefix;
        }
        if let Some(v) = parse_env(&lookup, "DOCSPACE_REQUEST_TTL_SECS")? {
            self.request_ttl_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "DOCSPACE_SWEEP_INTERVAL_SECS")? {
            self.sweep_interval_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "DOCSPACE_SWEEP_TTL_SECS")? {
            self.sweep_ttl_secs = v;
        }
        if let Some(v) = parse_env(&lookup, "DOCSPACE_MAX_CREATE_ATTEMPTS")? {
            self.max_create_attempts = v;
        }
        if let Some(v) = parse_env(&lookup, "DOCSPACE_REAP_ORPHANS")? {
            self.reap_orphans = v;
        }
        Ok(())
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(invalid("root", "must not be empty"));
        }
        if self.prefix.is_empty()
            || !self
                .prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(invalid("prefix", "must be non-empty [A-Za-z0-9-]"));
        }
        for (field, secs) in [
            ("request_ttl_secs", self.request_ttl_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("sweep_ttl_secs", self.sweep_ttl_secs),
        ] {
            if secs == 0 || secs > MAX_DURATION_SECS {
                return Err(invalid(
                    field,
                    format!("must be between 1 and {MAX_DURATION_SECS}"),
                ));
            }
        }
        if self.max_create_attempts == 0 {
            return Err(invalid("max_create_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for DocspaceConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("docspace"),
            prefix: "docs".to_string(),
            request_ttl_secs: 300,
            sweep_interval_secs: 3600,
            sweep_ttl_secs: 7200,
            max_create_attempts: 3,
            reap_orphans: true,
        }
    }
}

fn whole_secs(d: Duration) -> u64 {
    d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0))
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value,
            }),
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
