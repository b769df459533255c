//! Workspace directory naming
//!
//! Names have the shape `{prefix}_{owner}_{unix_secs}_{ulid}` (the owner
//! segment is omitted when absent). Owner tags are restricted to
//! `[A-Za-z0-9-]` so names split unambiguously on `_`, which lets the reaper
//! recover the creation time of directories it does not track.

use crate::types::WorkspaceId;
use chrono::{DateTime, Utc};
use ulid::Ulid;

/// Maximum length of the owner segment
pub const MAX_OWNER_LEN: usize = 32;

const SEPARATOR: char = '_';

/// Reduce an owner tag to a name-safe segment
///
/// Returns `None` when nothing usable remains.
#[must_use]
pub fn sanitize_owner(owner: &str) -> Option<String> {
    let mapped: String = owner
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .take(MAX_OWNER_LEN)
        .collect();
    let trimmed = mapped.trim_matches('-');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Build the directory name for a new workspace
#[must_use]
pub fn workspace_dir_name(
    prefix: &str,
    owner: Option<&str>,
    created_at: DateTime<Utc>,
    id: WorkspaceId,
) -> String {
    let ts = created_at.timestamp();
    match owner {
        Some(owner) => format!("{prefix}{SEPARATOR}{owner}{SEPARATOR}{ts}{SEPARATOR}{id}"),
        None => format!("{prefix}{SEPARATOR}{ts}{SEPARATOR}{id}"),
    }
}

/// Fields recovered from a workspace directory name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    /// Owner segment, if present
    pub owner: Option<String>,
    /// Creation time (second precision)
    pub created_at: DateTime<Utc>,
    /// Identifier segment
    pub id: Ulid,
}

/// Parse a directory name produced by [`workspace_dir_name`]
#[must_use]
pub fn parse_dir_name(prefix: &str, name: &str) -> Option<ParsedName> {
    let rest = name.strip_prefix(prefix)?.strip_prefix(SEPARATOR)?;
    let parts: Vec<&str> = rest.split(SEPARATOR).collect();
    let (owner, ts, id) = match parts.as_slice() {
        [ts, id] => (None, *ts, *id),
        [owner, ts, id] if !owner.is_empty() => (Some((*owner).to_string()), *ts, *id),
        _ => return None,
    };
    let created_at = DateTime::from_timestamp(ts.parse().ok()?, 0)?;
    let id = Ulid::from_string(id).ok()?;
    Some(ParsedName {
        owner,
        created_at,
        id,
    })
}
