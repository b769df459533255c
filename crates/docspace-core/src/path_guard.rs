//! Containment checks for externally supplied paths
//!
//! A path is trusted only if it is absolute, has no `..` segments, lies
//! strictly below the workspace root, and still lies below the root once
//! links in its deepest existing ancestor are resolved. Checks run whether
//! or not the path exists on disk.

use crate::error::ValidationError;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Validate `candidate` against the canonical `root`
///
/// Returns the lexically normalised path (`.` segments removed).
///
/// # Errors
/// Returns the first containment rule the path breaks.
pub fn contain(root: &Path, candidate: &Path) -> Result<PathBuf, ValidationError> {
    if candidate.as_os_str().is_empty() {
        return Err(ValidationError::Empty);
    }
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ValidationError::Traversal(candidate.to_path_buf()));
    }
    if !candidate.is_absolute() {
        return Err(ValidationError::NotAbsolute(candidate.to_path_buf()));
    }

    let normalized: PathBuf = candidate
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if !strictly_inside(root, &normalized) {
        return Err(ValidationError::OutsideRoot {
            path: normalized,
            root: root.to_path_buf(),
        });
    }

    match real_path(&normalized) {
        Some(real) if strictly_inside(root, &real) => Ok(normalized),
        _ => Err(ValidationError::LinkEscape(normalized)),
    }
}

/// Resolve links in the deepest existing ancestor and re-append the rest
///
/// Returns `None` when an existing component cannot be resolved (a dangling
/// link, for instance).
fn real_path(normalized: &Path) -> Option<PathBuf> {
    let mut missing: Vec<&OsStr> = Vec::new();
    let mut current = normalized;
    loop {
        match std::fs::canonicalize(current) {
            Ok(real) => {
                return Some(missing.iter().rev().fold(real, |acc, name| acc.join(name)));
            }
            Err(_) if std::fs::symlink_metadata(current).is_ok() => return None,
            Err(_) => {
                missing.push(current.file_name()?);
                current = current.parent()?;
            }
        }
    }
}

/// Reduce a caller-supplied file name to its final component
///
/// # Errors
/// Returns `ValidationError::InvalidFileName` for empty, `.` or `..` names.
pub fn base_name(name: &str) -> Result<&OsStr, ValidationError> {
    Path::new(name)
        .file_name()
        .ok_or_else(|| ValidationError::InvalidFileName(name.to_string()))
}

fn strictly_inside(root: &Path, path: &Path) -> bool {
    path != root && path.starts_with(root)
}
