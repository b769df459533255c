//! Path validation properties
//!
//! Containment must hold for arbitrary caller input, not only well-formed
//! workspace paths.

use docspace_core::{ValidationError, WorkspaceManager};
use docspace_test_utils::TestSpace;
use proptest::prelude::*;
use std::path::{Path, PathBuf};

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.-]{1,12}".prop_filter("not a relative marker", |s| s != "." && s != "..")
}

fn segments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(segment(), 1..5)
}

fn join(base: &Path, parts: &[String]) -> PathBuf {
    parts.iter().fold(base.to_path_buf(), |acc, p| acc.join(p))
}

fn assert_rejected(manager: &WorkspaceManager, path: &Path) {
    assert!(!manager.validate_workspace_path(path), "accepted {}", path.display());
    assert!(manager.resolve(path).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_children_of_root_are_accepted(parts in segments()) {
        let space = TestSpace::new();
        let path = join(space.root(), &parts);
        prop_assert!(space.manager.validate_workspace_path(&path));
    }

    #[test]
    fn prop_traversal_is_always_rejected(
        before in segments(),
        ups in 1usize..4,
        after in prop::collection::vec(segment(), 0..3),
    ) {
        let space = TestSpace::new();
        let mut path = join(space.root(), &before);
        for _ in 0..ups {
            path.push("..");
        }
        let path = join(&path, &after);

        let traversal = matches!(
            space.manager.validate_path(&path),
            Err(ValidationError::Traversal(_))
        );
        prop_assert!(traversal, "accepted {:?}", path);
        assert_rejected(&space.manager, &path);
    }

    #[test]
    fn prop_relative_paths_are_rejected(parts in segments()) {
        let space = TestSpace::new();
        let path = join(Path::new(""), &parts);
        let relative = matches!(
            space.manager.validate_path(&path),
            Err(ValidationError::NotAbsolute(_))
        );
        prop_assert!(relative, "accepted {:?}", path);
    }

    #[test]
    fn prop_paths_outside_root_are_rejected(parts in segments()) {
        let space = TestSpace::new();
        let sibling = space.root().with_extension("other");
        let path = join(&sibling, &parts);
        let outside = matches!(
            space.manager.validate_path(&path),
            Err(ValidationError::OutsideRoot { .. })
        );
        prop_assert!(outside, "accepted {:?}", path);
    }
}

#[test]
fn test_root_itself_and_prefix_lookalike_rejected() {
    let space = TestSpace::new();
    let root = space.root();

    assert_rejected(&space.manager, root);
    assert_rejected(&space.manager, Path::new(""));

    // Shares a string prefix with the root but is a different directory.
    let lookalike = PathBuf::from(format!("{}-evil", root.display())).join("x");
    assert_rejected(&space.manager, &lookalike);
}

#[test]
fn test_curdir_segments_are_normalised() {
    let space = TestSpace::new();
    let ws = space.manager.create(None).unwrap();
    let dotted = space.root().join(".").join(ws.path.file_name().unwrap());

    assert_eq!(space.manager.validate_path(&dotted).unwrap(), ws.path);
    assert_eq!(space.manager.resolve(&dotted).unwrap(), Some(ws));
}

#[cfg(unix)]
#[test]
fn test_symlink_out_of_root_rejected() {
    let space = TestSpace::new();
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("inner"), b"secret").unwrap();
    let link = space.root().join("docs_escape");
    std::os::unix::fs::symlink(outside.path(), &link).unwrap();

    assert!(matches!(
        space.manager.validate_path(&link),
        Err(ValidationError::LinkEscape(_))
    ));
    assert_rejected(&space.manager, &link.join("inner"));

    // Not created yet: only the link itself exists on disk.
    let pending = link.join("new_report.pdf");
    assert!(!pending.exists());
    assert!(matches!(
        space.manager.validate_path(&pending),
        Err(ValidationError::LinkEscape(_))
    ));
    assert_rejected(&space.manager, &pending);
    assert_rejected(&space.manager, &link.join("nested").join("deeper.txt"));

    // The orphan sweep never follows the link.
    let report = docspace_core::Reaper::new(space.manager.clone()).sweep();
    assert!(report.orphans_removed.is_empty());
    assert!(outside.path().join("inner").exists());
}
