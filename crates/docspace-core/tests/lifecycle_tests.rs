//! Workspace lifecycle tests
//!
//! End-to-end flows through create, document writes, resolve, release and
//! expiry.

use docspace_core::prelude::*;
use docspace_core::ValidationError;
use docspace_test_utils::{list_dirs, write_file, TestSpace};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_create_write_resolve_release() {
    let space = TestSpace::new();
    let manager = &space.manager;

    let ws = manager.create(Some("user123")).unwrap();
    write_file(&ws.path, "paper.txt", "abstract");

    let resolved = manager.resolve(&ws.path).unwrap().expect("active workspace");
    assert_eq!(resolved, ws);
    assert_eq!(resolved.state, WorkspaceState::Active);

    assert_eq!(manager.release(&ws.path), ReleaseOutcome::Removed);
    assert!(!ws.path.exists());
    assert_eq!(manager.resolve(&ws.path).unwrap(), None);
}

#[test]
fn test_external_interface() {
    let space = TestSpace::new();
    let manager = &space.manager;

    let path = manager.create_workspace(None).unwrap();
    assert!(path.is_dir());
    assert!(manager.validate_workspace_path(&path));

    manager.release_workspace(&path);
    manager.release_workspace(&path);
    assert!(!path.exists());

    // Containment does not depend on tracking.
    assert!(manager.validate_workspace_path(&path));
    assert!(!manager.validate_workspace_path(Path::new("/tmp")));
}

#[test]
fn test_ttl_boundary_with_sweep() {
    let space = TestSpace::new();
    let manager = &space.manager;
    let reaper = Reaper::new(Arc::clone(manager));

    let ws = manager
        .create_with_ttl(None, Duration::from_secs(5 * 60))
        .unwrap();

    space.advance_secs(4 * 60 + 59);
    let report = reaper.sweep();
    assert!(report.expired.is_empty());
    assert!(ws.path.exists());
    assert!(manager.resolve(&ws.path).unwrap().is_some());

    space.advance_secs(2);
    let report = reaper.sweep();
    assert_eq!(report.expired.len(), 1);
    assert!(!ws.path.exists());
    assert_eq!(manager.resolve(&ws.path).unwrap(), None);

    // Explicit release after expiry is still silent.
    assert_eq!(manager.release(&ws.path), ReleaseOutcome::AlreadyGone);
}

#[test]
fn test_documents_round_trip_through_manager() {
    let space = TestSpace::new();
    let manager = &space.manager;
    let ws = manager.create(Some("team-a")).unwrap();

    manager.write_document(&ws.path, "b.md", b"two").unwrap();
    manager.write_document(&ws.path, "dir/a.md", b"one").unwrap();

    let names: Vec<String> = manager
        .list_documents(&ws.path)
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.md".to_string(), "b.md".to_string()]);

    let other = manager.create(None).unwrap();
    assert!(manager.list_documents(&other.path).unwrap().is_empty());
}

#[test]
fn test_untracked_contained_path_is_not_resolved() {
    let space = TestSpace::new();
    let orphan = space.plant_orphan(Some("ghost"), 10);

    assert_eq!(space.manager.resolve(&orphan).unwrap(), None);
    assert!(matches!(
        space.manager.write_document(&orphan, "x.txt", b"x"),
        Err(DocspaceError::Validation(ValidationError::UnknownWorkspace(_)))
    ));
    assert_eq!(space.manager.release(&orphan), ReleaseOutcome::AlreadyGone);
    assert!(orphan.exists());
}

#[test]
fn test_full_sweep_leaves_only_live_directories() {
    let space = TestSpace::new();
    let manager = &space.manager;

    let keep = manager.create(None).unwrap();
    let expire = manager.create_with_ttl(None, Duration::from_secs(30)).unwrap();
    let stale_orphan = space.plant_orphan(None, 3 * 3600);
    let fresh_orphan = space.plant_orphan(None, 60);

    space.advance_secs(60);
    let report = Reaper::new(Arc::clone(manager)).sweep();

    assert_eq!(report.expired.len(), 1);
    assert_eq!(report.orphans_removed.len(), 1);
    assert!(report.warnings.is_empty());

    let mut expected = vec![keep.path.clone(), fresh_orphan];
    expected.sort();
    assert_eq!(list_dirs(space.root()), expected);
    assert!(!expire.path.exists());
    assert!(!stale_orphan.exists());
}

#[tokio::test(start_paused = true)]
async fn test_request_cleanup_fires_after_request_ttl() {
    let space = TestSpace::with_config(
        DocspaceConfig::new().with_request_ttl(Duration::from_secs(300)),
    );
    let manager = &space.manager;
    let ws = manager.create(Some("user123")).unwrap();

    let handle = manager.schedule_request_cleanup(ws.path.clone());

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert!(ws.path.exists());

    assert_eq!(handle.await.unwrap(), ReleaseOutcome::Removed);
    assert!(!ws.path.exists());
}

#[tokio::test(start_paused = true)]
async fn test_deferred_release_after_explicit_release() {
    let space = TestSpace::new();
    let manager = &space.manager;
    let ws = manager.create(None).unwrap();

    let deferred = manager.release_after(ws.path.clone(), Duration::from_secs(60));
    assert_eq!(manager.release(&ws.path), ReleaseOutcome::Removed);

    assert_eq!(deferred.await.unwrap(), ReleaseOutcome::AlreadyGone);
    assert_eq!(manager.stats().released, 1);
}
