//! Comparator integration tests: inference rules on hand-built snapshots.

use homesync::diff::Comparator;
use homesync::types::{FileKind, FileNode, Side, SyncState, Task, Tree};
use homesync::Index;
use std::sync::Arc;

/// Root at `root_mtime` with `/docs` at `docs_mtime` holding `files`
fn snapshot(root_mtime: i64, docs_mtime: i64, files: &[(&str, i64)]) -> Arc<Index> {
    let mut tree = Tree::new(FileNode::directory("/", root_mtime, 0o755));
    let docs = tree
        .insert_child(tree.root(), FileNode::directory("/docs", docs_mtime, 0o755))
        .expect("insert docs");
    for (name, mtime) in files {
        tree.insert_child(
            docs,
            FileNode::file(format!("/docs/{}", name), 4, *mtime, 0o644),
        )
        .expect("insert file");
    }
    Arc::new(Index::from_tree(tree).expect("valid index"))
}

fn plan(local: Arc<Index>, remote: Arc<Index>) -> Vec<Task> {
    Comparator::new(local, remote, 4)
        .plan()
        .expect("comparison succeeds")
        .tasks
}

#[test]
fn test_newer_local_parent_infers_local_deletion() {
    let local = snapshot(10, 100, &[]);
    let remote = snapshot(10, 60, &[("gone.txt", 50)]);
    assert_eq!(
        plan(local, remote),
        vec![Task::Delete {
            path: "/docs/gone.txt".to_string(),
            deleted_on: Side::Local,
            kind: FileKind::Regular,
        }]
    );
}

#[test]
fn test_older_local_parent_downloads() {
    let local = snapshot(10, 50, &[]);
    let remote = snapshot(10, 100, &[("new.txt", 100)]);
    assert_eq!(
        plan(local, remote),
        vec![Task::Download {
            path: "/docs/new.txt".to_string(),
            kind: FileKind::Regular,
            size: 4,
        }]
    );
}

#[test]
fn test_newer_local_entry_uploads() {
    let local = snapshot(10, 100, &[("fresh.txt", 100)]);
    let remote = snapshot(10, 50, &[]);
    assert_eq!(
        plan(local, remote),
        vec![Task::Upload {
            path: "/docs/fresh.txt".to_string(),
            kind: FileKind::Regular,
            size: 4,
        }]
    );
}

#[test]
fn test_older_local_entry_infers_remote_deletion() {
    let local = snapshot(10, 60, &[("stale.txt", 50)]);
    let remote = snapshot(10, 100, &[]);
    assert_eq!(
        plan(local, remote),
        vec![Task::Delete {
            path: "/docs/stale.txt".to_string(),
            deleted_on: Side::Remote,
            kind: FileKind::Regular,
        }]
    );
}

#[test]
fn test_equal_parent_and_entry_times_are_fatal() {
    let local = snapshot(10, 100, &[]);
    let remote = snapshot(10, 60, &[("odd.txt", 100)]);
    let err = Comparator::new(local, remote, 2).plan().unwrap_err();
    assert!(err.is_invariant_violation(), "got {err}");

    let local = snapshot(10, 60, &[("odd.txt", 100)]);
    let remote = snapshot(10, 100, &[]);
    let err = Comparator::new(local, remote, 2).plan().unwrap_err();
    assert!(err.is_invariant_violation(), "got {err}");
}

#[test]
fn test_modified_files_follow_newer_side() {
    let local = snapshot(10, 100, &[("a.txt", 90), ("b.txt", 40)]);
    let remote = snapshot(10, 100, &[("a.txt", 30), ("b.txt", 70)]);
    let tasks = plan(local, remote);
    assert_eq!(tasks.len(), 2);
    assert!(matches!(&tasks[0], Task::Upload { path, .. } if path == "/docs/a.txt"));
    assert!(matches!(&tasks[1], Task::Download { path, .. } if path == "/docs/b.txt"));
}

#[test]
fn test_unchanged_snapshot_from_another_host_needs_nothing() {
    let local = snapshot(10, 100, &[("a.txt", 90), ("b.txt", 95)]);
    let mut tree = Tree::new(FileNode::directory("/", 10, 0o755).with_inode(77));
    let docs = tree
        .insert_child(
            tree.root(),
            FileNode::directory("/docs", 100, 0o755).with_inode(78),
        )
        .unwrap();
    for (name, mtime, inode) in [("a.txt", 90, 79), ("b.txt", 95, 80)] {
        tree.insert_child(
            docs,
            FileNode::file(format!("/docs/{}", name), 4, mtime, 0o644)
                .with_inode(inode)
                .with_created_at(5),
        )
        .unwrap();
    }
    let remote = Arc::new(Index::from_tree(tree).unwrap());
    assert!(plan(local, remote).is_empty());
}

#[test]
fn test_conflicting_versions_are_surfaced() {
    let local = snapshot(10, 100, &[("c.txt", 90)]);
    let mut tree = Tree::new(FileNode::directory("/", 10, 0o755));
    let docs = tree
        .insert_child(tree.root(), FileNode::directory("/docs", 100, 0o755))
        .unwrap();
    tree.insert_child(docs, FileNode::file("/docs/c.txt", 999, 90, 0o644))
        .unwrap();
    let remote = Arc::new(Index::from_tree(tree).unwrap());

    let tasks = plan(local, remote);
    assert_eq!(
        tasks,
        vec![Task::Conflict {
            path: "/docs/c.txt".to_string(),
            local_modified_at: 90,
            remote_modified_at: 90,
        }]
    );
}

#[test]
fn test_new_local_directory_uploads_whole_subtree() {
    let mut tree = Tree::new(FileNode::directory("/", 200, 0o755));
    let root = tree.root();
    let proj = tree
        .insert_child(root, FileNode::directory("/proj", 200, 0o755))
        .unwrap();
    tree.insert_child(proj, FileNode::file("/proj/main.rs", 12, 190, 0o644))
        .unwrap();
    tree.insert_child(
        proj,
        FileNode::file("/proj/target", 1, 190, 0o644).with_state(SyncState::Ignored),
    )
    .unwrap();
    let local = Arc::new(Index::from_tree(tree).unwrap());
    let remote = Arc::new(Index::empty());

    let result = Comparator::new(local, remote, 1).plan().unwrap();
    let summary: Vec<(&str, &str)> = result
        .tasks
        .iter()
        .map(|t| (t.action_name(), t.path()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("upload", "/proj"),
            ("upload", "/proj/main.rs"),
            ("metadata", "/proj/target"),
        ]
    );
    assert_eq!(result.stats.uploads, 2);
    assert_eq!(result.stats.total_bytes, 12);
    assert!(result.index_upload_required);
}

#[test]
fn test_concurrency_does_not_change_the_plan() {
    let build = |stamp: i64| {
        let mut tree = Tree::new(FileNode::directory("/", 10, 0o755));
        let root = tree.root();
        for d in 0..8 {
            let dir = tree
                .insert_child(root, FileNode::directory(format!("/d{}", d), 10, 0o755))
                .unwrap();
            for f in 0..8 {
                tree.insert_child(
                    dir,
                    FileNode::file(format!("/d{}/f{}", d, f), 1, stamp + f, 0o644),
                )
                .unwrap();
            }
        }
        Arc::new(Index::from_tree(tree).unwrap())
    };
    let local = build(100);
    let remote = build(50);

    let serial = Comparator::new(Arc::clone(&local), Arc::clone(&remote), 1)
        .plan()
        .unwrap();
    let parallel = Comparator::new(local, remote, 16).plan().unwrap();
    assert_eq!(serial, parallel);
    assert_eq!(serial.stats.uploads, 64);
}
