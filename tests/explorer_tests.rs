//! Explorer integration tests against real directory trees.

use homesync::scanner::{Explorer, IgnoreRules, OsStat, StatProvider, DEFAULT_MARKER};
use homesync::types::{path, FileNode, NodeId, SyncState, Tree};
use homesync::{Index, SyncError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn rules(global: &[&str]) -> IgnoreRules {
    IgnoreRules::new(global.iter().copied(), DEFAULT_MARKER)
}

fn stat_node(root: &Path, virtual_path: &str) -> FileNode {
    OsStat
        .stat(&path::to_host(root, virtual_path))
        .expect("stat entry")
        .into_node(virtual_path)
}

fn assert_sorted(index: &Index) {
    let tree = index.tree();
    for id in tree.descendants(tree.root()) {
        let names: Vec<&str> = tree.child_nodes(id).map(|(_, n)| n.base()).collect();
        for pair in names.windows(2) {
            assert!(
                pair[0] < pair[1],
                "children of {} out of order: {:?}",
                tree.node(id).path,
                names
            );
        }
    }
}

#[test]
fn test_end_to_end_snapshot_matches_hand_built_tree() {
    let temp = TempDir::new().expect("create tempdir");
    let root = temp.path();
    fs::write(root.join("a.txt"), b"alpha").expect("write a");
    fs::write(root.join("b.txt"), b"bravo!").expect("write b");
    fs::create_dir(root.join("docs")).expect("create docs");
    fs::write(root.join("docs/junk.log"), b"noise").expect("write junk");

    let (index, report) = Explorer::new(root, rules(&["junk.log"]))
        .workers(3)
        .explore()
        .expect("explore");

    let mut expected = Tree::new(stat_node(root, "/"));
    let top = expected.root();
    expected
        .insert_child(top, stat_node(root, "/a.txt"))
        .expect("insert a");
    expected
        .insert_child(top, stat_node(root, "/b.txt"))
        .expect("insert b");
    let docs: NodeId = expected
        .insert_child(top, stat_node(root, "/docs"))
        .expect("insert docs");
    expected
        .insert_child(
            docs,
            stat_node(root, "/docs/junk.log").with_state(SyncState::Ignored),
        )
        .expect("insert junk");
    let expected = Index::from_tree(expected).expect("valid expected index");

    let diff = index.diff(&expected);
    assert!(diff.is_empty(), "unexpected differences: {:#?}", diff);
    assert_eq!(report.directories, 2);
    assert_eq!(report.files, 2);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.skipped, 0);

    assert_eq!(index.get("/a.txt").unwrap().state, SyncState::Unchecked);
    assert_eq!(index.get("/docs").unwrap().state, SyncState::Unchecked);
    assert_eq!(
        index.get("/docs/junk.log").unwrap().state,
        SyncState::Ignored
    );
}

#[test]
fn test_children_are_sorted_in_a_wide_tree() {
    let temp = TempDir::new().expect("create tempdir");
    for dir in ["zeta", "alpha", "Mid", "m1d", "_x"] {
        let path = temp.path().join(dir);
        fs::create_dir(&path).expect("create dir");
        for file in ["9", "b", "A", "a", "Z.txt", "a.txt", "a-b"] {
            fs::write(path.join(file), file).expect("write file");
        }
    }

    let (index, _) = Explorer::new(temp.path(), rules(&[]))
        .workers(4)
        .explore()
        .expect("explore");
    assert_sorted(&index);
    assert_eq!(index.directory_count(), 6);
    assert_eq!(index.len(), 1 + 5 + 5 * 7);
}

#[test]
fn test_ignore_tiers_mark_entries_ignored() {
    let temp = TempDir::new().expect("create tempdir");
    let root = temp.path();
    fs::create_dir_all(root.join("node_modules/pkg")).expect("create node_modules");
    fs::create_dir_all(root.join("work/build")).expect("create build");
    fs::write(root.join("work/build/out.o"), b"o").expect("write out");
    fs::write(root.join("work/keep.rs"), b"fn main() {}").expect("write keep");
    fs::write(root.join("work/secret.key"), b"k").expect("write key");
    fs::write(
        root.join("work").join(DEFAULT_MARKER),
        "# private things\nbuild\n\nsecret.key\n",
    )
    .expect("write marker");
    // marker names only apply to the directory holding the marker
    fs::create_dir(root.join("other")).expect("create other");
    fs::write(root.join("other/secret.key"), b"k").expect("write other key");

    let (index, report) = Explorer::new(root, rules(&["node_modules"]))
        .explore()
        .expect("explore");

    let ignored = ["/node_modules", "/work/build", "/work/secret.key"];
    for path in ignored {
        assert_eq!(index.get(path).unwrap().state, SyncState::Ignored, "{}", path);
    }
    for path in ["/work/keep.rs", "/other/secret.key", "/work"] {
        assert_ne!(index.get(path).unwrap().state, SyncState::Ignored, "{}", path);
    }

    // ignored directories are not entered
    assert!(index.get_directory("/work/build").unwrap_err().is_not_found());
    assert!(index.get("/work/build/out.o").is_err());
    assert!(index.get("/node_modules/pkg").is_err());
    assert_eq!(report.ignored, 3);

    // nothing else in the tree is ignored
    let tree = index.tree();
    let count = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|&id| tree.node(id).is_ignored())
        .count();
    assert_eq!(count, ignored.len());
}

#[test]
fn test_missing_root_is_unavailable() {
    let temp = TempDir::new().expect("create tempdir");
    let err = Explorer::new(temp.path().join("missing"), rules(&[]))
        .explore()
        .unwrap_err();
    assert!(matches!(err, SyncError::RootUnavailable { .. }));
}

#[test]
fn test_empty_root() {
    let temp = TempDir::new().expect("create tempdir");
    let (index, report) = Explorer::new(temp.path(), rules(&[]))
        .explore()
        .expect("explore");
    assert_eq!(index.len(), 1);
    assert_eq!(index.root().children, Some(Vec::new()));
    assert_eq!(index.root().size, 0);
    assert_eq!(report.directories, 1);
}

#[test]
fn test_snapshot_survives_persistence() {
    let temp = TempDir::new().expect("create tempdir");
    fs::create_dir_all(temp.path().join("a/b/c")).expect("create dirs");
    fs::write(temp.path().join("a/b/c/leaf"), b"leaf").expect("write leaf");
    let (index, _) = Explorer::new(temp.path(), rules(&[]))
        .explore()
        .expect("explore");

    let mut buf = Vec::new();
    index.store(&mut buf).expect("store");
    let loaded = Index::load(buf.as_slice()).expect("load");
    assert!(index.diff(&loaded).is_empty());
}

/// Fails to stat any entry named `keep.txt`
struct FlakyStat;

impl StatProvider for FlakyStat {
    fn stat(&self, path: &Path) -> std::io::Result<homesync::scanner::Stat> {
        if path.file_name().is_some_and(|n| n == "keep.txt") {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            ));
        }
        OsStat.stat(path)
    }
}

#[test]
fn test_entry_that_failed_to_stat_is_not_inferred_deleted() {
    use filetime::{set_file_mtime, FileTime};
    use homesync::diff::Comparator;
    use homesync::types::Task;
    use std::sync::Arc;

    let temp = TempDir::new().expect("create tempdir");
    let root = temp.path();
    fs::write(root.join("keep.txt"), b"keep").expect("write keep");
    set_file_mtime(root.join("keep.txt"), FileTime::from_unix_time(1_600_000_000, 0))
        .expect("pin keep");
    set_file_mtime(root, FileTime::from_unix_time(1_600_000_100, 0)).expect("pin root");
    let (remote, _) = Explorer::new(root, rules(&[]))
        .explore()
        .expect("clean walk");

    // an unrelated edit makes the root newer than keep.txt
    fs::write(root.join("other"), b"other").expect("write other");
    let (local, report) = Explorer::new(root, rules(&[]))
        .with_stat(FlakyStat)
        .explore()
        .expect("partial walk");
    assert_eq!(report.skipped_paths, vec!["/keep.txt".to_string()]);

    let plan = Comparator::new(Arc::new(local), Arc::new(remote), 2)
        .with_skipped(report.skipped_paths.iter().cloned())
        .plan()
        .expect("comparison succeeds");
    assert!(
        plan.tasks.iter().all(|t| t.path() != "/keep.txt"),
        "{:?}",
        plan.tasks
    );
    assert!(matches!(&plan.tasks[..], [Task::Upload { path, .. }] if path == "/other"));
    assert_eq!(plan.unknown, vec!["/keep.txt".to_string()]);
}
