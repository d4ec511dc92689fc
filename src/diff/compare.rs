//! Per-entry reconciliation rules
//!
//! Decides, from two snapshots alone, what a discrepancy between the local
//! and the remote version of one entry means. The only evidence is the
//! modification time of the entry and of the directory holding it: creating
//! or removing a child bumps its parent's mtime, so a parent newer than a
//! missing child's counterpart suggests a deletion, and an older one
//! suggests the child was never seen.
//!
//! Nothing here mutates either snapshot. Index-only changes are reported as
//! tasks and applied afterwards.
//!
//! Local entries the walk could not examine are unknown, not absent: a
//! skipped path or an unlisted directory is left out of the plan entirely
//! and reported back instead.

use crate::index::Index;
use crate::types::{FileNode, NodeId, Result, Side, SyncError, SyncState, Task};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Tasks and flags produced while comparing one batch of entries
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub tasks: Vec<Task>,
    pub index_upload_required: bool,
    /// Subtrees left alone because the local walk could not examine them
    pub unknown: Vec<String>,
}

/// Rule evaluation over a pair of snapshots
pub(crate) struct Rules<'a> {
    local: &'a Index,
    remote: &'a Index,
    skipped: &'a HashSet<String>,
    outcome: Outcome,
}

impl<'a> Rules<'a> {
    /// `skipped` holds the local paths the walk had to skip
    pub fn new(local: &'a Index, remote: &'a Index, skipped: &'a HashSet<String>) -> Self {
        Self {
            local,
            remote,
            skipped,
            outcome: Outcome::default(),
        }
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }

    /// Compare one entry; at least one side must be present
    ///
    /// Returns the pair of directories to descend into when both sides hold
    /// a listed directory at this path.
    pub fn compare_entry(
        &mut self,
        local: Option<NodeId>,
        remote: Option<NodeId>,
    ) -> Result<Option<(NodeId, NodeId)>> {
        match (local, remote) {
            (None, Some(r)) => self.local_absent(r).map(|_| None),
            (Some(l), None) => self.remote_absent(l).map(|_| None),
            (Some(l), Some(r)) => self.both_present(l, r),
            (None, None) => Err(SyncError::invariant(
                "",
                "comparison needs at least one side",
            )),
        }
    }

    /// Two-pointer merge over the name-sorted children of a directory pair
    ///
    /// Returns the child directory pairs that need their own merge.
    pub fn merge_children(&mut self, local: NodeId, remote: NodeId) -> Result<Vec<(NodeId, NodeId)>> {
        let (ltree, rtree) = (self.local.tree(), self.remote.tree());
        let (lnode, rnode) = (ltree.node(local), rtree.node(remote));
        let (Some(lchildren), Some(rchildren)) = (&lnode.children, &rnode.children) else {
            return Err(SyncError::invariant(
                lnode.path.as_str(),
                "directory contents were not recorded on both sides",
            ));
        };

        let mut descend = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < lchildren.len() || j < rchildren.len() {
            let lchild = lchildren.get(i).copied();
            let rchild = rchildren.get(j).copied();
            let pair = match (lchild, rchild) {
                (Some(l), Some(r)) => match ltree.node(l).base().cmp(rtree.node(r).base()) {
                    Ordering::Equal => {
                        i += 1;
                        j += 1;
                        (Some(l), Some(r))
                    }
                    Ordering::Less => {
                        i += 1;
                        (Some(l), None)
                    }
                    Ordering::Greater => {
                        j += 1;
                        (None, Some(r))
                    }
                },
                (Some(l), None) => {
                    i += 1;
                    (Some(l), None)
                }
                (None, Some(r)) => {
                    j += 1;
                    (None, Some(r))
                }
                (None, None) => break,
            };
            if let Some(dirs) = self.compare_entry(pair.0, pair.1)? {
                descend.push(dirs);
            }
        }
        Ok(descend)
    }

    fn emit(&mut self, task: Task) {
        self.outcome.tasks.push(task);
    }

    fn unknown(&mut self, path: &str) {
        self.outcome.unknown.push(path.to_string());
    }

    /// An included local directory whose contents were never listed
    fn is_unlisted(node: &FileNode) -> bool {
        node.is_dir() && !node.is_ignored() && node.children.is_none()
    }

    /// Rule 1: the entry exists only in the remote snapshot
    fn local_absent(&mut self, remote: NodeId) -> Result<()> {
        let rnode = self.remote.tree().node(remote);
        if matches!(rnode.state, SyncState::Ignored | SyncState::Deleted) {
            return Ok(());
        }
        if self.skipped.contains(&rnode.path) {
            // missing from the walk, not from the disk
            self.unknown(&rnode.path);
            return Ok(());
        }

        let lparent = self.local.get_directory(rnode.dirname())?;
        match lparent.modified_at.cmp(&rnode.modified_at) {
            Ordering::Greater => {
                // not certain: any other change in the directory also bumps its mtime
                self.emit(Task::Delete {
                    path: rnode.path.clone(),
                    deleted_on: Side::Local,
                    kind: rnode.mode.kind,
                });
                self.outcome.index_upload_required = true;
            }
            Ordering::Less => self.download_subtree(remote),
            Ordering::Equal => {
                return Err(equal_times(rnode, "local parent", "remote entry"));
            }
        }
        Ok(())
    }

    /// Rule 2: the entry exists only in the local snapshot
    fn remote_absent(&mut self, local: NodeId) -> Result<()> {
        let lnode = self.local.tree().node(local);
        if lnode.is_ignored() {
            self.record_ignored(lnode);
            return Ok(());
        }
        if Self::is_unlisted(lnode) {
            self.unknown(&lnode.path);
            return Ok(());
        }

        let rparent = self.remote.get_directory(lnode.dirname())?;
        match lnode.modified_at.cmp(&rparent.modified_at) {
            Ordering::Greater => self.upload_subtree(local),
            Ordering::Less => self.emit(Task::Delete {
                path: lnode.path.clone(),
                deleted_on: Side::Remote,
                kind: lnode.mode.kind,
            }),
            Ordering::Equal => {
                return Err(equal_times(lnode, "local entry", "remote parent"));
            }
        }
        Ok(())
    }

    /// Rule 3: both snapshots hold the entry
    fn both_present(&mut self, local: NodeId, remote: NodeId) -> Result<Option<(NodeId, NodeId)>> {
        let lnode = self.local.tree().node(local);
        let rnode = self.remote.tree().node(remote);

        if lnode.is_ignored() {
            if rnode.state != SyncState::Ignored {
                self.record_ignored(lnode);
            }
            return Ok(None);
        }
        if rnode.state == SyncState::Deleted {
            return self.remote_absent(local).map(|_| None);
        }
        if Self::is_unlisted(lnode) {
            self.unknown(&lnode.path);
            return Ok(None);
        }
        if rnode.is_ignored() {
            // no longer ignored locally; the remote never received it
            self.upload_subtree(local);
            return Ok(None);
        }

        match (lnode.is_dir(), rnode.is_dir()) {
            // a directory's identity says nothing about its descendants
            (true, true) => Ok(Some((local, remote))),
            (false, false) => {
                if !lnode.same_identity(rnode) {
                    self.compare_files(local, remote);
                }
                Ok(None)
            }
            _ => {
                match lnode.modified_at.cmp(&rnode.modified_at) {
                    Ordering::Greater => self.upload_subtree(local),
                    Ordering::Less => self.download_subtree(remote),
                    Ordering::Equal => self.conflict(lnode, rnode),
                }
                Ok(None)
            }
        }
    }

    /// Two versions of a non-directory entry with different identities
    fn compare_files(&mut self, local: NodeId, remote: NodeId) {
        let lnode = self.local.tree().node(local);
        let rnode = self.remote.tree().node(remote);
        match lnode.modified_at.cmp(&rnode.modified_at) {
            Ordering::Greater => self.upload_subtree(local),
            Ordering::Less => self.download_subtree(remote),
            // same mtime and size recorded by another host: inode and ctime are host-local
            Ordering::Equal if lnode.size == rnode.size && lnode.mode.kind == rnode.mode.kind => {}
            Ordering::Equal => self.conflict(lnode, rnode),
        }
    }

    fn conflict(&mut self, lnode: &FileNode, rnode: &FileNode) {
        self.emit(Task::Conflict {
            path: lnode.path.clone(),
            local_modified_at: lnode.modified_at,
            remote_modified_at: rnode.modified_at,
        });
    }

    fn record_ignored(&mut self, lnode: &FileNode) {
        self.emit(Task::MetadataChangeLocal {
            path: lnode.path.clone(),
            state: SyncState::Ignored,
        });
        self.outcome.index_upload_required = true;
    }

    /// Upload `local` and everything below it; ignored entries are only recorded
    fn upload_subtree(&mut self, local: NodeId) {
        let tree = self.local.tree();
        for id in tree.descendants(local) {
            let node = tree.node(id);
            if node.is_ignored() {
                self.record_ignored(node);
                continue;
            }
            if Self::is_unlisted(node) {
                self.unknown(&node.path);
                continue;
            }
            self.emit(Task::Upload {
                path: node.path.clone(),
                kind: node.mode.kind,
                size: node.size,
            });
        }
    }

    /// Download `remote` and everything below it, skipping ignored and deleted subtrees
    fn download_subtree(&mut self, remote: NodeId) {
        let tree = self.remote.tree();
        let mut stack = vec![remote];
        while let Some(id) = stack.pop() {
            let node = tree.node(id);
            if matches!(node.state, SyncState::Ignored | SyncState::Deleted) {
                continue;
            }
            self.emit(Task::Download {
                path: node.path.clone(),
                kind: node.mode.kind,
                size: node.size,
            });
            stack.extend(tree.children(id).iter().rev().copied());
        }
    }
}

fn equal_times(node: &FileNode, first: &str, second: &str) -> SyncError {
    SyncError::invariant(
        node.path.as_str(),
        format!(
            "{} and {} have the same modification time ({})",
            first, second, node.modified_at
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileKind, Tree};

    fn index(root_mtime: i64, children: Vec<FileNode>) -> Index {
        let mut tree = Tree::new(FileNode::directory("/", root_mtime, 0o755));
        let root = tree.root();
        for child in children {
            tree.insert_child(root, child).unwrap();
        }
        Index::from_tree(tree).unwrap()
    }

    fn run(local: &Index, remote: &Index) -> Result<Outcome> {
        run_skipping(local, remote, &[])
    }

    fn run_skipping(local: &Index, remote: &Index, skipped: &[&str]) -> Result<Outcome> {
        let skipped: HashSet<String> = skipped.iter().map(|p| p.to_string()).collect();
        let mut rules = Rules::new(local, remote, &skipped);
        let root = (local.tree().root(), remote.tree().root());
        let mut pending = vec![root];
        while let Some((l, r)) = pending.pop() {
            pending.extend(rules.merge_children(l, r)?);
        }
        Ok(rules.into_outcome())
    }

    #[test]
    fn test_newer_local_parent_means_local_deletion() {
        let local = index(100, vec![]);
        let remote = index(40, vec![FileNode::file("/a.txt", 1, 50, 0o644)]);

        let outcome = run(&local, &remote).unwrap();
        assert_eq!(
            outcome.tasks,
            vec![Task::Delete {
                path: "/a.txt".to_string(),
                deleted_on: Side::Local,
                kind: FileKind::Regular,
            }]
        );
        assert!(outcome.index_upload_required);
    }

    #[test]
    fn test_older_local_parent_means_download() {
        let local = index(50, vec![]);
        let remote = index(100, vec![FileNode::file("/a.txt", 7, 100, 0o644)]);

        let outcome = run(&local, &remote).unwrap();
        assert_eq!(
            outcome.tasks,
            vec![Task::Download {
                path: "/a.txt".to_string(),
                kind: FileKind::Regular,
                size: 7,
            }]
        );
        assert!(!outcome.index_upload_required);
    }

    #[test]
    fn test_equal_parent_and_entry_times_are_an_invariant_violation() {
        let local = index(70, vec![]);
        let remote = index(60, vec![FileNode::file("/a.txt", 1, 70, 0o644)]);
        assert!(run(&local, &remote).unwrap_err().is_invariant_violation());

        let local = index(60, vec![FileNode::file("/a.txt", 1, 70, 0o644)]);
        let remote = index(70, vec![]);
        assert!(run(&local, &remote).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_newer_local_entry_means_upload() {
        let local = index(100, vec![FileNode::file("/a.txt", 3, 100, 0o644)]);
        let remote = index(50, vec![]);

        let outcome = run(&local, &remote).unwrap();
        assert_eq!(outcome.tasks[0].action_name(), "upload");
        assert_eq!(outcome.tasks.len(), 1);
    }

    #[test]
    fn test_older_local_entry_means_remote_deletion() {
        let local = index(100, vec![FileNode::file("/a.txt", 3, 50, 0o644)]);
        let remote = index(100, vec![]);

        let outcome = run(&local, &remote).unwrap();
        assert_eq!(
            outcome.tasks,
            vec![Task::Delete {
                path: "/a.txt".to_string(),
                deleted_on: Side::Remote,
                kind: FileKind::Regular,
            }]
        );
        assert!(!outcome.index_upload_required);
    }

    #[test]
    fn test_ignored_remote_only_entries_are_left_alone() {
        let local = index(100, vec![]);
        let remote = index(
            40,
            vec![
                FileNode::file("/a", 1, 50, 0o644).with_state(SyncState::Ignored),
                FileNode::file("/b", 1, 50, 0o644).with_state(SyncState::Deleted),
            ],
        );
        assert!(run(&local, &remote).unwrap().tasks.is_empty());
    }

    #[test]
    fn test_ignored_local_only_entry_is_recorded() {
        let mut ignored = FileNode::directory("/node_modules", 100, 0o755)
            .with_state(SyncState::Ignored);
        ignored.children = None;
        let local = index(100, vec![ignored]);
        let remote = index(50, vec![]);

        let outcome = run(&local, &remote).unwrap();
        assert_eq!(
            outcome.tasks,
            vec![Task::MetadataChangeLocal {
                path: "/node_modules".to_string(),
                state: SyncState::Ignored,
            }]
        );
        assert!(outcome.index_upload_required);
    }

    #[test]
    fn test_newer_file_wins() {
        let local = index(10, vec![FileNode::file("/a", 2, 30, 0o644)]);
        let remote = index(10, vec![FileNode::file("/a", 5, 20, 0o644)]);
        assert_eq!(run(&local, &remote).unwrap().tasks[0].action_name(), "upload");

        let local = index(10, vec![FileNode::file("/a", 2, 20, 0o644)]);
        let remote = index(10, vec![FileNode::file("/a", 5, 30, 0o644)]);
        assert_eq!(run(&local, &remote).unwrap().tasks[0].action_name(), "download");
    }

    #[test]
    fn test_equal_times_with_different_content_is_a_conflict() {
        let local = index(10, vec![FileNode::file("/a", 2, 30, 0o644)]);
        let remote = index(10, vec![FileNode::file("/a", 5, 30, 0o644)]);
        let outcome = run(&local, &remote).unwrap();
        assert_eq!(
            outcome.tasks,
            vec![Task::Conflict {
                path: "/a".to_string(),
                local_modified_at: 30,
                remote_modified_at: 30,
            }]
        );
    }

    #[test]
    fn test_same_file_from_another_host_is_unchanged() {
        let local = index(10, vec![FileNode::file("/a", 5, 30, 0o644).with_inode(1)]);
        let remote = index(10, vec![FileNode::file("/a", 5, 30, 0o644).with_inode(99)]);
        assert!(run(&local, &remote).unwrap().tasks.is_empty());
    }

    #[test]
    fn test_identical_directories_are_still_descended() {
        let mut ltree = Tree::new(FileNode::directory("/", 10, 0o755));
        let ldocs = ltree
            .insert_child(ltree.root(), FileNode::directory("/docs", 10, 0o755))
            .unwrap();
        ltree
            .insert_child(ldocs, FileNode::file("/docs/x", 1, 50, 0o644))
            .unwrap();
        let mut rtree = Tree::new(FileNode::directory("/", 10, 0o755));
        let rdocs = rtree
            .insert_child(rtree.root(), FileNode::directory("/docs", 10, 0o755))
            .unwrap();
        rtree
            .insert_child(rdocs, FileNode::file("/docs/x", 1, 40, 0o644))
            .unwrap();

        // /docs sizes and mtimes match although the file changed
        let outcome = run(
            &Index::from_tree(ltree).unwrap(),
            &Index::from_tree(rtree).unwrap(),
        )
        .unwrap();
        assert_eq!(outcome.tasks.len(), 1);
        assert_eq!(outcome.tasks[0].path(), "/docs/x");
    }

    #[test]
    fn test_download_skips_ignored_descendants() {
        let mut rtree = Tree::new(FileNode::directory("/", 100, 0o755));
        let docs = rtree
            .insert_child(rtree.root(), FileNode::directory("/docs", 90, 0o755))
            .unwrap();
        rtree
            .insert_child(docs, FileNode::file("/docs/a", 1, 90, 0o644))
            .unwrap();
        rtree
            .insert_child(
                docs,
                FileNode::file("/docs/b", 1, 90, 0o644).with_state(SyncState::Ignored),
            )
            .unwrap();
        let remote = Index::from_tree(rtree).unwrap();
        let local = index(50, vec![]);

        let paths: Vec<_> = run(&local, &remote)
            .unwrap()
            .tasks
            .iter()
            .map(|t| t.path().to_string())
            .collect();
        assert_eq!(paths, vec!["/docs", "/docs/a"]);
    }

    #[test]
    fn test_kind_change_follows_newer_side() {
        let mut ltree = Tree::new(FileNode::directory("/", 100, 0o755));
        let dir = ltree
            .insert_child(ltree.root(), FileNode::directory("/x", 80, 0o755))
            .unwrap();
        ltree
            .insert_child(dir, FileNode::file("/x/inner", 1, 80, 0o644))
            .unwrap();
        let local = Index::from_tree(ltree).unwrap();
        let remote = index(100, vec![FileNode::file("/x", 1, 60, 0o644)]);

        let paths: Vec<_> = run(&local, &remote)
            .unwrap()
            .tasks
            .iter()
            .map(|t| t.path().to_string())
            .collect();
        assert_eq!(paths, vec!["/x", "/x/inner"]);
    }

    fn locked(mtime: i64) -> FileNode {
        let mut node = FileNode::directory("/locked", mtime, 0o000);
        node.children = None;
        node
    }

    #[test]
    fn test_unlisted_local_directory_is_unknown() {
        let local = index(
            100,
            vec![locked(10), FileNode::file("/fresh", 1, 100, 0o644)],
        );
        let remote = index(50, vec![FileNode::directory("/locked", 10, 0o755)]);

        let outcome = run(&local, &remote).unwrap();
        assert_eq!(outcome.unknown, vec!["/locked".to_string()]);
        let paths: Vec<_> = outcome.tasks.iter().map(|t| t.path()).collect();
        assert_eq!(paths, vec!["/fresh"]);
    }

    #[test]
    fn test_unlisted_local_directory_is_neither_uploaded_nor_deleted() {
        // newer than the remote parent: would otherwise be uploaded empty
        let local = index(100, vec![locked(90)]);
        let remote = index(50, vec![]);
        let outcome = run(&local, &remote).unwrap();
        assert!(outcome.tasks.is_empty());
        assert_eq!(outcome.unknown, vec!["/locked".to_string()]);

        // older than the remote parent: would otherwise be deleted locally
        let local = index(100, vec![locked(20)]);
        let remote = index(50, vec![]);
        assert!(run(&local, &remote).unwrap().tasks.is_empty());
    }

    #[test]
    fn test_unlisted_remote_directory_cannot_be_merged() {
        let local = index(10, vec![FileNode::directory("/locked", 10, 0o755)]);
        let remote = index(10, vec![locked(10)]);
        assert!(run(&local, &remote).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_skipped_local_entry_is_not_a_deletion() {
        // the local parent is newer, which alone would infer a deletion
        let local = index(100, vec![]);
        let remote = index(40, vec![FileNode::file("/keep.txt", 1, 50, 0o644)]);
        let outcome = run_skipping(&local, &remote, &["/keep.txt"]).unwrap();
        assert!(outcome.tasks.is_empty());
        assert!(!outcome.index_upload_required);
        assert_eq!(outcome.unknown, vec!["/keep.txt".to_string()]);
    }

    #[test]
    fn test_skipped_local_entry_is_not_downloaded_over() {
        let local = index(50, vec![]);
        let remote = index(100, vec![FileNode::file("/keep.txt", 7, 100, 0o644)]);
        let outcome = run_skipping(&local, &remote, &["/keep.txt"]).unwrap();
        assert!(outcome.tasks.is_empty());
        assert_eq!(outcome.unknown.len(), 1);
    }
}
