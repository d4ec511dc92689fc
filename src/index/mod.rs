//! Index - Path lookup, persistence and structural diff over a snapshot tree
//!
//! The [`Tree`] owns every node. The index keeps a map from directory path
//! to arena position purely as a lookup accelerator; regular files are found
//! through their parent directory.

mod builder;
mod persist;

pub use builder::{DirectoryListing, IndexBuilder};

use crate::types::{path, FileNode, NodeId, Result, SyncError, SyncState, Tree};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Frozen snapshot with directory lookup
#[derive(Debug, Clone)]
pub struct Index {
    tree: Tree,
    dirs: HashMap<String, NodeId>,
}

impl Index {
    /// Wrap a tree, registering every listed directory
    ///
    /// Fails with `CorruptIndex` if a directory's children are not in strictly
    /// ascending name order, a child path does not extend its parent's path,
    /// or the root is not a directory at `/`.
    pub fn from_tree(tree: Tree) -> Result<Self> {
        let root = tree.root_node();
        if root.path != path::ROOT || !root.is_dir() {
            return Err(SyncError::CorruptIndex(format!(
                "root must be a directory at '/', found {}",
                root
            )));
        }

        let mut dirs = HashMap::new();
        for id in tree.descendants(tree.root()) {
            let node = tree.node(id);
            path::validate(&node.path).map_err(|e| SyncError::CorruptIndex(e.to_string()))?;

            if node.children.is_some() && !node.is_dir() {
                return Err(SyncError::CorruptIndex(format!(
                    "{} has children but is not a directory",
                    node.path
                )));
            }

            let mut previous: Option<&str> = None;
            for (_, child) in tree.child_nodes(id) {
                if path::join(&node.path, child.base()) != child.path {
                    return Err(SyncError::CorruptIndex(format!(
                        "{} is listed under {}",
                        child.path, node.path
                    )));
                }
                if let Some(prev) = previous {
                    if prev >= child.base() {
                        return Err(SyncError::CorruptIndex(format!(
                            "children of {} are not sorted ({} before {})",
                            node.path,
                            prev,
                            child.base()
                        )));
                    }
                }
                previous = Some(child.base());
            }

            if node.is_dir() && node.children.is_some() {
                dirs.insert(node.path.clone(), id);
            }
        }

        Ok(Self { tree, dirs })
    }

    /// Snapshot holding only an empty root with zeroed timestamps
    ///
    /// Stands in for a remote that was never seeded.
    pub fn empty() -> Self {
        let tree = Tree::new(FileNode::directory(path::ROOT, 0, 0o755));
        let mut dirs = HashMap::new();
        dirs.insert(path::ROOT.to_string(), tree.root());
        Self { tree, dirs }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root(&self) -> &FileNode {
        self.tree.root_node()
    }

    /// Number of listed directories
    pub fn directory_count(&self) -> usize {
        self.dirs.len()
    }

    /// Total number of nodes
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Arena position of the listed directory at `path`
    pub fn get_directory_id(&self, path: &str) -> Result<NodeId> {
        self.dirs
            .get(path)
            .copied()
            .ok_or_else(|| SyncError::not_found(path))
    }

    /// Listed directory at `path`; a direct map lookup
    pub fn get_directory(&self, path: &str) -> Result<&FileNode> {
        self.get_directory_id(path).map(|id| self.tree.node(id))
    }

    /// Arena position of the node at `path`
    pub fn get_id(&self, path: &str) -> Result<NodeId> {
        if let Some(&id) = self.dirs.get(path) {
            return Ok(id);
        }
        if path.is_empty() || path == path::ROOT {
            return Err(SyncError::not_found(path));
        }
        let parent = self.get_directory_id(path::dirname(path))?;
        self.tree
            .find_child(parent, path::base(path))
            .ok_or_else(|| SyncError::not_found(path))
    }

    /// Node at `path`, file or directory
    pub fn get(&self, path: &str) -> Result<&FileNode> {
        self.get_id(path).map(|id| self.tree.node(id))
    }

    /// Overwrite the sync state of the node at `path`
    pub fn set_state(&mut self, path: &str, state: SyncState) -> Result<()> {
        let id = self.get_id(path)?;
        self.tree.node_mut(id).state = state;
        Ok(())
    }

    /// Serialize the snapshot as one recursively encoded root node
    pub fn store<W: Write>(&self, writer: W) -> Result<()> {
        persist::write_tree(&self.tree, writer)
    }

    /// Decode a snapshot written by [`Index::store`]
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let tree = persist::read_tree(reader)?;
        Self::from_tree(tree)
    }

    pub fn store_to_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| SyncError::entry(path, e))?;
        let mut writer = BufWriter::new(file);
        self.store(&mut writer)?;
        writer.flush().map_err(|e| SyncError::entry(path, e))?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SyncError::entry(path, e))?;
        Self::load(BufReader::new(file))
    }

    /// Human-readable structural differences between two snapshots
    ///
    /// Empty iff every node is identity-equal, every listed directory has the
    /// same number of children, and both sides hold the same names.
    pub fn diff(&self, other: &Index) -> Vec<String> {
        let mut diffs = Vec::new();
        let (a, b) = (&self.tree, &other.tree);

        if a.len() != b.len() {
            diffs.push(format!(
                "number of nodes differs: {} vs {}",
                a.len(),
                b.len()
            ));
        }

        let mut stack = vec![(a.root(), b.root())];
        while let Some((aid, bid)) = stack.pop() {
            let (anode, bnode) = (a.node(aid), b.node(bid));

            if !anode.same_identity(bnode) {
                diffs.push(format!(
                    "other index has a different version of {}: {} vs {}",
                    anode.path, anode, bnode
                ));
            }

            match (&anode.children, &bnode.children) {
                (Some(_), None) => {
                    diffs.push(format!("other index did not list {}", anode.path));
                    continue;
                }
                (None, Some(_)) => {
                    diffs.push(format!("this index did not list {}", anode.path));
                    continue;
                }
                (None, None) => continue,
                (Some(ac), Some(bc)) if ac.len() != bc.len() => diffs.push(format!(
                    "other index has a different number of children for {}",
                    anode.path
                )),
                _ => {}
            }

            let (achildren, bchildren) = (a.children(aid), b.children(bid));
            let (mut i, mut j) = (0, 0);
            let mut pairs = Vec::new();
            while i < achildren.len() || j < bchildren.len() {
                let aname = achildren.get(i).map(|&id| a.node(id).base());
                let bname = bchildren.get(j).map(|&id| b.node(id).base());
                match (aname, bname) {
                    (Some(x), Some(y)) if x == y => {
                        pairs.push((achildren[i], bchildren[j]));
                        i += 1;
                        j += 1;
                    }
                    (Some(x), Some(y)) if x < y => {
                        diffs.push(format!(
                            "other index does not contain {}",
                            a.node(achildren[i]).path
                        ));
                        i += 1;
                    }
                    (Some(_), None) => {
                        diffs.push(format!(
                            "other index does not contain {}",
                            a.node(achildren[i]).path
                        ));
                        i += 1;
                    }
                    _ => {
                        diffs.push(format!(
                            "this index does not contain {}",
                            b.node(bchildren[j]).path
                        ));
                        j += 1;
                    }
                }
            }
            // reversed so that paths are reported in name order
            stack.extend(pairs.into_iter().rev());
        }
        diffs
    }

    /// Recursive dump of the whole snapshot
    pub fn pretty_print<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        self.tree.pretty_print(self.tree.root(), w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Index {
        let mut tree = Tree::new(FileNode::directory("/", 100, 0o755).with_inode(1));
        let root = tree.root();
        tree.insert_child(root, FileNode::file("/a.txt", 3, 90, 0o644).with_inode(2))
            .unwrap();
        let docs = tree
            .insert_child(root, FileNode::directory("/docs", 95, 0o755).with_inode(3))
            .unwrap();
        tree.insert_child(docs, FileNode::file("/docs/d.pdf", 10, 95, 0o644).with_inode(4))
            .unwrap();
        let mut ignored = FileNode::directory("/node_modules", 80, 0o755)
            .with_inode(5)
            .with_state(SyncState::Ignored);
        ignored.children = None;
        tree.insert_child(root, ignored).unwrap();
        Index::from_tree(tree).unwrap()
    }

    #[test]
    fn test_get_directory_and_file() {
        let index = sample();
        assert_eq!(index.get_directory("/docs").unwrap().inode, 3);
        assert_eq!(index.get("/docs").unwrap().inode, 3);
        assert_eq!(index.get("/docs/d.pdf").unwrap().inode, 4);
        assert_eq!(index.get("/a.txt").unwrap().size, 3);
        assert_eq!(index.get("/").unwrap().inode, 1);
    }

    #[test]
    fn test_get_directory_does_not_find_files() {
        let index = sample();
        assert!(index.get_directory("/a.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_unlisted_directory_is_reachable_through_parent() {
        let index = sample();
        assert!(index.get_directory("/node_modules").is_err());
        assert!(index.get("/node_modules").unwrap().is_ignored());
        assert_eq!(index.directory_count(), 2);
    }

    #[test]
    fn test_missing_entries_are_not_found() {
        let index = sample();
        assert!(index.get("/docs/missing").unwrap_err().is_not_found());
        assert!(index.get("/nope/a.txt").unwrap_err().is_not_found());
        assert!(index.get("").unwrap_err().is_not_found());
    }

    #[test]
    fn test_set_state() {
        let mut index = sample();
        index.set_state("/docs/d.pdf", SyncState::Ignored).unwrap();
        assert!(index.get("/docs/d.pdf").unwrap().is_ignored());
        assert!(index.set_state("/missing", SyncState::Deleted).is_err());
    }

    #[test]
    fn test_empty_index() {
        let index = Index::empty();
        assert_eq!(index.root().modified_at, 0);
        assert!(index.get_directory("/").is_ok());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_diff_of_identical_indexes_is_empty() {
        assert!(sample().diff(&sample()).is_empty());
    }

    #[test]
    fn test_diff_reports_changes() {
        let a = sample();
        let mut tree = a.tree().clone();
        let docs = a.get_directory_id("/docs").unwrap();
        tree.insert_child(docs, FileNode::file("/docs/e.img", 1, 99, 0o644))
            .unwrap();
        let b = Index::from_tree(tree).unwrap();

        let diffs = a.diff(&b);
        assert!(diffs.iter().any(|d| d.contains("different version of /docs")));
        assert!(diffs
            .iter()
            .any(|d| d.contains("this index does not contain /docs/e.img")));
        assert!(diffs.iter().any(|d| d.contains("number of children for /docs")));
    }

    #[test]
    fn test_from_tree_rejects_bad_root() {
        let tree = Tree::new(FileNode::file("/", 1, 1, 0o644));
        assert!(matches!(
            Index::from_tree(tree),
            Err(SyncError::CorruptIndex(_))
        ));
    }

    #[test]
    fn test_store_and_load_round_trip() {
        let index = sample();
        let mut buf = Vec::new();
        index.store(&mut buf).unwrap();
        let loaded = Index::load(buf.as_slice()).unwrap();
        assert!(index.diff(&loaded).is_empty());
        assert!(loaded.get("/node_modules").unwrap().is_ignored());
        assert!(loaded.get("/node_modules").unwrap().children.is_none());
    }
}
