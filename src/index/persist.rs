//! Recursive JSON encoding of a snapshot tree
//!
//! The whole tree is written as its root node with children nested inline.
//! Decoding rebuilds the arena iteratively.

use crate::types::{path, FileMode, FileNode, NodeId, Result, SyncError, SyncState, Tree};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::io::{Read, Write};

/// Borrowed view of one node for serialization
struct NodeView<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl Serialize for NodeView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let node = self.tree.node(self.id);
        let children: Option<Vec<NodeView<'_>>> = node.children.as_ref().map(|ids| {
            ids.iter()
                .map(|&id| NodeView {
                    tree: self.tree,
                    id,
                })
                .collect()
        });

        let mut s = serializer.serialize_struct("FileNode", 8)?;
        s.serialize_field("path", &node.path)?;
        s.serialize_field("created_at", &node.created_at)?;
        s.serialize_field("modified_at", &node.modified_at)?;
        s.serialize_field("mode", &node.mode)?;
        s.serialize_field("inode", &node.inode)?;
        s.serialize_field("size", &node.size)?;
        s.serialize_field("state", &node.state)?;
        s.serialize_field("children", &children)?;
        s.end()
    }
}

/// Owned decoded form of one node
#[derive(Deserialize)]
struct StoredNode {
    path: String,
    created_at: i64,
    modified_at: i64,
    mode: FileMode,
    inode: u64,
    size: u64,
    #[serde(default)]
    state: SyncState,
    #[serde(default)]
    children: Option<Vec<StoredNode>>,
}

impl StoredNode {
    /// Split into a bare node and its encoded children
    fn into_parts(self) -> (FileNode, Option<Vec<StoredNode>>) {
        let node = FileNode {
            path: self.path,
            created_at: self.created_at,
            modified_at: self.modified_at,
            mode: self.mode,
            inode: self.inode,
            size: self.size,
            children: None,
            state: self.state,
        };
        (node, self.children)
    }
}

pub(super) fn write_tree<W: Write>(tree: &Tree, writer: W) -> Result<()> {
    let root = NodeView {
        tree,
        id: tree.root(),
    };
    serde_json::to_writer(writer, &root).map_err(|e| {
        if e.is_io() {
            SyncError::Io(e.into())
        } else {
            SyncError::Runtime(format!("failed to encode index: {}", e))
        }
    })
}

pub(super) fn read_tree<R: Read>(reader: R) -> Result<Tree> {
    let stored: StoredNode = serde_json::from_reader(reader)
        .map_err(|e| SyncError::CorruptIndex(format!("failed to decode index: {}", e)))?;

    let (root, root_children) = stored.into_parts();
    let mut tree = Tree::new(root);
    let mut stack = vec![(tree.root(), root_children)];

    while let Some((parent, children)) = stack.pop() {
        let Some(children) = children else {
            continue;
        };
        if !tree.node(parent).is_dir() {
            return Err(SyncError::CorruptIndex(format!(
                "{} has children but is not a directory",
                tree.node(parent).path
            )));
        }

        let size = tree.node(parent).size;
        let (nodes, grandchildren): (Vec<_>, Vec<_>) =
            children.into_iter().map(StoredNode::into_parts).unzip();
        check_sorted(&tree.node(parent).path, &nodes)?;

        let ids = tree.attach_children(parent, nodes);
        // keep the recorded size, it is part of the node's identity
        tree.node_mut(parent).size = size;
        stack.extend(ids.into_iter().zip(grandchildren));
    }
    Ok(tree)
}

fn check_sorted(parent: &str, nodes: &[FileNode]) -> Result<()> {
    for node in nodes {
        path::validate(&node.path).map_err(|e| {
            SyncError::CorruptIndex(format!("bad entry below {}: {}", parent, e))
        })?;
    }
    for pair in nodes.windows(2) {
        if pair[0].base() >= pair[1].base() {
            return Err(SyncError::CorruptIndex(format!(
                "children of {} are not sorted ({} before {})",
                parent,
                pair[0].base(),
                pair[1].base()
            )));
        }
    }
    Ok(())
}
