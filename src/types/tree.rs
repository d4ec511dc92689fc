//! Tree - Arena owning every node of one snapshot

use super::{path, FileNode, NodeId, SyncError};
use chrono::{TimeZone, Utc};
use std::io::{self, Write};

/// Snapshot tree
///
/// All nodes live in one vector; directories refer to their children by
/// position. The root is always the first node.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<FileNode>,
}

impl Tree {
    /// Create a tree holding only `root`
    pub fn new(root: FileNode) -> Self {
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root_node(&self) -> &FileNode {
        &self.nodes[0]
    }

    /// Node at `id`
    ///
    /// # Panics
    /// Panics if `id` was not produced by this tree.
    pub fn node(&self, id: NodeId) -> &FileNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&FileNode> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut FileNode {
        &mut self.nodes[id.0]
    }

    /// Number of nodes in the tree
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Child positions of `id`, empty for files and unlisted directories
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).children.as_deref().unwrap_or(&[])
    }

    /// Iterator over `(id, node)` pairs of the children of `id`, in name order
    pub fn child_nodes(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &FileNode)> + '_ {
        self.children(id).iter().map(move |&child| (child, self.node(child)))
    }

    /// Find a direct child by name
    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let children = self.children(parent);
        children
            .binary_search_by(|&child| self.node(child).base().cmp(name))
            .ok()
            .map(|i| children[i])
    }

    /// Insert one child under `parent`, keeping name order
    ///
    /// The parent's size is updated to its new child count.
    pub fn insert_child(&mut self, parent: NodeId, node: FileNode) -> Result<NodeId, SyncError> {
        path::validate(&node.path)?;
        let parent_node = self.node(parent);
        if node.dirname() != parent_node.path || node.path == path::ROOT {
            return Err(SyncError::InvariantViolation {
                path: node.path.clone(),
                reason: format!("not a direct child of {}", parent_node.path),
            });
        }
        let position = match &parent_node.children {
            None => {
                return Err(SyncError::InvariantViolation {
                    path: parent_node.path.clone(),
                    reason: "children are not recorded for this entry".to_string(),
                })
            }
            Some(children) => {
                match children.binary_search_by(|&child| self.node(child).base().cmp(node.base()))
                {
                    Ok(_) => {
                        return Err(SyncError::InvariantViolation {
                            path: node.path.clone(),
                            reason: "entry already exists".to_string(),
                        })
                    }
                    Err(position) => position,
                }
            }
        };

        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        let parent_node = self.node_mut(parent);
        if let Some(children) = parent_node.children.as_mut() {
            children.insert(position, id);
            parent_node.size = children.len() as u64;
        }
        Ok(id)
    }

    /// Replace the children of `parent` with `nodes`, sorted by name
    ///
    /// Used when a directory listing is finalized. Returns the new child
    /// positions in name order.
    pub fn attach_children(&mut self, parent: NodeId, mut nodes: Vec<FileNode>) -> Vec<NodeId> {
        nodes.sort_by(|a, b| a.base().cmp(b.base()));
        let first = self.nodes.len();
        let ids: Vec<NodeId> = (first..first + nodes.len()).map(NodeId).collect();
        self.nodes.extend(nodes);

        let parent_node = self.node_mut(parent);
        parent_node.size = ids.len() as u64;
        parent_node.children = Some(ids.clone());
        ids
    }

    /// `id` followed by all of its descendants, pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            // reversed so that children come out in name order
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    /// Recursive, indented dump of the subtree at `id` for diagnostics
    pub fn pretty_print<W: Write>(&self, id: NodeId, w: &mut W) -> io::Result<()> {
        self.print_level(id, w, 0)
    }

    fn print_level<W: Write>(&self, id: NodeId, w: &mut W, depth: usize) -> io::Result<()> {
        let node = self.node(id);
        let indent = "\t".repeat(depth);
        writeln!(w, "{}Path: {}", indent, node.path)?;
        writeln!(w, "{}CTime: {}", indent, format_nanos(node.created_at))?;
        writeln!(w, "{}MTime: {}", indent, format_nanos(node.modified_at))?;
        writeln!(w, "{}Mode: {}", indent, node.mode)?;
        writeln!(w, "{}Inode: {}", indent, node.inode)?;
        writeln!(w, "{}Size: {}", indent, node.size)?;
        writeln!(w, "{}State: {}", indent, node.state)?;

        if !node.is_dir() {
            return Ok(());
        }
        if node.children.is_none() {
            return writeln!(w, "{}Children (not recorded)", indent);
        }
        writeln!(w, "{}Children [", indent)?;
        for &child in self.children(id) {
            self.print_level(child, w, depth + 1)?;
        }
        writeln!(w, "{}]", indent)
    }

    /// `pretty_print` into a string
    pub fn display(&self, id: NodeId) -> String {
        let mut buf = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.pretty_print(id, &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn format_nanos(nanos: i64) -> String {
    Utc.timestamp_nanos(nanos).to_rfc3339()
}
