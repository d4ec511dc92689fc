//! FileNode - One filesystem entry inside a snapshot

use super::path;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    /// Devices, pipes, sockets
    Other,
}

/// Entry kind plus POSIX permission bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileMode {
    pub kind: FileKind,
    /// Permission bits (`0o7777` mask)
    pub permissions: u32,
}

impl FileMode {
    pub fn new(kind: FileKind, permissions: u32) -> Self {
        Self {
            kind,
            permissions: permissions & 0o7777,
        }
    }

    pub fn regular(permissions: u32) -> Self {
        Self::new(FileKind::Regular, permissions)
    }

    pub fn directory(permissions: u32) -> Self {
        Self::new(FileKind::Directory, permissions)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_regular(&self) -> bool {
        self.kind == FileKind::Regular
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FileKind::Regular => '-',
            FileKind::Directory => 'd',
            FileKind::Symlink => 'l',
            FileKind::Other => '?',
        };
        let mut out = String::with_capacity(10);
        out.push(kind);
        for shift in [6u32, 3, 0] {
            let bits = (self.permissions >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        f.write_str(&out)
    }
}

/// Synchronization state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncState {
    #[default]
    Unchecked,
    Unmodified,
    Modified,
    Deleted,
    Ignored,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncState::Unchecked => "Unchecked",
            SyncState::Unmodified => "Unmodified",
            SyncState::Modified => "Modified",
            SyncState::Deleted => "Deleted",
            SyncState::Ignored => "Ignored",
        };
        f.write_str(name)
    }
}

/// Position of a node inside its owning [`Tree`](super::Tree)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Represents one entry of a snapshot
///
/// Directory nodes own their children through the tree arena: `children`
/// holds positions in the arena, ordered by name. A directory whose contents
/// were never recorded (ignored, or unreadable during the walk) keeps
/// `children == None`; an empty directory has `Some(vec![])`. Regular files
/// always have `None`.
#[derive(Debug, Clone)]
pub struct FileNode {
    /// Virtual path from the sync root (`/` separated)
    pub path: String,

    /// Creation time in unix nanoseconds
    pub created_at: i64,

    /// Last modification time in unix nanoseconds
    pub modified_at: i64,

    /// Kind and permission bits
    pub mode: FileMode,

    /// Platform identity key (inode, best effort elsewhere)
    pub inode: u64,

    /// Byte count for files, child count for directories
    pub size: u64,

    pub children: Option<Vec<NodeId>>,

    pub state: SyncState,
}

/// The attributes that decide whether two nodes denote the same entry
#[derive(Debug, PartialEq, Eq)]
pub struct Identity<'a> {
    pub inode: u64,
    pub path: &'a str,
    pub created_at: i64,
    pub modified_at: i64,
    pub mode: FileMode,
    pub size: u64,
}

impl FileNode {
    /// Create a node with the given path and mode; all other fields zeroed.
    ///
    /// Directories start with an empty child list.
    pub fn new(path: impl Into<String>, mode: FileMode) -> Self {
        Self {
            path: path.into(),
            created_at: 0,
            modified_at: 0,
            mode,
            inode: 0,
            size: 0,
            children: mode.is_dir().then(Vec::new),
            state: SyncState::Unchecked,
        }
    }

    /// Create a regular file node
    pub fn file(path: impl Into<String>, size: u64, modified_at: i64, permissions: u32) -> Self {
        let mut node = Self::new(path, FileMode::regular(permissions));
        node.size = size;
        node.created_at = modified_at;
        node.modified_at = modified_at;
        node
    }

    /// Create a directory node with no children
    pub fn directory(path: impl Into<String>, modified_at: i64, permissions: u32) -> Self {
        let mut node = Self::new(path, FileMode::directory(permissions));
        node.created_at = modified_at;
        node.modified_at = modified_at;
        node
    }

    pub fn with_inode(mut self, inode: u64) -> Self {
        self.inode = inode;
        self
    }

    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_state(mut self, state: SyncState) -> Self {
        self.state = state;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    pub fn is_ignored(&self) -> bool {
        self.state == SyncState::Ignored
    }

    /// Name of the entry (last path component)
    pub fn base(&self) -> &str {
        path::base(&self.path)
    }

    /// Path of the containing directory
    pub fn dirname(&self) -> &str {
        path::dirname(&self.path)
    }

    pub fn identity(&self) -> Identity<'_> {
        Identity {
            inode: self.inode,
            path: &self.path,
            created_at: self.created_at,
            modified_at: self.modified_at,
            mode: self.mode,
            size: self.size,
        }
    }

    /// True when both nodes denote the same, unchanged entry.
    ///
    /// `state` and `children` do not take part in the comparison.
    pub fn same_identity(&self, other: &FileNode) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Display for FileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{:?} {} {} mtime: {}}}",
            self.path, self.mode, self.state, self.modified_at
        )
    }
}
