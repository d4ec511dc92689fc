//! Task - Actions inferred by the comparator

use super::{FileKind, SyncState};
use std::fmt;

/// Side of the synchronization a record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}

/// Reconciliation task emitted by the comparator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Local entry is newer than anything the remote recorded
    Upload { path: String, kind: FileKind, size: u64 },

    /// Remote entry was never seen locally
    Download { path: String, kind: FileKind, size: u64 },

    /// Entry was (probably) deleted on `deleted_on` and should be removed
    /// from the other side. Inferred from parent timestamps, never certain.
    Delete {
        path: String,
        deleted_on: Side,
        kind: FileKind,
    },

    /// Index-only record: the local snapshot changes state, nothing moves
    MetadataChangeLocal { path: String, state: SyncState },

    /// Both sides changed and neither is strictly newer
    Conflict {
        path: String,
        local_modified_at: i64,
        remote_modified_at: i64,
    },
}

impl Task {
    pub fn path(&self) -> &str {
        match self {
            Task::Upload { path, .. }
            | Task::Download { path, .. }
            | Task::Delete { path, .. }
            | Task::MetadataChangeLocal { path, .. }
            | Task::Conflict { path, .. } => path,
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            Task::Upload { .. } => "upload",
            Task::Download { .. } => "download",
            Task::Delete {
                deleted_on: Side::Local,
                ..
            } => "delete-remote",
            Task::Delete {
                deleted_on: Side::Remote,
                ..
            } => "delete-local",
            Task::MetadataChangeLocal { .. } => "metadata",
            Task::Conflict { .. } => "conflict",
        }
    }

    /// True for tasks that move file content across the backend
    pub fn is_network_bound(&self) -> bool {
        matches!(self, Task::Upload { .. } | Task::Download { .. })
    }

    /// Bytes that would be transferred (files only)
    pub fn transfer_bytes(&self) -> u64 {
        match self {
            Task::Upload {
                kind: FileKind::Regular,
                size,
                ..
            }
            | Task::Download {
                kind: FileKind::Regular,
                size,
                ..
            } => *size,
            _ => 0,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::MetadataChangeLocal { path, state } => {
                write!(f, "{:<14} {} -> {}", self.action_name(), path, state)
            }
            Task::Conflict {
                path,
                local_modified_at,
                remote_modified_at,
            } => write!(
                f,
                "{:<14} {} (local mtime {}, remote mtime {})",
                self.action_name(),
                path,
                local_modified_at,
                remote_modified_at
            ),
            _ => write!(f, "{:<14} {}", self.action_name(), self.path()),
        }
    }
}
