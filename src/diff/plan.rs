//! SyncPlan - collected comparator output

use crate::types::{Side, Task};

/// Tasks produced by one comparison, with statistics
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncPlan {
    /// Tasks in path order
    pub tasks: Vec<Task>,

    /// Aggregate statistics about the plan
    pub stats: PlanStats,

    /// The remote snapshot must be re-stored even if nothing is transferred
    pub index_upload_required: bool,

    /// Local subtrees that could not be examined and got no tasks
    pub unknown: Vec<String>,
}

impl SyncPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task to the plan and update statistics
    pub fn add_task(&mut self, task: Task) {
        match &task {
            Task::Upload { .. } => self.stats.uploads += 1,
            Task::Download { .. } => self.stats.downloads += 1,
            Task::Delete {
                deleted_on: Side::Local,
                ..
            } => self.stats.remote_deletions += 1,
            Task::Delete {
                deleted_on: Side::Remote,
                ..
            } => self.stats.local_deletions += 1,
            Task::MetadataChangeLocal { .. } => self.stats.metadata_changes += 1,
            Task::Conflict { .. } => self.stats.conflicts += 1,
        }
        self.stats.total_bytes += task.transfer_bytes();
        self.tasks.push(task);
    }

    /// Sort tasks by path for deterministic output
    ///
    /// The sort is stable, so a directory always precedes its contents.
    pub fn sort_by_path(&mut self) {
        self.tasks.sort_by(|a, b| a.path().cmp(b.path()));
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// True if every local entry could be compared
    pub fn is_complete(&self) -> bool {
        self.unknown.is_empty()
    }

    /// True if executing the plan would change either side's contents
    pub fn has_transfers(&self) -> bool {
        self.stats.uploads + self.stats.downloads > 0
    }
}

/// Statistics about a sync plan
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanStats {
    pub uploads: usize,
    pub downloads: usize,

    /// Entries deleted remotely, to be removed locally
    pub local_deletions: usize,

    /// Entries deleted locally, to be removed remotely
    pub remote_deletions: usize,

    pub metadata_changes: usize,
    pub conflicts: usize,

    /// Bytes of file content to move in either direction
    pub total_bytes: u64,
}

impl PlanStats {
    /// Deletions awaiting confirmation, in both directions
    pub fn deletions(&self) -> usize {
        self.local_deletions + self.remote_deletions
    }
}
