//! Executor - applies a sync plan to the backend and the local root

pub mod local;

use crate::diff::SyncPlan;
use crate::index::Index;
use crate::remote::{Backend, PathHasher, RemoteFile};
use crate::types::{path, FileKind, FileNode, Result, Side, SyncError, SyncState, Task};
use std::fs::File;
use std::io::{BufReader, Error};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use local::{remove_path_any, restore_file_atomic};

/// Execution progress statistics for a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Number of tasks in the input plan.
    pub total_actions: usize,
    /// Number of successfully processed tasks.
    pub completed_actions: usize,
    /// Number of failed tasks.
    pub failed_actions: usize,
    /// Tasks that move nothing (index-only records, conflicts, unsupported kinds).
    pub skipped_actions: usize,
    /// Inferred deletions left alone because deletes were not allowed.
    pub deferred_deletions: usize,
    /// Conflicts left for the user; each is also counted as skipped.
    pub conflicts: usize,
    /// Aggregate bytes moved in either direction.
    pub bytes_transferred: u64,
}

impl ExecutionStats {
    /// True when the local tree and the backend should now agree
    ///
    /// An unresolved conflict means the two sides still hold different
    /// versions of an entry.
    pub fn is_converged(&self) -> bool {
        self.failed_actions == 0 && self.deferred_deletions == 0 && self.conflicts == 0
    }
}

/// Events emitted while executing a plan.
#[derive(Debug)]
pub enum ExecutionEvent {
    /// Task execution started.
    ActionStart {
        index: usize,
        total: usize,
        action: &'static str,
        path: String,
    },
    /// Task execution succeeded.
    ActionSuccess {
        index: usize,
        total: usize,
        action: &'static str,
        path: String,
        bytes_transferred: u64,
    },
    /// Task was not carried out.
    ActionSkipped {
        index: usize,
        total: usize,
        action: &'static str,
        path: String,
        reason: &'static str,
    },
    /// Task execution failed but executor continued.
    ActionError {
        index: usize,
        total: usize,
        action: &'static str,
        path: String,
        error: SyncError,
    },
    /// Plan execution completed (with or without errors).
    Complete { stats: ExecutionStats },
}

/// Optional callback used to receive execution events.
pub type ExecutionCallback = dyn Fn(&ExecutionEvent) + Send + Sync;

enum Applied {
    Done(u64),
    Skipped(&'static str),
}

/// Applies plans between one local root and one backend
///
/// `local` and `remote` are the snapshots the plan was computed from; they
/// provide the metadata of each entry a task names.
pub struct Executor<'a> {
    root: PathBuf,
    backend: &'a dyn Backend,
    hasher: &'a PathHasher,
    local: &'a Index,
    remote: &'a Index,
    allow_deletes: bool,
}

impl<'a> Executor<'a> {
    pub fn new(
        root: impl Into<PathBuf>,
        backend: &'a dyn Backend,
        hasher: &'a PathHasher,
        local: &'a Index,
        remote: &'a Index,
    ) -> Self {
        Self {
            root: root.into(),
            backend,
            hasher,
            local,
            remote,
            allow_deletes: false,
        }
    }

    /// Act on inferred deletions instead of deferring them
    pub fn allow_deletes(mut self, allow: bool) -> Self {
        self.allow_deletes = allow;
        self
    }

    /// Execute a sync plan
    ///
    /// Executes tasks sequentially in plan order, continues on per-task
    /// failures, and returns an aggregated error summary if any task fails.
    /// Directory modification times of downloaded directories are restored
    /// last, deepest first.
    pub fn execute(
        &self,
        plan: &SyncPlan,
        on_event: Option<&ExecutionCallback>,
    ) -> Result<ExecutionStats> {
        let mut stats = ExecutionStats {
            total_actions: plan.tasks.len(),
            ..Default::default()
        };
        let mut errors: Vec<(String, SyncError)> = Vec::new();
        let mut restored_dirs: Vec<(PathBuf, i64)> = Vec::new();

        for (idx, task) in plan.tasks.iter().enumerate() {
            let index = idx + 1;
            let action = task.action_name();
            emit_event(
                on_event,
                ExecutionEvent::ActionStart {
                    index,
                    total: stats.total_actions,
                    action,
                    path: task.path().to_string(),
                },
            );

            match self.apply(task, &mut restored_dirs) {
                Ok(Applied::Done(bytes)) => {
                    stats.completed_actions += 1;
                    stats.bytes_transferred += bytes;
                    emit_event(
                        on_event,
                        ExecutionEvent::ActionSuccess {
                            index,
                            total: stats.total_actions,
                            action,
                            path: task.path().to_string(),
                            bytes_transferred: bytes,
                        },
                    );
                }
                Ok(Applied::Skipped(reason)) => {
                    stats.skipped_actions += 1;
                    match task {
                        Task::Delete { .. } => stats.deferred_deletions += 1,
                        Task::Conflict { .. } => stats.conflicts += 1,
                        _ => {}
                    }
                    debug!(path = task.path(), action, reason, "task skipped");
                    emit_event(
                        on_event,
                        ExecutionEvent::ActionSkipped {
                            index,
                            total: stats.total_actions,
                            action,
                            path: task.path().to_string(),
                            reason,
                        },
                    );
                }
                Err(err) => {
                    stats.failed_actions += 1;
                    warn!(path = task.path(), action, error = %err, "task failed");
                    emit_event(
                        on_event,
                        ExecutionEvent::ActionError {
                            index,
                            total: stats.total_actions,
                            action,
                            path: task.path().to_string(),
                            error: clone_error_for_event(&err),
                        },
                    );
                    errors.push((task.path().to_string(), err));
                }
            }
        }

        for (dir, modified_at) in restored_dirs.iter().rev() {
            if let Err(err) = local::restore_mtime(dir, *modified_at) {
                warn!(path = %dir.display(), error = %err, "could not restore directory time");
            }
        }

        emit_event(
            on_event,
            ExecutionEvent::Complete {
                stats: stats.clone(),
            },
        );

        if errors.is_empty() {
            Ok(stats)
        } else {
            Err(SyncError::Incomplete(build_error_summary(&errors)))
        }
    }

    fn apply(&self, task: &Task, restored_dirs: &mut Vec<(PathBuf, i64)>) -> Result<Applied> {
        match task {
            Task::Upload { path, .. } => self.upload(path),
            Task::Download { path, .. } => self.download(path, restored_dirs),
            Task::Delete { .. } if !self.allow_deletes => {
                Ok(Applied::Skipped("inferred deletion awaiting confirmation"))
            }
            Task::Delete {
                path,
                deleted_on: Side::Local,
                ..
            } => self.delete_remote(path),
            Task::Delete {
                path,
                deleted_on: Side::Remote,
                ..
            } => {
                remove_path_any(&self.host_path(path))?;
                Ok(Applied::Done(0))
            }
            Task::MetadataChangeLocal { .. } => Ok(Applied::Skipped("index only")),
            Task::Conflict { .. } => Ok(Applied::Skipped("conflict")),
        }
    }

    fn upload(&self, virtual_path: &str) -> Result<Applied> {
        let node = self.local.get(virtual_path)?;
        let file = RemoteFile::new(self.hasher, node);
        let existing = self.remote_entry(virtual_path);

        match node.mode.kind {
            FileKind::Directory => {
                if existing.is_some_and(|e| !e.is_dir()) {
                    self.backend.delete_file(&file)?;
                }
                self.backend.create_dir(&file)?;
                Ok(Applied::Done(0))
            }
            FileKind::Regular => {
                let host = self.host_path(virtual_path);
                let mut content =
                    BufReader::new(File::open(&host).map_err(|e| SyncError::entry(&host, e))?);
                let written = match existing {
                    Some(e) if e.mode.is_regular() => self.backend.update_file(&file, &mut content)?,
                    Some(e) => {
                        if e.is_dir() {
                            self.backend.delete_dir(&file)?;
                        } else {
                            self.backend.delete_file(&file)?;
                        }
                        self.backend.create_file(&file, &mut content)?
                    }
                    None => self.backend.create_file(&file, &mut content)?,
                };
                Ok(Applied::Done(written))
            }
            FileKind::Symlink | FileKind::Other => Ok(Applied::Skipped("kind is not transferred")),
        }
    }

    fn download(
        &self,
        virtual_path: &str,
        restored_dirs: &mut Vec<(PathBuf, i64)>,
    ) -> Result<Applied> {
        let node = self.remote.get(virtual_path)?;
        let host = self.host_path(virtual_path);
        match node.mode.kind {
            FileKind::Directory => {
                local::create_dir(&host)?;
                restored_dirs.push((host, node.modified_at));
                Ok(Applied::Done(0))
            }
            FileKind::Regular => {
                let file = RemoteFile::new(self.hasher, node);
                let written = restore_file_atomic(self.backend, &file, &host)?;
                Ok(Applied::Done(written))
            }
            FileKind::Symlink | FileKind::Other => Ok(Applied::Skipped("kind is not transferred")),
        }
    }

    fn delete_remote(&self, virtual_path: &str) -> Result<Applied> {
        let node = self.remote.get(virtual_path)?;
        let file = RemoteFile::new(self.hasher, node);
        if node.is_dir() {
            self.backend.delete_dir(&file)?;
        } else {
            self.backend.delete_file(&file)?;
        }
        Ok(Applied::Done(0))
    }

    /// Remote snapshot entry at `virtual_path`, unless it is only a deletion record
    fn remote_entry(&self, virtual_path: &str) -> Option<&FileNode> {
        self.remote
            .get(virtual_path)
            .ok()
            .filter(|node| node.state != SyncState::Deleted)
    }

    fn host_path(&self, virtual_path: &str) -> PathBuf {
        path::to_host(&self.root, virtual_path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn emit_event(on_event: Option<&ExecutionCallback>, event: ExecutionEvent) {
    if let Some(callback) = on_event {
        callback(&event);
    }
}

fn clone_error_for_event(error: &SyncError) -> SyncError {
    match error {
        SyncError::NotFound { path } => SyncError::NotFound { path: path.clone() },
        SyncError::Io(e) => SyncError::Io(Error::new(e.kind(), e.to_string())),
        SyncError::Entry { path, source } => SyncError::Entry {
            path: path.clone(),
            source: Error::new(source.kind(), source.to_string()),
        },
        SyncError::InvariantViolation { path, reason } => SyncError::InvariantViolation {
            path: path.clone(),
            reason: reason.clone(),
        },
        SyncError::MalformedPath(msg) => SyncError::MalformedPath(msg.clone()),
        SyncError::CorruptIndex(msg) => SyncError::CorruptIndex(msg.clone()),
        SyncError::RootUnavailable { path, source } => SyncError::RootUnavailable {
            path: path.clone(),
            source: Error::new(source.kind(), source.to_string()),
        },
        SyncError::Config(msg) => SyncError::Config(msg.clone()),
        SyncError::Backend(msg) => SyncError::Backend(msg.clone()),
        SyncError::Runtime(msg) => SyncError::Runtime(msg.clone()),
        SyncError::Incomplete(msg) => SyncError::Incomplete(msg.clone()),
    }
}

fn build_error_summary(errors: &[(String, SyncError)]) -> String {
    let preview = errors
        .iter()
        .take(3)
        .map(|(path, err)| format!("{}: {}", path, err))
        .collect::<Vec<_>>()
        .join("; ");

    format!(
        "Sync completed with {} error(s). Example failures: {}",
        errors.len(),
        preview
    )
}
