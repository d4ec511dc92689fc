//! Comparator - bounded concurrent walk of two snapshots
//!
//! Every directory present on both sides is merged in its own task. A
//! counting semaphore caps how many merges run at once; a permit is held
//! only while a directory's children are being classified, never while
//! waiting for subdirectories.

use super::compare::{Outcome, Rules};
use super::plan::SyncPlan;
use crate::index::Index;
use crate::types::{NodeId, Result, SyncError, Task};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Builder;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Capacity of the task stream between comparator and consumer
const TASK_BUFFER: usize = 256;

struct Shared {
    local: Arc<Index>,
    remote: Arc<Index>,
    skipped: Arc<HashSet<String>>,
    permits: Semaphore,
    tasks: mpsc::Sender<Task>,
    index_upload_required: AtomicBool,
    unknown: Mutex<Vec<String>>,
}

/// What a comparison reports besides its tasks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// The remote snapshot must be re-stored
    pub index_upload_required: bool,
    /// Local subtrees that could not be examined, sorted
    pub unknown: Vec<String>,
}

/// Compares a local and a remote snapshot of the same tree
pub struct Comparator {
    local: Arc<Index>,
    remote: Arc<Index>,
    skipped: Arc<HashSet<String>>,
    concurrency: usize,
}

impl Comparator {
    /// `concurrency` bounds parallel directory merges (at least one)
    pub fn new(local: Arc<Index>, remote: Arc<Index>, concurrency: usize) -> Self {
        Self {
            local,
            remote,
            skipped: Arc::new(HashSet::new()),
            concurrency: concurrency.max(1),
        }
    }

    /// Local paths the walk skipped; they are never treated as absent
    pub fn with_skipped<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.skipped = Arc::new(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Stream tasks into `tasks` as they are inferred
    ///
    /// Stops at the first NotFound or invariant violation; tasks already
    /// sent stay sent.
    pub async fn run(&self, tasks: mpsc::Sender<Task>) -> Result<RunSummary> {
        let shared = Arc::new(Shared {
            local: Arc::clone(&self.local),
            remote: Arc::clone(&self.remote),
            skipped: Arc::clone(&self.skipped),
            permits: Semaphore::new(self.concurrency),
            tasks,
            index_upload_required: AtomicBool::new(false),
            unknown: Mutex::new(Vec::new()),
        });

        let local_root = shared.local.tree().root();
        let remote_root = shared.remote.tree().root();
        let (outcome, descend) = {
            let mut rules = Rules::new(&shared.local, &shared.remote, &shared.skipped);
            let descend = rules.compare_entry(Some(local_root), Some(remote_root))?;
            (rules.into_outcome(), descend)
        };
        publish(&shared, outcome).await?;
        if let Some((l, r)) = descend {
            compare_directories(Arc::clone(&shared), l, r).await?;
        }

        let mut unknown = shared
            .unknown
            .lock()
            .map(|mut paths| std::mem::take(&mut *paths))
            .map_err(|_| SyncError::Runtime("comparator state poisoned".to_string()))?;
        unknown.sort();
        Ok(RunSummary {
            index_upload_required: shared.index_upload_required.load(Ordering::Acquire),
            unknown,
        })
    }

    /// Run the comparison to completion and collect a sorted plan
    pub async fn compare(&self) -> Result<SyncPlan> {
        let (tx, mut rx) = mpsc::channel(TASK_BUFFER);
        let collector = tokio::spawn(async move {
            let mut plan = SyncPlan::new();
            while let Some(task) = rx.recv().await {
                plan.add_task(task);
            }
            plan
        });

        let result = self.run(tx).await;
        let mut plan = collector
            .await
            .map_err(|e| SyncError::Runtime(format!("task collector failed: {}", e)))?;
        let summary = result?;
        plan.index_upload_required = summary.index_upload_required;
        plan.unknown = summary.unknown;
        plan.sort_by_path();

        info!(
            uploads = plan.stats.uploads,
            downloads = plan.stats.downloads,
            deletions = plan.stats.deletions(),
            metadata = plan.stats.metadata_changes,
            conflicts = plan.stats.conflicts,
            unknown = plan.unknown.len(),
            "comparison finished"
        );
        Ok(plan)
    }

    /// Blocking wrapper: runs [`Comparator::compare`] on a private runtime
    pub fn plan(&self) -> Result<SyncPlan> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(self.concurrency.min(num_cpus()))
            .enable_all()
            .build()
            .map_err(SyncError::Io)?;
        runtime.block_on(self.compare())
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

async fn publish(shared: &Shared, outcome: Outcome) -> Result<()> {
    if outcome.index_upload_required {
        shared.index_upload_required.store(true, Ordering::Release);
    }
    if !outcome.unknown.is_empty() {
        let mut unknown = shared
            .unknown
            .lock()
            .map_err(|_| SyncError::Runtime("comparator state poisoned".to_string()))?;
        unknown.extend(outcome.unknown);
    }
    for task in outcome.tasks {
        shared
            .tasks
            .send(task)
            .await
            .map_err(|_| SyncError::Runtime("task receiver dropped".to_string()))?;
    }
    Ok(())
}

/// Merge one directory pair, then its subdirectory pairs in parallel
fn compare_directories(
    shared: Arc<Shared>,
    local: NodeId,
    remote: NodeId,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
    Box::pin(async move {
        let permit = shared
            .permits
            .acquire()
            .await
            .map_err(|_| SyncError::Runtime("comparator semaphore closed".to_string()))?;
        let (outcome, descend) = {
            let mut rules = Rules::new(&shared.local, &shared.remote, &shared.skipped);
            let descend = rules.merge_children(local, remote)?;
            (rules.into_outcome(), descend)
        };
        drop(permit);

        debug!(
            path = %shared.local.tree().node(local).path,
            tasks = outcome.tasks.len(),
            subdirectories = descend.len(),
            "directory compared"
        );
        publish(&shared, outcome).await?;

        let mut children = JoinSet::new();
        for (l, r) in descend {
            children.spawn(compare_directories(Arc::clone(&shared), l, r));
        }
        while let Some(joined) = children.join_next().await {
            joined.map_err(|e| SyncError::Runtime(format!("comparison task failed: {}", e)))??;
        }
        Ok(())
    })
}
