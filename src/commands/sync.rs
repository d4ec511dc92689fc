//! `sync` - explore, compare, execute, then store the converged snapshot

use super::{compare, explore_local, format_plan_preview, format_plan_tasks, load_remote};
use crate::diff::SyncPlan;
use crate::executor::{ExecutionEvent, ExecutionStats, Executor};
use crate::index::Index;
use crate::remote::{Backend, FolderBackend, PathHasher};
use crate::types::{Result, Task};
use crate::ui::{FailureLog, ProgressReporter};
use crate::Config;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// What one sync run did
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub plan: SyncPlan,
    /// `None` for dry runs and empty plans
    pub stats: Option<ExecutionStats>,
    /// A new remote snapshot was stored
    pub index_stored: bool,
}

/// Run one full synchronization against the configured remote
///
/// Task failures do not stop the run; they are summarized and returned as
/// an `Incomplete` error after every task was attempted, and the remote
/// snapshot is left as it was. Entries the walk could not read are left out
/// of the plan; everything else is still synchronized.
pub fn run(config: &Config) -> Result<SyncOutcome> {
    let backend = FolderBackend::open(config.require_remote()?)?;
    let hasher = PathHasher::new(&config.secret);
    let reporter = Arc::new(Mutex::new(ProgressReporter::new()));

    let (local, report) = explore_local(config, &reporter, "local")?;
    let (remote, seeded) = load_remote(&backend)?;
    let local = Arc::new(local);
    let remote = Arc::new(remote);

    let plan = compare(
        config,
        Arc::clone(&local),
        Arc::clone(&remote),
        &report.skipped_paths,
        &reporter,
    )?;
    println!("{}", format_plan_preview(&plan));

    let mut outcome = SyncOutcome {
        plan,
        ..Default::default()
    };

    if config.dry_run {
        println!("{}", format_plan_tasks(&outcome.plan));
        println!("Dry-run mode: no changes were made.");
        return Ok(outcome);
    }
    if outcome.plan.is_empty() && seeded {
        println!("Nothing to sync.");
        return Ok(outcome);
    }

    if let Ok(mut progress) = reporter.lock() {
        progress.begin_tasks(outcome.plan.tasks.len() as u64);
    }
    let failures = Arc::new(Mutex::new(FailureLog::new()));
    let on_event = {
        let reporter = Arc::clone(&reporter);
        let failures = Arc::clone(&failures);
        move |event: &ExecutionEvent| {
            let Ok(mut progress) = reporter.lock() else {
                return;
            };
            match event {
                ExecutionEvent::ActionStart { action, path, .. } => {
                    progress.task_started(action, path)
                }
                ExecutionEvent::ActionSuccess {
                    bytes_transferred, ..
                } => progress.task_done(*bytes_transferred),
                ExecutionEvent::ActionSkipped { .. } => progress.task_done(0),
                ExecutionEvent::ActionError {
                    action,
                    path,
                    error,
                    ..
                } => {
                    progress.task_failed(action, path, &error.to_string());
                    if let Ok(mut log) = failures.lock() {
                        log.record(action, path, error);
                    }
                }
                ExecutionEvent::Complete { stats } => progress.finish_tasks(stats),
            }
        }
    };

    let result = Executor::new(&config.root, &backend, &hasher, &local, &remote)
        .allow_deletes(config.allow_inferred_deletes)
        .execute(&outcome.plan, Some(&on_event));
    if let Ok(log) = failures.lock() {
        if !log.is_empty() {
            println!("{}", log.render());
        }
    }
    let stats = result?;

    if stats.deferred_deletions > 0 {
        println!(
            "{} inferred deletion(s) await confirmation; rerun with --allow-deletes to apply them.",
            stats.deferred_deletions
        );
    }
    if stats.conflicts > 0 {
        println!(
            "{} conflict(s) left untouched; keep one version and sync again.",
            stats.conflicts
        );
    }
    if !outcome.plan.is_complete() {
        println!(
            "Not synchronized (could not be read locally): {}",
            outcome.plan.unknown.len()
        );
    }

    if should_store_snapshot(&outcome.plan, &stats, seeded) {
        outcome.index_stored = store_converged_snapshot(config, &reporter, &backend, &outcome.plan)?;
    }
    outcome.stats = Some(stats);
    Ok(outcome)
}

/// The remote snapshot is replaced only once both sides agree
///
/// A plan that left entries uncompared cannot prove agreement for them, and
/// an unresolved conflict means the sides still differ.
fn should_store_snapshot(plan: &SyncPlan, stats: &ExecutionStats, seeded: bool) -> bool {
    stats.is_converged()
        && plan.is_complete()
        && (plan.has_transfers()
            || plan.index_upload_required
            || stats.completed_actions > 0
            || !seeded)
}

/// Rescan, apply index-only records, and store the result remotely
///
/// Returns false when the rescan was incomplete and nothing was stored.
fn store_converged_snapshot(
    config: &Config,
    reporter: &Arc<Mutex<ProgressReporter>>,
    backend: &dyn Backend,
    plan: &SyncPlan,
) -> Result<bool> {
    let (mut snapshot, report) = explore_local(config, reporter, "converged tree")?;
    if report.is_incomplete() {
        warn!("rescan skipped entries; remote snapshot left unchanged");
        return Ok(false);
    }
    apply_index_records(&mut snapshot, plan)?;
    backend.store_index(&snapshot)?;
    info!(nodes = snapshot.len(), "remote snapshot stored");
    Ok(true)
}

fn apply_index_records(snapshot: &mut Index, plan: &SyncPlan) -> Result<()> {
    for task in &plan.tasks {
        if let Task::MetadataChangeLocal { path, state } = task {
            match snapshot.set_state(path, *state) {
                Ok(()) => {}
                // gone since the plan was made
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
    }
    Ok(())
}
