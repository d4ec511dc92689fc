//! Command bodies behind the binary's subcommands
//!
//! Each phase is a plain function so the binary and the integration tests
//! drive exactly the same code.

pub mod scan;
pub mod status;
pub mod sync;

use crate::diff::{Comparator, SyncPlan};
use crate::index::Index;
use crate::remote::Backend;
use crate::scanner::{Explorer, ProgressCallback, WalkReport};
use crate::types::Result;
use crate::ui::ProgressReporter;
use crate::Config;
use indicatif::HumanBytes;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Walk the configured root, reporting progress under `label`
pub fn explore_local(
    config: &Config,
    reporter: &Arc<Mutex<ProgressReporter>>,
    label: &'static str,
) -> Result<(Index, WalkReport)> {
    if let Ok(progress) = reporter.lock() {
        progress.begin_explore(label);
    }
    let on_progress: ProgressCallback = {
        let reporter = Arc::clone(reporter);
        Box::new(move |files: u64, bytes: u64| {
            if let Ok(progress) = reporter.lock() {
                progress.explored(label, files, bytes);
            }
        })
    };

    let explorer =
        Explorer::new(&config.root, config.ignore_rules()).workers(config.explore_workers);
    let (index, report) = explorer.explore_with_progress(Some(&on_progress))?;
    if let Ok(progress) = reporter.lock() {
        progress.finish_explore(label, &report);
    }
    if report.is_incomplete() {
        warn!(
            skipped = report.skipped,
            "some entries could not be read and are missing from the snapshot"
        );
    }
    Ok((index, report))
}

/// The backend's snapshot; a missing or unreadable one means "never synced"
///
/// Returns the snapshot and whether the backend actually held one.
pub fn load_remote(backend: &dyn Backend) -> Result<(Index, bool)> {
    match backend.load_index() {
        Ok(Some(index)) => Ok((index, true)),
        Ok(None) => Ok((Index::empty(), false)),
        Err(err @ crate::SyncError::CorruptIndex(_)) => {
            warn!(error = %err, "discarding unreadable remote snapshot");
            Ok((Index::empty(), false))
        }
        Err(err) => Err(err),
    }
}

/// Compare two snapshots with the configured concurrency
///
/// `skipped` names the local entries the walk could not read; they and
/// their subtrees get no tasks.
pub fn compare(
    config: &Config,
    local: Arc<Index>,
    remote: Arc<Index>,
    skipped: &[String],
    reporter: &Arc<Mutex<ProgressReporter>>,
) -> Result<SyncPlan> {
    if let Ok(progress) = reporter.lock() {
        progress.begin_compare();
    }
    let plan = Comparator::new(local, remote, config.compare_concurrency)
        .with_skipped(skipped.iter().cloned())
        .plan()?;
    if let Ok(progress) = reporter.lock() {
        progress.finish_compare(plan.tasks.len());
    }
    Ok(plan)
}

pub(crate) fn format_plan_preview(plan: &SyncPlan) -> String {
    let mut preview = format!(
        "Plan:\n  Upload: {}  Download: {}  Delete local: {}  Delete remote: {}  Metadata: {}  Conflict: {}\n  Total bytes to transfer: {}",
        plan.stats.uploads,
        plan.stats.downloads,
        plan.stats.local_deletions,
        plan.stats.remote_deletions,
        plan.stats.metadata_changes,
        plan.stats.conflicts,
        HumanBytes(plan.stats.total_bytes)
    );
    if !plan.is_complete() {
        preview.push_str(&format!(
            "\n  Not compared (could not be read locally): {}",
            plan.unknown.len()
        ));
    }
    preview
}

pub(crate) fn format_plan_tasks(plan: &SyncPlan) -> String {
    let mut lines = Vec::with_capacity(plan.tasks.len() + plan.unknown.len() + 2);
    lines.push("Tasks:".to_string());
    if plan.tasks.is_empty() {
        lines.push("  (nothing to do)".to_string());
    }
    for task in &plan.tasks {
        lines.push(format!("  {}", task));
    }
    if !plan.is_complete() {
        lines.push("Not compared:".to_string());
        for path in &plan.unknown {
            lines.push(format!("  {}", path));
        }
    }
    lines.join("\n")
}
