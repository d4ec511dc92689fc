//! `status` - show what a sync would do

use super::{compare, explore_local, format_plan_preview, format_plan_tasks, load_remote};
use crate::diff::SyncPlan;
use crate::remote::FolderBackend;
use crate::types::Result;
use crate::ui::ProgressReporter;
use crate::Config;
use std::sync::{Arc, Mutex};

/// Run the status command and return the plan it printed
pub fn run(config: &Config) -> Result<SyncPlan> {
    let backend = FolderBackend::open(config.require_remote()?)?;
    let reporter = Arc::new(Mutex::new(ProgressReporter::new()));

    let (local, report) = explore_local(config, &reporter, "local")?;
    let (remote, seeded) = load_remote(&backend)?;
    if !seeded {
        println!("Remote has no snapshot yet; everything local would be uploaded.");
    }

    let plan = compare(
        config,
        Arc::new(local),
        Arc::new(remote),
        &report.skipped_paths,
        &reporter,
    )?;
    println!("{}", format_plan_preview(&plan));
    println!("{}", format_plan_tasks(&plan));
    Ok(plan)
}
