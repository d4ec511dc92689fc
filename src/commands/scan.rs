//! `scan` - walk the local root and summarize it

use super::explore_local;
use crate::index::Index;
use crate::scanner::WalkReport;
use crate::types::{Result, SyncError};
use crate::ui::ProgressReporter;
use crate::Config;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Run the scan command
///
/// Optionally stores the snapshot at `index_out` and prints the whole tree.
pub fn run(config: &Config, index_out: Option<&Path>, print_tree: bool) -> Result<WalkReport> {
    let reporter = Arc::new(Mutex::new(ProgressReporter::new()));
    let (index, report) = explore_local(config, &reporter, "local")?;

    println!("{}", format_report(&report, &index));

    if let Some(out) = index_out {
        index.store_to_file(out)?;
        println!("Snapshot written to {}", out.display());
    }
    if print_tree {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        index.pretty_print(&mut lock).map_err(SyncError::Io)?;
        lock.flush().map_err(SyncError::Io)?;
    }
    Ok(report)
}

fn format_report(report: &WalkReport, index: &Index) -> String {
    let mut text = format!(
        "Scan:\n  Directories: {}  Files: {}  Ignored: {}  Skipped: {}\n  Nodes in snapshot: {}\n  Took: {:.2?}",
        report.directories,
        report.files,
        report.ignored,
        report.skipped,
        index.len(),
        report.duration
    );
    if report.is_incomplete() {
        text.push_str("\n  Some entries could not be read; see the log for details.");
    }
    text
}
