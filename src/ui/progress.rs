//! Terminal progress for the explore, compare and execute phases

use crate::executor::ExecutionStats;
use crate::scanner::WalkReport;
use indicatif::{HumanBytes, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

/// Bytes moved since the execute phase began
#[derive(Debug, Default)]
struct Throughput {
    started_at: Option<Instant>,
    bytes: u64,
}

impl Throughput {
    fn restart(&mut self) {
        self.started_at = Some(Instant::now());
        self.bytes = 0;
    }

    fn add(&mut self, bytes: u64) {
        self.bytes = self.bytes.saturating_add(bytes);
    }

    /// Average bytes per second, zero before anything was timed
    fn rate(&self) -> u64 {
        let Some(started) = self.started_at else {
            return 0;
        };
        let secs = started.elapsed().as_secs_f64();
        if secs > 0.0 {
            (self.bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// One spinner for exploring and comparing, one bar for executing tasks
pub struct ProgressReporter {
    phase: ProgressBar,
    tasks: ProgressBar,
    throughput: Throughput,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let phase = ProgressBar::new_spinner();
        phase.enable_steady_tick(Duration::from_millis(100));
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed}] {msg}") {
            phase.set_style(style);
        }

        let tasks = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {bar:32.green/white} {pos}/{len} {msg}")
        {
            tasks.set_style(style.progress_chars("##-"));
        }

        Self {
            phase,
            tasks,
            throughput: Throughput::default(),
        }
    }

    /// Reporter that draws nothing
    pub fn hidden() -> Self {
        let reporter = Self::new();
        reporter.phase.disable_steady_tick();
        reporter.phase.set_draw_target(ProgressDrawTarget::hidden());
        reporter.tasks.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    pub fn begin_explore(&self, label: &str) {
        self.phase.set_message(format!("exploring {}", label));
    }

    /// Running totals from the explorer workers
    pub fn explored(&self, label: &str, files: u64, bytes: u64) {
        self.phase.set_message(format!(
            "exploring {}: {} files, {}",
            label,
            files,
            HumanBytes(bytes)
        ));
    }

    pub fn finish_explore(&self, label: &str, report: &WalkReport) {
        let mut msg = format!(
            "explored {}: {} directories, {} files",
            label, report.directories, report.files
        );
        if report.skipped > 0 {
            msg.push_str(&format!(", {} skipped", report.skipped));
        }
        self.phase.set_message(msg);
    }

    pub fn begin_compare(&self) {
        self.phase
            .set_message("comparing with the remote snapshot".to_string());
    }

    pub fn finish_compare(&self, tasks: usize) {
        self.phase
            .finish_with_message(format!("compared: {} task(s) planned", tasks));
    }

    /// Switch to the execute phase for a plan of `total` tasks
    pub fn begin_tasks(&mut self, total: u64) {
        self.throughput.restart();
        self.tasks.set_length(total);
        self.tasks.set_position(0);
        self.tasks.set_message(String::new());
    }

    pub fn task_started(&self, action: &str, path: &str) {
        self.tasks.set_message(format!("{} {}", action, path));
    }

    /// A task finished or was skipped; `bytes` is what it moved
    pub fn task_done(&mut self, bytes: u64) {
        self.throughput.add(bytes);
        self.tasks.inc(1);
        self.tasks.set_message(format!(
            "{} at {}/s",
            HumanBytes(self.throughput.bytes),
            HumanBytes(self.throughput.rate())
        ));
    }

    pub fn task_failed(&self, action: &str, path: &str, err: &str) {
        self.tasks.inc(1);
        self.tasks
            .println(format!("failed to {} {}: {}", action, path, err));
    }

    pub fn finish_tasks(&self, stats: &ExecutionStats) {
        self.tasks.finish_with_message(format!(
            "done: {} applied, {} failed, {} skipped, {} moved",
            stats.completed_actions,
            stats.failed_actions,
            stats.skipped_actions,
            HumanBytes(stats.bytes_transferred)
        ));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
