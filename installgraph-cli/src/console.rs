//! Console progress output.

use std::sync::atomic::{AtomicU64, Ordering};

use installgraph::executor::{PipelineReport, TaskFailure, TaskInfo, TaskListener};

/// Prints one line per user-visible task and a summary of minor ones.
#[derive(Debug, Default)]
pub struct ConsoleListener {
    minor_succeeded: AtomicU64,
    minor_failed: AtomicU64,
}

impl ConsoleListener {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskListener for ConsoleListener {
    fn on_running(&self, task: &TaskInfo) {
        if task.significance.should_show() {
            println!("  ... {}", task.name);
        }
    }

    fn on_succeeded(&self, task: &TaskInfo) {
        if task.significance.should_show() {
            println!("  ok  {}", task.name);
        } else if !task.significance.should_log() {
            self.minor_succeeded.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_failed(&self, task: &TaskInfo, failure: &TaskFailure) {
        if task.significance.should_show() {
            eprintln!("  FAILED {}: {}", task.name, failure);
        } else if !task.significance.should_log() {
            self.minor_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_pipeline_finished(&self, report: &PipelineReport) {
        let ok = self.minor_succeeded.load(Ordering::Relaxed);
        let failed = self.minor_failed.load(Ordering::Relaxed);
        if ok + failed > 0 {
            println!("  {} background downloads finished, {} failed", ok + failed, failed);
        }
        println!(
            "{} {} in {:.1}s",
            report.root,
            report.status,
            report.duration.as_secs_f64()
        );
    }
}
