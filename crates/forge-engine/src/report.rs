//! Final run report

use forge_domain::RunStats;
use std::path::PathBuf;
use std::time::Duration;

/// What a pipeline run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Tasks handed to workers in this run
    pub dispatched: u64,

    /// Outcomes recorded as Success in this run
    pub succeeded: u64,

    /// Outcomes recorded as Failure in this run
    pub failed: u64,

    /// Tasks stopped by cancellation (retried on resume)
    pub abandoned: u64,

    /// Tasks still without an Outcome
    pub pending: u64,

    /// Tasks already completed when the run started
    pub previously_completed: u64,

    /// Checkpoint totals across all runs
    pub totals: RunStats,

    /// Wall-clock duration of this run
    pub elapsed: Duration,

    /// Whether the run was interrupted before finishing
    pub interrupted: bool,

    /// Output file
    pub output: PathBuf,

    /// Error log
    pub error_log: PathBuf,
}

impl RunReport {
    /// Outcomes recorded in this run
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// Outcomes per second in this run
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed() as f64 / secs
        } else {
            0.0
        }
    }

    /// Whether every task in the input has an Outcome
    pub fn is_complete(&self) -> bool {
        !self.interrupted && self.pending == 0
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Run Summary".to_string(),
            "===========".to_string(),
            format!(
                "Status: {}",
                if self.is_complete() {
                    "complete"
                } else if self.interrupted {
                    "interrupted (resume to continue)"
                } else {
                    "incomplete"
                }
            ),
            format!("Elapsed: {:.1}s", self.elapsed.as_secs_f64()),
            String::new(),
            "This run:".to_string(),
            format!("  Dispatched: {}", self.dispatched),
            format!("  Succeeded: {}", self.succeeded),
            format!("  Failed: {}", self.failed),
        ];
        if self.abandoned > 0 {
            lines.push(format!("  Abandoned: {}", self.abandoned));
        }
        lines.push(format!("  Throughput: {:.2} tasks/s", self.throughput()));
        lines.push(String::new());

        lines.push("All runs:".to_string());
        lines.push(format!("  Previously completed: {}", self.previously_completed));
        lines.push(format!("  Processed: {}", self.totals.processed_count));
        lines.push(format!(
            "  Success rate: {:.1}%",
            self.totals.success_rate() * 100.0
        ));
        lines.push(format!("  Pending: {}", self.pending));
        lines.push(String::new());

        lines.push(format!("Output: {}", self.output.display()));
        if self.totals.failure_count > 0 {
            lines.push(format!("Error log: {}", self.error_log.display()));
        }

        lines.join("\n")
    }
}
