//! Output formatting for the CLI.

use crate::cli::CliFormat;
use crate::error::Result;
use colored::*;
use forge_domain::CheckpointState;
use forge_engine::RunReport;
use serde_json::json;
use std::path::Path;
use tabled::{
    builder::Builder,
    settings::{object::Columns, Alignment, Modify, Style},
};

/// Checkpoint progress as shown by `forge status`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView<'a> {
    /// Checkpoint location
    pub path: &'a Path,
    /// Whether the file exists
    pub exists: bool,
    /// Loaded state (empty when missing)
    pub state: &'a CheckpointState,
    /// Records in the input, when an input was given
    pub total: Option<u64>,
    /// Records still to process, when an input was given
    pub remaining: Option<u64>,
}

/// Output formatter.
pub struct Formatter {
    format: CliFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: CliFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format the final report of a run.
    pub fn format_report(&self, report: &RunReport) -> Result<String> {
        match self.format {
            CliFormat::Text => Ok(report.summary()),
            CliFormat::Json => Ok(serde_json::to_string_pretty(&json!({
                "dispatched": report.dispatched,
                "succeeded": report.succeeded,
                "failed": report.failed,
                "abandoned": report.abandoned,
                "pending": report.pending,
                "previously_completed": report.previously_completed,
                "totals": report.totals,
                "elapsed_secs": report.elapsed.as_secs_f64(),
                "throughput": report.throughput(),
                "interrupted": report.interrupted,
                "complete": report.is_complete(),
                "output": report.output,
                "error_log": report.error_log,
            }))?),
        }
    }

    /// Format checkpoint progress.
    pub fn format_status(&self, view: &StatusView<'_>) -> Result<String> {
        match self.format {
            CliFormat::Json => self.format_status_json(view),
            CliFormat::Text => Ok(self.format_status_table(view)),
        }
    }

    fn format_status_json(&self, view: &StatusView<'_>) -> Result<String> {
        Ok(serde_json::to_string_pretty(&json!({
            "checkpoint": view.path,
            "exists": view.exists,
            "schema_version": view.state.schema_version,
            "completed": view.state.len(),
            "stats": view.state.stats,
            "success_rate": view.state.stats.success_rate(),
            "updated_at": view.state.updated_at,
            "total": view.total,
            "remaining": view.remaining,
        }))?)
    }

    fn format_status_table(&self, view: &StatusView<'_>) -> String {
        if !view.exists {
            return self.warning(&format!("No checkpoint at {}", view.path.display()));
        }

        let stats = &view.state.stats;
        let mut rows = vec![
            ("Checkpoint", view.path.display().to_string()),
            ("Completed", view.state.len().to_string()),
            ("Succeeded", stats.success_count.to_string()),
            ("Failed", stats.failure_count.to_string()),
            ("Success rate", format!("{:.1}%", stats.success_rate() * 100.0)),
            ("Last updated (unix)", view.state.updated_at.to_string()),
        ];
        if let (Some(total), Some(remaining)) = (view.total, view.remaining) {
            rows.push(("Input records", total.to_string()));
            rows.push(("Remaining", remaining.to_string()));
        }

        let mut builder = Builder::default();
        for (label, value) in rows {
            builder.push_record([label.to_string(), value]);
        }

        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Columns::single(1)).with(Alignment::right()));
        table.to_string()
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_domain::{RunStats, TaskId};
    use std::path::PathBuf;
    use std::time::Duration;

    fn state() -> CheckpointState {
        let mut state = CheckpointState::new();
        state.mark_completed(TaskId::from("1"), true);
        state.mark_completed(TaskId::from("2"), true);
        state.mark_completed(TaskId::from("3"), false);
        state
    }

    #[test]
    fn test_status_table() {
        let formatter = Formatter::new(CliFormat::Text, false);
        let state = state();
        let view = StatusView {
            path: Path::new("cp.json"),
            exists: true,
            state: &state,
            total: Some(10),
            remaining: Some(7),
        };
        let output = formatter.format_status(&view).unwrap();
        assert!(output.contains("Completed"));
        assert!(output.contains("66.7%"));
        assert!(output.contains("Remaining"));
    }

    #[test]
    fn test_status_json() {
        let formatter = Formatter::new(CliFormat::Json, false);
        let state = state();
        let view = StatusView {
            path: Path::new("cp.json"),
            exists: true,
            state: &state,
            total: None,
            remaining: None,
        };
        let output = formatter.format_status(&view).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["completed"], 3);
        assert_eq!(value["stats"]["failure_count"], 1);
        assert!(value["remaining"].is_null());
    }

    #[test]
    fn test_missing_checkpoint_status() {
        let formatter = Formatter::new(CliFormat::Text, false);
        let state = CheckpointState::new();
        let view = StatusView {
            path: Path::new("none.json"),
            exists: false,
            state: &state,
            total: None,
            remaining: None,
        };
        assert_eq!(
            formatter.format_status(&view).unwrap(),
            "⚠ No checkpoint at none.json"
        );
    }

    #[test]
    fn test_report_json() {
        let formatter = Formatter::new(CliFormat::Json, false);
        let report = RunReport {
            dispatched: 3,
            succeeded: 2,
            failed: 1,
            abandoned: 0,
            pending: 0,
            previously_completed: 0,
            totals: RunStats {
                processed_count: 3,
                success_count: 2,
                failure_count: 1,
            },
            elapsed: Duration::from_secs(1),
            interrupted: false,
            output: PathBuf::from("out.jsonl"),
            error_log: PathBuf::from("errors.jsonl"),
        };
        let value: serde_json::Value =
            serde_json::from_str(&formatter.format_report(&report).unwrap()).unwrap();
        assert_eq!(value["succeeded"], 2);
        assert_eq!(value["complete"], true);
        assert_eq!(value["output"], "out.jsonl");
    }

    #[test]
    fn test_colorize_disabled() {
        let formatter = Formatter::new(CliFormat::Text, false);
        assert_eq!(formatter.success("test"), "✓ test");
    }
}
