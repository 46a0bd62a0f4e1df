//! Shared deterministic types for validation evidence.
//!
//! Reports carry no timing data: validating an unchanged tree twice must
//! produce identical reports.

use serde::{Deserialize, Serialize};

/// How acceptance commands are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMode {
    /// Stop at the first failing command; later commands are absent from the report.
    #[default]
    FailFast,
    /// Run every command regardless of earlier failures.
    CollectAll,
}

/// Outcome of a single acceptance command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; `-1` when the command timed out or could not start.
    pub return_code: i32,
    pub success: bool,
}

impl CommandResult {
    pub fn from_exit(command: &str, return_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            command: command.to_string(),
            stdout,
            stderr,
            return_code,
            success: return_code == 0,
        }
    }

    /// Result for a command that never produced an exit code.
    pub fn aborted(command: &str, reason: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            stdout: String::new(),
            stderr: reason.into(),
            return_code: -1,
            success: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub results: Vec<CommandResult>,
    pub success: bool,
}

impl ValidationReport {
    pub fn from_results(results: Vec<CommandResult>) -> Self {
        let success = results.iter().all(|result| result.success);
        Self { results, success }
    }

    pub fn failures(&self) -> impl Iterator<Item = &CommandResult> {
        self.results.iter().filter(|result| !result.success)
    }

    /// Failing commands rendered for a fix prompt or an error message.
    pub fn failure_summary(&self) -> String {
        let mut lines = Vec::new();
        for result in self.failures() {
            lines.push(format!("COMMAND FAILED: {}", result.command));
            lines.push(format!("EXIT CODE: {}", result.return_code));
            if !result.stdout.trim().is_empty() {
                lines.push(format!("STDOUT:\n{}", result.stdout.trim_end()));
            }
            if !result.stderr.trim().is_empty() {
                lines.push(format!("STDERR:\n{}", result.stderr.trim_end()));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_success() {
        let report = ValidationReport::from_results(Vec::new());
        assert!(report.success);
        assert_eq!(report.failure_summary(), "");
    }

    #[test]
    fn summary_lists_only_failures_with_output() {
        let report = ValidationReport::from_results(vec![
            CommandResult::from_exit("cargo fmt --check", 0, String::new(), String::new()),
            CommandResult::from_exit(
                "cargo test",
                101,
                "test foo ... FAILED\n".to_string(),
                String::new(),
            ),
            CommandResult::aborted("slow check", "timed out after 5s"),
        ]);
        assert!(!report.success);
        let summary = report.failure_summary();
        assert!(!summary.contains("cargo fmt"));
        assert!(summary.contains("COMMAND FAILED: cargo test\nEXIT CODE: 101\nSTDOUT:\ntest foo ... FAILED"));
        assert!(summary.contains("COMMAND FAILED: slow check\nEXIT CODE: -1\nSTDERR:\ntimed out after 5s"));
    }
}
