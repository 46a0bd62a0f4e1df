//! Acceptance validation: run a task's commands and collect evidence.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::core::types::{ValidationMode, ValidationReport};
use crate::io::acceptance::{AcceptanceRunner, CheckRequest};
use crate::tree::Node;

pub struct Validator<'a> {
    pub runner: &'a dyn AcceptanceRunner,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Validator<'_> {
    /// Run `task.acceptance` inside `workdir`.
    #[instrument(skip_all, fields(task = %task.name, ?mode))]
    pub fn validate(&self, task: &Node, workdir: &Path, mode: ValidationMode) -> ValidationReport {
        let report = self.run_commands(&task.acceptance, workdir, mode);
        info!(
            success = report.success,
            executed = report.results.len(),
            defined = task.acceptance.len(),
            "validation finished"
        );
        report
    }

    /// Run `commands` in order. In fail-fast mode commands after the first
    /// failure are not run and do not appear in the report.
    pub fn run_commands(
        &self,
        commands: &[String],
        workdir: &Path,
        mode: ValidationMode,
    ) -> ValidationReport {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let result = self.runner.run_check(&CheckRequest {
                command,
                workdir,
                timeout: self.timeout,
                output_limit_bytes: self.output_limit_bytes,
            });
            debug!(command = %command, return_code = result.return_code, "acceptance result");
            let failed = !result.success;
            results.push(result);
            if failed && mode == ValidationMode::FailFast {
                break;
            }
        }
        ValidationReport::from_results(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::acceptance::ShellRunner;
    use crate::test_support::pending;

    fn task_with(commands: &[&str]) -> Node {
        let mut task = pending("Checks");
        task.acceptance = commands.iter().map(|c| c.to_string()).collect();
        task
    }

    fn validator(runner: &ShellRunner) -> Validator<'_> {
        Validator {
            runner,
            timeout: Duration::from_secs(10),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn no_commands_pass_with_empty_report() {
        let temp = tempfile::tempdir().expect("tempdir");
        let shell = ShellRunner::new(vec!["sh".into(), "-c".into()]);
        let report = validator(&shell).validate(&task_with(&[]), temp.path(), ValidationMode::FailFast);
        assert!(report.success);
        assert!(report.results.is_empty());
    }

    #[test]
    fn fail_fast_omits_later_commands() {
        let temp = tempfile::tempdir().expect("tempdir");
        let shell = ShellRunner::new(vec!["sh".into(), "-c".into()]);
        let task = task_with(&["true", "echo nope; exit 1", "true"]);

        let fast = validator(&shell).validate(&task, temp.path(), ValidationMode::FailFast);
        assert!(!fast.success);
        assert_eq!(fast.results.len(), 2);

        let all = validator(&shell).validate(&task, temp.path(), ValidationMode::CollectAll);
        assert!(!all.success);
        assert_eq!(all.results.len(), 3);
        assert!(all.results[2].success);
        assert_eq!(all.failures().count(), 1);
    }

    #[test]
    fn repeated_validation_is_identical() {
        let temp = tempfile::tempdir().expect("tempdir");
        let shell = ShellRunner::new(vec!["sh".into(), "-c".into()]);
        let task = task_with(&["echo out", "echo err >&2; exit 4"]);
        let first = validator(&shell).validate(&task, temp.path(), ValidationMode::CollectAll);
        let second = validator(&shell).validate(&task, temp.path(), ValidationMode::CollectAll);
        assert_eq!(first, second);
    }
}
