//! Acceptance command runner adapter.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::types::CommandResult;
use crate::io::process::run_command;

#[derive(Debug, Clone)]
pub struct CheckRequest<'a> {
    pub command: &'a str,
    pub workdir: &'a Path,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Runs one acceptance command. Never fails: problems running the command
/// are reported as a failed [`CommandResult`].
pub trait AcceptanceRunner: Sync {
    fn run_check(&self, request: &CheckRequest<'_>) -> CommandResult;
}

/// Runs each command through a shell (`sh -c` by default).
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: Vec<String>,
}

impl ShellRunner {
    pub fn new(shell: Vec<String>) -> Self {
        Self { shell }
    }
}

impl AcceptanceRunner for ShellRunner {
    fn run_check(&self, request: &CheckRequest<'_>) -> CommandResult {
        let Some((program, args)) = self.shell.split_first() else {
            return CommandResult::aborted(request.command, "validation shell is empty");
        };
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(request.command)
            .current_dir(request.workdir);

        debug!(command = request.command, "running acceptance command");
        let output = match run_command(
            cmd,
            None,
            request.timeout,
            request.output_limit_bytes,
            None,
        ) {
            Ok(output) => output,
            Err(err) => {
                warn!(command = request.command, err = %err, "acceptance command did not start");
                return CommandResult::aborted(request.command, format!("{err:#}"));
            }
        };

        if output.timed_out {
            let mut result = CommandResult::aborted(
                request.command,
                format!("timed out after {}s", request.timeout.as_secs()),
            );
            result.stdout = output.stdout_text();
            return result;
        }
        CommandResult::from_exit(
            request.command,
            output.exit_code().unwrap_or(-1),
            output.stdout_text(),
            output.stderr_text(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check<'a>(command: &'a str, workdir: &'a Path, timeout: Duration) -> CheckRequest<'a> {
        CheckRequest {
            command,
            workdir,
            timeout,
            output_limit_bytes: 10_000,
        }
    }

    fn shell() -> ShellRunner {
        ShellRunner::new(vec!["sh".to_string(), "-c".to_string()])
    }

    #[test]
    fn passing_and_failing_commands() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ok = shell().run_check(&check("echo fine", temp.path(), Duration::from_secs(10)));
        assert!(ok.success);
        assert_eq!(ok.return_code, 0);
        assert_eq!(ok.stdout, "fine\n");

        let bad = shell().run_check(&check(
            "echo broken >&2; exit 2",
            temp.path(),
            Duration::from_secs(10),
        ));
        assert!(!bad.success);
        assert_eq!(bad.return_code, 2);
        assert_eq!(bad.stderr, "broken\n");
    }

    #[test]
    fn runs_in_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker"), "x").expect("write");
        let result = shell().run_check(&check("test -f marker", temp.path(), Duration::from_secs(10)));
        assert!(result.success);
    }

    #[test]
    fn timeout_reports_minus_one() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = shell().run_check(&check("sleep 5", temp.path(), Duration::from_millis(200)));
        assert!(!result.success);
        assert_eq!(result.return_code, -1);
        assert!(result.stderr.contains("timed out"));
    }

    #[test]
    fn unusable_shell_reports_minus_one() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = ShellRunner::new(vec!["no-such-shell-for-ralph".to_string()]);
        let result = runner.run_check(&check("true", temp.path(), Duration::from_secs(1)));
        assert_eq!(result.return_code, -1);
        assert!(!result.success);
    }
}
