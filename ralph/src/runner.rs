//! Subagent runner: one agent invocation bound to an isolated branch.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::io::agent::{AgentInvoker, AgentRequest};
use crate::io::attempt_log::AttemptPaths;
use crate::io::vcs::Vcs;
use crate::tree::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    /// Non-zero exit, or `None` when the agent never produced an exit code.
    Failure(Option<i32>),
    Timeout,
    Cancelled,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Success => f.write_str("success"),
            RunOutcome::Failure(Some(code)) => write!(f, "agent exited with code {code}"),
            RunOutcome::Failure(None) => f.write_str("agent failed to run"),
            RunOutcome::Timeout => f.write_str("agent timed out"),
            RunOutcome::Cancelled => f.write_str("agent cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    fn failed_to_start(detail: String) -> Self {
        Self {
            outcome: RunOutcome::Failure(None),
            stdout: String::new(),
            stderr: detail,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    /// Raw failure text used to seed the next fix prompt.
    pub fn failure_detail(&self) -> String {
        let mut lines = vec![format!("RUNNER FAILURE: {}", self.outcome)];
        if !self.stdout.trim().is_empty() {
            lines.push(format!("STDOUT:\n{}", self.stdout.trim_end()));
        }
        if !self.stderr.trim().is_empty() {
            lines.push(format!("STDERR:\n{}", self.stderr.trim_end()));
        }
        lines.join("\n")
    }
}

pub struct SubagentRunner<'a> {
    pub agent: &'a dyn AgentInvoker,
    pub vcs: &'a dyn Vcs,
    /// Integration base new branches start from.
    pub base: String,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub cancel: &'a AtomicBool,
}

impl SubagentRunner<'_> {
    /// Prepare the branch checkout and run the agent in it.
    ///
    /// Never returns an error: workspace and spawn problems become
    /// `Failure(None)` so the healing loop can count them as an attempt.
    #[instrument(skip_all, fields(task = %task.name, branch = %branch))]
    pub fn run(&self, task: &Node, branch: &str, prompt: &str, log: &AttemptPaths) -> RunResult {
        let result = self.run_inner(branch, prompt);
        if let Err(err) = log.write_agent_log(&result.stdout, &result.stderr) {
            warn!(err = %format!("{err:#}"), "failed to write agent log");
        }
        info!(outcome = %result.outcome, "agent run finished");
        result
    }

    fn run_inner(&self, branch: &str, prompt: &str) -> RunResult {
        let workdir = match self.vcs.create_branch(branch, &self.base) {
            Ok(dir) => dir,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "could not prepare branch checkout");
                return RunResult::failed_to_start(format!("prepare branch {branch}: {err:#}"));
            }
        };
        let request = AgentRequest {
            workdir,
            prompt: prompt.to_string(),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        };
        let output = match self.agent.invoke(&request, self.cancel) {
            Ok(output) => output,
            Err(err) => return RunResult::failed_to_start(format!("{err:#}")),
        };
        let outcome = if output.cancelled {
            RunOutcome::Cancelled
        } else if output.timed_out {
            RunOutcome::Timeout
        } else if output.exit_code == Some(0) {
            RunOutcome::Success
        } else {
            RunOutcome::Failure(output.exit_code)
        };
        RunResult {
            outcome,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeVcs, ScriptedAgent, pending};

    fn runner<'a>(
        agent: &'a ScriptedAgent,
        vcs: &'a FakeVcs,
        cancel: &'a AtomicBool,
    ) -> SubagentRunner<'a> {
        SubagentRunner {
            agent,
            vcs,
            base: "main".to_string(),
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
            cancel,
        }
    }

    #[test]
    fn maps_agent_exit_to_outcome_and_logs_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::new(temp.path());
        let agent = ScriptedAgent::exits(&[0, 2]);
        let cancel = AtomicBool::new(false);
        let log = AttemptPaths::new(temp.path(), "ralph/docs", 0);

        let first = runner(&agent, &vcs, &cancel).run(&pending("Docs"), "ralph/docs", "p", &log);
        assert_eq!(first.outcome, RunOutcome::Success);
        assert!(log.agent_log_path.is_file());

        let second = runner(&agent, &vcs, &cancel).run(&pending("Docs"), "ralph/docs", "p", &log);
        assert_eq!(second.outcome, RunOutcome::Failure(Some(2)));
        assert!(second.failure_detail().contains("exited with code 2"));
        assert_eq!(vcs.created_branches(), vec!["ralph/docs", "ralph/docs"]);
    }

    #[test]
    fn workspace_error_is_a_failure_without_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::new(temp.path()).failing_workspaces();
        let agent = ScriptedAgent::exits(&[0]);
        let cancel = AtomicBool::new(false);
        let log = AttemptPaths::new(temp.path(), "ralph/docs", 0);

        let result = runner(&agent, &vcs, &cancel).run(&pending("Docs"), "ralph/docs", "p", &log);
        assert_eq!(result.outcome, RunOutcome::Failure(None));
        assert_eq!(agent.calls(), 0);
    }
}
