//! Agent invocation collaborator.
//!
//! The [`AgentInvoker`] trait decouples orchestration from the actual agent
//! backend (by default `claude -p`, prompt on stdin). Tests substitute
//! scripted invokers that never spawn a process.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command;

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Checkout the agent works in.
    pub workdir: PathBuf,
    /// Prompt text fed to the agent.
    pub prompt: String,
    /// Maximum time to wait for the agent to finish.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// What the agent process did. Correctness is judged by validation, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOutput {
    /// `None` if the process was killed.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl AgentOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }
}

/// Abstraction over agent backends.
pub trait AgentInvoker: Sync {
    /// Run the agent to completion (or timeout/cancellation).
    ///
    /// An `Err` means the agent could not be started at all.
    fn invoke(&self, request: &AgentRequest, cancel: &AtomicBool) -> Result<AgentOutput>;
}

/// Agent backed by an external command reading the prompt from stdin.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    command: Vec<String>,
}

impl CommandAgent {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl AgentInvoker for CommandAgent {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn invoke(&self, request: &AgentRequest, cancel: &AtomicBool) -> Result<AgentOutput> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        info!(program = %program, workdir = %request.workdir.display(), "starting agent");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&request.workdir);

        let output = run_command(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
            Some(cancel),
        )
        .with_context(|| format!("run agent {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
        } else if !output.status.success() && !output.cancelled {
            warn!(exit_code = ?output.exit_code(), "agent exited with failure");
        } else {
            debug!("agent finished");
        }

        Ok(AgentOutput {
            exit_code: output.exit_code(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            timed_out: output.timed_out,
            cancelled: output.cancelled,
        })
    }
}
