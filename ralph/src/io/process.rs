//! Helpers for running child processes with timeouts, cancellation and bounded output.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How often a running child is checked for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CommandOutput {
    /// Exit code, or `None` if the process was killed by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn stdout_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            text.push_str(&format!("\n[stdout truncated {} bytes]\n", self.stdout_truncated));
        }
        text
    }

    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!("\n[stderr truncated {} bytes]\n", self.stderr_truncated));
        }
        text
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// When `cancel` is raised the child is killed and the output is marked `cancelled`.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: Option<&AtomicBool>,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    // Fed from its own thread so a child that never reads cannot stall the deadline.
    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || child_stdin.write_all(&input)))
        }
        None => None,
    };

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let mut cancelled = false;
    let status = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if let Some(status) = child
            .wait_timeout(remaining.min(POLL_INTERVAL))
            .context("wait for command")?
        {
            break status;
        }
        if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            warn!("command cancelled, killing");
            cancelled = true;
        } else if Instant::now() >= deadline {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
        } else {
            continue;
        }
        child.kill().context("kill command")?;
        break child.wait().context("wait command after kill")?;
    };

    if let Some(handle) = stdin_handle {
        match handle.join() {
            Ok(Ok(())) => {}
            // A child that exits (or is killed) without reading its input is not an error here.
            Ok(Err(e)) => warn!(err = %e, "child closed stdin early"),
            Err(_) => warn!("stdin writer thread panicked"),
        }
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, cancelled, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        cancelled,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let out = run_command(
            sh("echo out; echo err >&2; exit 3"),
            None,
            Duration::from_secs(10),
            1_000,
            None,
        )
        .expect("run");
        assert_eq!(out.exit_code(), Some(3));
        assert_eq!(out.stdout_text(), "out\n");
        assert_eq!(out.stderr_text(), "err\n");
        assert!(!out.timed_out);
    }

    #[test]
    fn feeds_stdin() {
        let out = run_command(
            Command::new("cat"),
            Some(b"prompt text"),
            Duration::from_secs(10),
            1_000,
            None,
        )
        .expect("run");
        assert_eq!(out.stdout, b"prompt text");
    }

    #[test]
    fn kills_on_timeout() {
        let out = run_command(sh("sleep 5"), None, Duration::from_millis(200), 1_000, None)
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.status.success());
    }

    #[test]
    fn timeout_holds_when_child_never_reads_stdin() {
        let input = vec![b'x'; 512 * 1024];
        let mut cmd = Command::new("sleep");
        cmd.arg("8");
        let started = Instant::now();
        let out = run_command(cmd, Some(&input), Duration::from_millis(300), 1_000, None)
            .expect("run");
        assert!(out.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn cancel_holds_when_child_never_reads_stdin() {
        let input = vec![b'x'; 512 * 1024];
        let cancel = AtomicBool::new(true);
        let mut cmd = Command::new("sleep");
        cmd.arg("8");
        let started = Instant::now();
        let out = run_command(cmd, Some(&input), Duration::from_secs(30), 1_000, Some(&cancel))
            .expect("run");
        assert!(out.cancelled);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn kills_when_cancelled() {
        let cancel = AtomicBool::new(true);
        let out = run_command(
            sh("sleep 5"),
            None,
            Duration::from_secs(30),
            1_000,
            Some(&cancel),
        )
        .expect("run");
        assert!(out.cancelled);
        assert!(!out.timed_out);
    }

    #[test]
    fn truncates_beyond_limit() {
        let out = run_command(
            sh("printf '0123456789'"),
            None,
            Duration::from_secs(10),
            4,
            None,
        )
        .expect("run");
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_truncated, 6);
        assert!(out.stdout_text().contains("[stdout truncated 6 bytes]"));
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let err = run_command(
            Command::new("definitely-not-a-real-binary-ralph"),
            None,
            Duration::from_secs(1),
            100,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
