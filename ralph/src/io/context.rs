//! Optional context enrichment for task prompts.
//!
//! Each [`ContextSource`] contributes zero or more text blocks. Enrichment is
//! best effort: a failing source is logged and contributes nothing.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tracing::{debug, warn};

use crate::core::path::TaskPath;
use crate::io::process::run_command;
use crate::tree::Node;

const SOURCE_OUTPUT_LIMIT: usize = 64 * 1024;

pub trait ContextSource: Sync {
    fn name(&self) -> &str;

    fn blocks(&self, path: &TaskPath, task: &Node) -> Result<Vec<String>>;
}

/// Collect blocks from every source, skipping sources that fail.
pub fn gather(sources: &[Box<dyn ContextSource>], path: &TaskPath, task: &Node) -> Vec<String> {
    let mut out = Vec::new();
    for source in sources {
        match source.blocks(path, task) {
            Ok(blocks) => {
                debug!(source = source.name(), blocks = blocks.len(), "context gathered");
                out.extend(blocks.into_iter().filter(|b| !b.trim().is_empty()));
            }
            Err(err) => {
                warn!(source = source.name(), err = %format!("{err:#}"), "context source failed; skipping");
            }
        }
    }
    out
}

/// Project requirements document (`.ralph/requirements.md`), if present.
#[derive(Debug, Clone)]
pub struct RequirementsFile {
    path: PathBuf,
}

impl RequirementsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ContextSource for RequirementsFile {
    fn name(&self) -> &str {
        "requirements"
    }

    fn blocks(&self, _path: &TaskPath, _task: &Node) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("read requirements {}", self.path.display()))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![format!("## Project Requirements\n\n{}", text.trim())])
    }
}

/// External command fed the task as JSON on stdin; its stdout is one block.
#[derive(Debug, Clone)]
pub struct CommandSource {
    command: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
}

impl CommandSource {
    pub fn new(command: Vec<String>, workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command,
            workdir: workdir.into(),
            timeout,
        }
    }
}

impl ContextSource for CommandSource {
    fn name(&self) -> &str {
        "command"
    }

    fn blocks(&self, path: &TaskPath, task: &Node) -> Result<Vec<String>> {
        let Some((program, args)) = self.command.split_first() else {
            return Ok(Vec::new());
        };
        let input = serde_json::to_vec(&json!({
            "path": path.to_string(),
            "task": task,
        }))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        let output = run_command(cmd, Some(&input), self.timeout, SOURCE_OUTPUT_LIMIT, None)
            .with_context(|| format!("run context command {program}"))?;
        if output.timed_out {
            bail!("context command timed out after {}s", self.timeout.as_secs());
        }
        if !output.status.success() {
            bail!(
                "context command exited with {:?}: {}",
                output.exit_code(),
                output.stderr_text().trim()
            );
        }
        let text = output.stdout_text();
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![text.trim().to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::pending;

    struct Broken;

    impl ContextSource for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn blocks(&self, _path: &TaskPath, _task: &Node) -> Result<Vec<String>> {
            bail!("index unavailable")
        }
    }

    fn task_path() -> TaskPath {
        "Project/Docs".parse().expect("path")
    }

    #[test]
    fn requirements_file_is_optional() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = RequirementsFile::new(temp.path().join("requirements.md"));
        assert!(source.blocks(&task_path(), &pending("Docs")).expect("blocks").is_empty());

        fs::write(temp.path().join("requirements.md"), "Must use tokio.\n").expect("write");
        let blocks = source.blocks(&task_path(), &pending("Docs")).expect("blocks");
        assert_eq!(blocks, vec!["## Project Requirements\n\nMust use tokio."]);
    }

    #[test]
    fn command_source_reads_task_json_from_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = CommandSource::new(
            vec!["sh".into(), "-c".into(), "grep -o '\"path\":\"[^\"]*\"'".into()],
            temp.path(),
            Duration::from_secs(10),
        );
        let blocks = source.blocks(&task_path(), &pending("Docs")).expect("blocks");
        assert_eq!(blocks, vec!["\"path\":\"Project/Docs\""]);
    }

    #[test]
    fn stalled_command_source_times_out_with_large_task() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = CommandSource::new(
            vec!["sleep".into(), "8".into()],
            temp.path(),
            Duration::from_millis(300),
        );
        let mut task = pending("Docs");
        task.spec = Some("x".repeat(512 * 1024));
        let sources: Vec<Box<dyn ContextSource>> = vec![Box::new(source)];

        let started = std::time::Instant::now();
        assert!(gather(&sources, &task_path(), &task).is_empty());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn gather_skips_failing_sources() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("requirements.md"), "No unsafe.").expect("write");
        let sources: Vec<Box<dyn ContextSource>> = vec![
            Box::new(Broken),
            Box::new(RequirementsFile::new(temp.path().join("requirements.md"))),
            Box::new(CommandSource::new(
                vec!["sh".into(), "-c".into(), "exit 3".into()],
                temp.path(),
                Duration::from_secs(10),
            )),
        ];
        let blocks = gather(&sources, &task_path(), &pending("Docs"));
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].contains("No unsafe."));
    }
}
