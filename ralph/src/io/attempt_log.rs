//! Attempt artifacts under `.ralph/runs/<branch>/<attempt>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::ValidationReport;

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub prompt_path: PathBuf,
    pub agent_log_path: PathBuf,
    pub validation_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(runs_dir: &Path, branch: &str, attempt: u32) -> Self {
        let dir = runs_dir
            .join(branch.replace('/', "-"))
            .join(attempt.to_string());
        Self {
            prompt_path: dir.join("prompt.md"),
            agent_log_path: dir.join("agent.log"),
            validation_path: dir.join("validation.json"),
            dir,
        }
    }

    pub fn write_prompt(&self, prompt: &str) -> Result<()> {
        write_text(&self.prompt_path, prompt)
    }

    pub fn write_agent_log(&self, stdout: &str, stderr: &str) -> Result<()> {
        let log = format!("=== stdout ===\n{stdout}\n=== stderr ===\n{stderr}\n");
        write_text(&self.agent_log_path, &log)
    }

    pub fn write_validation(&self, report: &ValidationReport) -> Result<()> {
        write_json(&self.validation_path, report)
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create attempt dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CommandResult;

    #[test]
    fn attempt_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AttemptPaths::new(temp.path(), "ralph/login-form", 2);

        assert!(paths.dir.ends_with(Path::new("ralph-login-form/2")));
        assert!(paths.prompt_path.ends_with("prompt.md"));
        assert!(paths.agent_log_path.ends_with("agent.log"));
        assert!(paths.validation_path.ends_with("validation.json"));
    }

    #[test]
    fn writes_attempt_artifacts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AttemptPaths::new(temp.path(), "ralph/docs", 0);
        let report = ValidationReport::from_results(vec![CommandResult::from_exit(
            "cargo test",
            101,
            String::new(),
            "1 failed".to_string(),
        )]);

        paths.write_prompt("# Task").expect("prompt");
        paths.write_agent_log("did things", "").expect("log");
        paths.write_validation(&report).expect("validation");

        assert_eq!(
            fs::read_to_string(&paths.prompt_path).expect("read"),
            "# Task"
        );
        let log = fs::read_to_string(&paths.agent_log_path).expect("read");
        assert!(log.starts_with("=== stdout ===\ndid things\n"));
        let raw = fs::read_to_string(&paths.validation_path).expect("read");
        let parsed: ValidationReport = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed, report);
    }
}
