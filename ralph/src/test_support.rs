//! Test-only helpers: tree builders, scripted collaborators, throwaway repos.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result, anyhow, bail};

use crate::core::types::CommandResult;
use crate::io::acceptance::{AcceptanceRunner, CheckRequest};
use crate::io::agent::{AgentInvoker, AgentOutput, AgentRequest};
use crate::io::vcs::{ConflictInfo, MergeOutcome, Vcs};
use crate::tree::{Node, Status};

/// Task with an explicit status.
pub fn task(name: &str, status: Status) -> Node {
    Node {
        name: name.to_string(),
        status: Some(status),
        ..Node::default()
    }
}

pub fn pending(name: &str) -> Node {
    task(name, Status::Pending)
}

/// Branch node (no status; derived from children).
pub fn branch(name: &str, children: Vec<Node>) -> Node {
    Node {
        name: name.to_string(),
        children,
        ..Node::default()
    }
}

pub fn slice(name: &str, dependencies: &[&str], children: Vec<Node>) -> Node {
    Node {
        slice: true,
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        ..branch(name, children)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Agent returning scripted exit codes in order (0 once the script runs out).
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    exits: Vec<i32>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn exits(exits: &[i32]) -> Self {
        Self {
            exits: exits.to_vec(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

impl AgentInvoker for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest, _cancel: &AtomicBool) -> Result<AgentOutput> {
        let mut prompts = lock(&self.prompts);
        let code = self.exits.get(prompts.len()).copied().unwrap_or(0);
        prompts.push(request.prompt.clone());
        Ok(AgentOutput {
            exit_code: Some(code),
            stdout: format!("scripted run {}", prompts.len()),
            stderr: String::new(),
            timed_out: false,
            cancelled: false,
        })
    }
}

/// Agent backed by a closure, for agents that edit the checkout.
pub struct FnAgent<F> {
    run: F,
}

impl<F> FnAgent<F>
where
    F: Fn(&AgentRequest) -> Result<AgentOutput> + Sync,
{
    pub fn new(run: F) -> Self {
        Self { run }
    }
}

impl<F> AgentInvoker for FnAgent<F>
where
    F: Fn(&AgentRequest) -> Result<AgentOutput> + Sync,
{
    fn invoke(&self, request: &AgentRequest, _cancel: &AtomicBool) -> Result<AgentOutput> {
        (self.run)(request)
    }
}

/// Successful agent output with no captured text.
pub fn agent_ok() -> AgentOutput {
    AgentOutput {
        exit_code: Some(0),
        ..AgentOutput::default()
    }
}

/// Acceptance runner where selected commands fail a fixed number of times.
#[derive(Debug, Default)]
pub struct ScriptedAcceptance {
    remaining_failures: Mutex<HashMap<String, u32>>,
    log: Mutex<Vec<(String, PathBuf)>>,
}

impl ScriptedAcceptance {
    pub fn passing() -> Self {
        Self::default()
    }

    /// `command` fails its first `times` runs.
    pub fn failing(command: &str, times: u32) -> Self {
        let runner = Self::default();
        lock(&runner.remaining_failures).insert(command.to_string(), times);
        runner
    }

    pub fn calls(&self) -> usize {
        lock(&self.log).len()
    }

    /// Commands run so far with their working directories.
    pub fn runs(&self) -> Vec<(String, PathBuf)> {
        lock(&self.log).clone()
    }
}

impl AcceptanceRunner for ScriptedAcceptance {
    fn run_check(&self, request: &CheckRequest<'_>) -> CommandResult {
        lock(&self.log).push((request.command.to_string(), request.workdir.to_path_buf()));
        let mut remaining = lock(&self.remaining_failures);
        match remaining.get_mut(request.command) {
            Some(left) if *left > 0 => {
                *left -= 1;
                CommandResult::from_exit(
                    request.command,
                    1,
                    String::new(),
                    format!("{} failed", request.command),
                )
            }
            _ => CommandResult::from_exit(request.command, 0, String::new(), String::new()),
        }
    }
}

/// In-memory [`Vcs`] recording calls; workspaces are plain directories.
#[derive(Debug)]
pub struct FakeVcs {
    root: PathBuf,
    fail_workspaces: bool,
    conflicts: Vec<String>,
    broken: Vec<String>,
    created: Mutex<Vec<String>>,
    commits: Mutex<Vec<String>>,
    merges: Mutex<Vec<String>>,
    resets: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            fail_workspaces: false,
            conflicts: Vec::new(),
            broken: Vec::new(),
            created: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            merges: Mutex::new(Vec::new()),
            resets: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_workspaces(mut self) -> Self {
        self.fail_workspaces = true;
        self
    }

    /// Merges of these branches report a conflict.
    pub fn conflicting(mut self, branches: &[&str]) -> Self {
        self.conflicts = branches.iter().map(|b| b.to_string()).collect();
        self
    }

    /// Merges of these branches fail outright, as a dirty checkout would.
    pub fn broken_merges(mut self, branches: &[&str]) -> Self {
        self.broken = branches.iter().map(|b| b.to_string()).collect();
        self
    }

    pub fn created_branches(&self) -> Vec<String> {
        lock(&self.created).clone()
    }

    pub fn commits(&self) -> Vec<String> {
        lock(&self.commits).clone()
    }

    pub fn merges(&self) -> Vec<String> {
        lock(&self.merges).clone()
    }

    pub fn resets(&self) -> Vec<String> {
        lock(&self.resets).clone()
    }
}

impl Vcs for FakeVcs {
    fn current_branch(&self) -> Result<String> {
        Ok("main".to_string())
    }

    fn branch_exists(&self, branch: &str) -> Result<bool> {
        Ok(lock(&self.created).iter().any(|b| b == branch))
    }

    fn workspace_path(&self, branch: &str) -> PathBuf {
        self.root.join("worktrees").join(branch.replace('/', "-"))
    }

    fn create_branch(&self, branch: &str, _base: &str) -> Result<PathBuf> {
        if self.fail_workspaces {
            bail!("worktree add failed for {branch}");
        }
        let path = self.workspace_path(branch);
        fs::create_dir_all(&path)?;
        lock(&self.created).push(branch.to_string());
        Ok(path)
    }

    fn commit(&self, _workdir: &Path, message: &str) -> Result<bool> {
        lock(&self.commits).push(message.to_string());
        Ok(true)
    }

    fn head(&self, target: &str) -> Result<String> {
        Ok(format!("{target}@{}", lock(&self.merges).len()))
    }

    fn merge(&self, branch: &str, _target: &str) -> Result<MergeOutcome> {
        lock(&self.merges).push(branch.to_string());
        if self.broken.iter().any(|b| b == branch) {
            bail!("integration checkout must be clean before merging {branch}");
        }
        if self.conflicts.iter().any(|b| b == branch) {
            return Ok(MergeOutcome::Conflict(ConflictInfo {
                branch: branch.to_string(),
                files: vec!["README.md".to_string()],
                detail: "CONFLICT (content)".to_string(),
            }));
        }
        Ok(MergeOutcome::Merged)
    }

    fn reset_to(&self, rev: &str) -> Result<()> {
        lock(&self.resets).push(rev.to_string());
        Ok(())
    }

    fn remove_workspace(&self, branch: &str) -> Result<()> {
        let path = self.workspace_path(branch);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        Ok(())
    }
}

/// Throwaway git repository on `main` with one commit.
pub struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"])?;
        repo.git(&["config", "user.email", "ralph@example.com"])?;
        repo.git(&["config", "user.name", "Ralph Test"])?;
        repo.commit_file("README.md", "# test repo\n", "initial commit")?;
        Ok(repo)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Run git in the repo root and return stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        git_in(self.root(), args)
    }

    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) -> Result<()> {
        commit_file_in(self.root(), rel, contents, message)
    }

    /// Keep orchestrator scratch directories out of `git status`.
    pub fn ignore_ralph_dir(&self) -> Result<()> {
        let dir = self.root().join(".ralph");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(".gitignore"), "worktrees/\nruns/\n")?;
        Ok(())
    }
}

/// Run git in `dir` and return stdout.
pub fn git_in(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("run git {}", args.join(" ")))?;
    if !output.status.success() {
        return Err(anyhow!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Write `rel` under `dir` and commit it.
pub fn commit_file_in(dir: &Path, rel: &str, contents: &str, message: &str) -> Result<()> {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    git_in(dir, &["add", rel])?;
    git_in(dir, &["commit", "-q", "-m", message])?;
    Ok(())
}
