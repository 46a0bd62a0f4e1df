//! Git adapter for ralph commands.
//!
//! Branch isolation, merges and rollbacks all go through the `git` CLI, so we
//! keep a small, explicit wrapper around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Result of `git merge` attempted by [`Git::merge_no_ff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAttempt {
    Merged,
    /// The merge stopped; it has already been aborted.
    Stopped { files: Vec<String>, output: String },
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Resolve a revision to its full SHA.
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--verify", rev])?;
        Ok(out.trim().to_string())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Ensure the worktree is clean, allowing entries with any of the given prefixes.
    #[instrument(skip_all)]
    pub fn ensure_clean_except_prefixes(&self, allowed_prefixes: &[&str]) -> Result<()> {
        let entries = self.status_porcelain()?;
        let mut disallowed = Vec::new();
        for entry in entries {
            if allowed_prefixes
                .iter()
                .any(|prefix| entry.path.starts_with(prefix))
            {
                continue;
            }
            disallowed.push(entry);
        }
        if disallowed.is_empty() {
            debug!("worktree is clean");
            return Ok(());
        }
        warn!(disallowed_count = disallowed.len(), "worktree not clean");
        let mut msg = String::new();
        msg.push_str("working tree not clean (disallowed changes):\n");
        for entry in disallowed {
            msg.push_str(&format!("{} {}\n", entry.code, entry.path));
        }
        Err(anyhow!(msg.trim_end().to_string()))
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch = %branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Add a linked worktree at `path`, creating `branch` from `base` if needed.
    #[instrument(skip_all, fields(branch = %branch, base = %base))]
    pub fn worktree_add(&self, path: &Path, branch: &str, base: &str) -> Result<()> {
        let path_arg = path.to_string_lossy();
        if self.branch_exists(branch)? {
            debug!(branch, "attaching worktree to existing branch");
            self.run_checked(&["worktree", "add", &path_arg, branch])?;
        } else {
            debug!(branch, base, "creating branch in new worktree");
            self.run_checked(&["worktree", "add", "-b", branch, &path_arg, base])?;
        }
        Ok(())
    }

    /// Remove a linked worktree (discarding its uncommitted changes) and prune stale entries.
    #[instrument(skip_all)]
    pub fn worktree_remove(&self, path: &Path) -> Result<()> {
        let path_arg = path.to_string_lossy();
        self.run_checked(&["worktree", "remove", "--force", &path_arg])?;
        self.run_checked(&["worktree", "prune"])?;
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Merge `branch` into the current branch with a merge commit.
    ///
    /// A merge that stops (conflicts, overwritten untracked files) is aborted
    /// before returning, leaving the current branch where it was.
    #[instrument(skip_all, fields(branch = %branch))]
    pub fn merge_no_ff(&self, branch: &str, message: &str) -> Result<MergeAttempt> {
        let output = self.run(&["merge", "--no-ff", "--no-edit", "-m", message, branch])?;
        if output.status.success() {
            debug!(branch, "merged");
            return Ok(MergeAttempt::Merged);
        }
        let files = self.conflicted_files()?;
        let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr.trim());
        }
        warn!(branch, conflicted = files.len(), "merge stopped, aborting");
        if let Err(err) = self.run_checked(&["merge", "--abort"]) {
            // Nothing to abort when git refused to start the merge.
            debug!(err = %err, "merge --abort failed");
        }
        Ok(MergeAttempt::Stopped {
            files,
            output: text,
        })
    }

    /// Paths with unresolved conflicts in the index.
    pub fn conflicted_files(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Move the current branch back to `rev`, keeping unrelated local changes.
    #[instrument(skip_all, fields(rev = %rev))]
    pub fn reset_merge(&self, rev: &str) -> Result<()> {
        debug!(rev, "resetting to pre-merge revision");
        self.run_checked(&["reset", "--merge", rev])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
