//! Version-control collaborator.
//!
//! The [`Vcs`] trait is the contract the orchestrator needs from version
//! control: isolated branches with their own checkout, commits, merges that
//! report conflicts instead of failing, and rollback. [`GitVcs`] implements it
//! with one `git worktree` per branch under `.ralph/worktrees/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::io::git::{Git, MergeAttempt};

/// Why a merge did not land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictInfo {
    pub branch: String,
    pub files: Vec<String>,
    pub detail: String,
}

impl ConflictInfo {
    pub fn describe(&self) -> String {
        if self.files.is_empty() {
            format!("merge of {} failed: {}", self.branch, self.detail)
        } else {
            format!(
                "merge conflict in {}: {}",
                self.branch,
                self.files.join(", ")
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Conflict(ConflictInfo),
}

pub trait Vcs: Sync {
    /// Branch checked out in the project root.
    fn current_branch(&self) -> Result<String>;

    fn branch_exists(&self, branch: &str) -> Result<bool>;

    /// Checkout directory used for `branch` (whether or not it exists yet).
    fn workspace_path(&self, branch: &str) -> PathBuf;

    /// Create `branch` off `base` with an isolated checkout, reusing an existing one.
    fn create_branch(&self, branch: &str, base: &str) -> Result<PathBuf>;

    /// Commit every change in `workdir`; `false` when there was nothing to commit.
    fn commit(&self, workdir: &Path, message: &str) -> Result<bool>;

    /// Current commit of `target` in the project root.
    fn head(&self, target: &str) -> Result<String>;

    /// Merge `branch` into `target` in the project root.
    fn merge(&self, branch: &str, target: &str) -> Result<MergeOutcome>;

    /// Roll the project root's current branch back to `rev`.
    fn reset_to(&self, rev: &str) -> Result<()>;

    /// Drop the isolated checkout of `branch`; the branch itself is kept.
    fn remove_workspace(&self, branch: &str) -> Result<()>;
}

/// Git-backed [`Vcs`] rooted at the project directory.
#[derive(Debug, Clone)]
pub struct GitVcs {
    git: Git,
    worktrees_dir: PathBuf,
}

impl GitVcs {
    pub fn new(root: impl Into<PathBuf>, worktrees_dir: impl Into<PathBuf>) -> Self {
        Self {
            git: Git::new(root),
            worktrees_dir: worktrees_dir.into(),
        }
    }
}

impl Vcs for GitVcs {
    fn current_branch(&self) -> Result<String> {
        self.git.current_branch()
    }

    fn branch_exists(&self, branch: &str) -> Result<bool> {
        self.git.branch_exists(branch)
    }

    fn workspace_path(&self, branch: &str) -> PathBuf {
        self.worktrees_dir.join(branch.replace('/', "-"))
    }

    #[instrument(skip_all, fields(branch = %branch, base = %base))]
    fn create_branch(&self, branch: &str, base: &str) -> Result<PathBuf> {
        let path = self.workspace_path(branch);
        if path.exists() {
            debug!(path = %path.display(), "reusing existing worktree");
            return Ok(path);
        }
        fs::create_dir_all(&self.worktrees_dir)
            .with_context(|| format!("create directory {}", self.worktrees_dir.display()))?;
        self.git
            .worktree_add(&path, branch, base)
            .with_context(|| format!("create worktree for {branch}"))?;
        info!(branch, path = %path.display(), "worktree ready");
        Ok(path)
    }

    fn commit(&self, workdir: &Path, message: &str) -> Result<bool> {
        let git = Git::new(workdir);
        git.add_all()?;
        git.commit_staged(message)
    }

    fn head(&self, target: &str) -> Result<String> {
        self.git.rev_parse(target)
    }

    #[instrument(skip_all, fields(branch = %branch, target = %target))]
    fn merge(&self, branch: &str, target: &str) -> Result<MergeOutcome> {
        if self.git.current_branch()? != target {
            self.git.checkout_branch(target)?;
        }
        self.git
            .ensure_clean_except_prefixes(&[".ralph/"])
            .context("integration checkout must be clean before merging")?;
        let message = format!("ralph: merge {branch}");
        match self.git.merge_no_ff(branch, &message)? {
            MergeAttempt::Merged => Ok(MergeOutcome::Merged),
            MergeAttempt::Stopped { files, output } => Ok(MergeOutcome::Conflict(ConflictInfo {
                branch: branch.to_string(),
                files,
                detail: output,
            })),
        }
    }

    fn reset_to(&self, rev: &str) -> Result<()> {
        self.git.reset_merge(rev)
    }

    fn remove_workspace(&self, branch: &str) -> Result<()> {
        let path = self.workspace_path(branch);
        if !path.exists() {
            return Ok(());
        }
        self.git
            .worktree_remove(&path)
            .with_context(|| format!("remove worktree {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    fn vcs_for(repo: &TestRepo) -> GitVcs {
        GitVcs::new(repo.root(), repo.root().join(".ralph/worktrees"))
    }

    #[test]
    fn create_branch_is_idempotent() {
        let repo = TestRepo::new().expect("repo");
        repo.ignore_ralph_dir().expect("gitignore");
        let vcs = vcs_for(&repo);

        let first = vcs.create_branch("ralph/alpha", "main").expect("create");
        assert!(first.ends_with("ralph-alpha"));
        assert!(first.join("README.md").is_file());
        let second = vcs.create_branch("ralph/alpha", "main").expect("reuse");
        assert_eq!(first, second);
        assert!(vcs.branch_exists("ralph/alpha").expect("exists"));
    }

    #[test]
    fn merge_and_reset_round_trip() {
        let repo = TestRepo::new().expect("repo");
        repo.ignore_ralph_dir().expect("gitignore");
        let vcs = vcs_for(&repo);

        let workdir = vcs.create_branch("ralph/beta", "main").expect("create");
        fs::write(workdir.join("beta.txt"), "beta\n").expect("write");
        assert!(vcs.commit(&workdir, "add beta").expect("commit"));
        assert!(!vcs.commit(&workdir, "nothing").expect("noop commit"));

        let before = vcs.head("main").expect("head");
        assert_eq!(
            vcs.merge("ralph/beta", "main").expect("merge"),
            MergeOutcome::Merged
        );
        assert!(repo.root().join("beta.txt").is_file());

        vcs.reset_to(&before).expect("reset");
        assert!(!repo.root().join("beta.txt").exists());
        assert_eq!(vcs.head("main").expect("head"), before);

        vcs.remove_workspace("ralph/beta").expect("remove");
        assert!(!workdir.exists());
        assert!(vcs.branch_exists("ralph/beta").expect("branch kept"));
    }
}
