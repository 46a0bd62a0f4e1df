//! Project layout under `.ralph/` and `ralph init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::{RalphConfig, write_config};
use crate::io::tree_store::TreeStore;
use crate::tree::default_tree;

/// All canonical paths within `.ralph/` for a project root.
#[derive(Debug, Clone)]
pub struct RalphPaths {
    pub root: PathBuf,
    pub ralph_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub tree_path: PathBuf,
    pub workers_path: PathBuf,
    pub config_path: PathBuf,
    pub requirements_path: PathBuf,
    pub worktrees_dir: PathBuf,
    pub runs_dir: PathBuf,
}

impl RalphPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let ralph_dir = root.join(".ralph");
        Self {
            root: root.clone(),
            ralph_dir: ralph_dir.clone(),
            gitignore_path: ralph_dir.join(".gitignore"),
            tree_path: ralph_dir.join("tree.json"),
            workers_path: ralph_dir.join("workers.json"),
            config_path: ralph_dir.join("config.toml"),
            requirements_path: ralph_dir.join("requirements.md"),
            worktrees_dir: ralph_dir.join("worktrees"),
            runs_dir: ralph_dir.join("runs"),
        }
    }
}

/// Options for `init_project`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing ralph-owned files.
    pub force: bool,
}

/// Create `.ralph/` scaffolding in `root`.
///
/// Fails if `.ralph/tree.json` already exists unless `options.force` is set.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<RalphPaths> {
    let paths = RalphPaths::new(root);
    if paths.ralph_dir.exists() && !paths.ralph_dir.is_dir() {
        return Err(anyhow!("ralph init: .ralph exists but is not a directory"));
    }
    if paths.tree_path.exists() && !options.force {
        return Err(anyhow!(
            "ralph init: {} already exists (use --force to overwrite)",
            paths.tree_path.display()
        ));
    }

    fs::create_dir_all(&paths.ralph_dir)
        .with_context(|| format!("create directory {}", paths.ralph_dir.display()))?;

    write_file(&paths.gitignore_path, RALPH_GITIGNORE)?;
    TreeStore::new(&paths.tree_path).create(&default_tree())?;
    write_config(&paths.config_path, &RalphConfig::default())?;
    if options.force || !paths.requirements_path.exists() {
        write_file(&paths.requirements_path, REQUIREMENTS_PLACEHOLDER)?;
    }

    Ok(paths)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const REQUIREMENTS_PLACEHOLDER: &str = "# Requirements\n\n## Scale\n- Define your scale targets here\n\n## Priorities\n- What matters most?\n\n## Skip\n- What is explicitly out of scope?\n";
const RALPH_GITIGNORE: &str = "worktrees/\nruns/\nworkers.json\n*.tmp\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;
    use crate::tree::default_tree;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.ralph_dir.is_dir());
        assert!(paths.tree_path.is_file());
        assert!(paths.config_path.is_file());
        assert!(paths.requirements_path.is_file());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("read"),
            RALPH_GITIGNORE
        );

        let snapshot = TreeStore::new(&paths.tree_path).load().expect("load");
        assert_eq!(snapshot.tree, default_tree());
        assert_eq!(
            load_config(&paths.config_path).expect("config"),
            RalphConfig::default()
        );
    }

    #[test]
    fn init_without_force_refuses_existing_tree() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_project(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_project(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_rewrites_requirements() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_project(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.requirements_path, "custom").expect("write custom");

        init_project(temp.path(), &InitOptions { force: true }).expect("re-init");
        assert_eq!(
            fs::read_to_string(&paths.requirements_path).expect("read"),
            REQUIREMENTS_PLACEHOLDER
        );
    }
}
