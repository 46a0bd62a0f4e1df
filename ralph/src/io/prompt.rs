//! Prompt rendering for agent runs.
//!
//! Templates are compiled into the binary: the vanilla task prompt, the fix
//! prompt seeded with the previous failure, the manual worker prompt printed by
//! `assign`, and the tree review prompt printed by `govern`.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;

use crate::core::estimate::Estimate;
use crate::core::path::TaskPath;
use crate::core::progress::Progress;
use crate::tree::Node;

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");
const WORKER_TEMPLATE: &str = include_str!("prompts/worker.md");
const GOVERN_TEMPLATE: &str = include_str!("prompts/govern.md");

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank-line pattern is valid"));

/// Everything the task template needs.
#[derive(Debug, Clone)]
pub struct TaskPrompt<'a> {
    pub path: &'a TaskPath,
    pub task: &'a Node,
    pub estimate: &'a Estimate,
    /// Ancestor `context` blocks, root first.
    pub inherited: Vec<&'a str>,
    /// Enrichment blocks.
    pub blocks: Vec<String>,
}

/// Everything the tree review template needs.
#[derive(Debug, Clone)]
pub struct GovernPrompt<'a> {
    pub tree: &'a Node,
    pub progress: &'a Progress,
    /// Contents of the requirements file, if any.
    pub requirements: Option<&'a str>,
    pub target_tokens: u64,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("task", TASK_TEMPLATE)
            .context("load task template")?;
        env.add_template("fix", FIX_TEMPLATE)
            .context("load fix template")?;
        env.add_template("worker", WORKER_TEMPLATE)
            .context("load worker template")?;
        env.add_template("govern", GOVERN_TEMPLATE)
            .context("load govern template")?;
        Ok(Self { env })
    }

    pub fn render_task(&self, input: &TaskPrompt<'_>) -> Result<String> {
        let rendered = self.env.get_template("task")?.render(context! {
            path => input.path.to_string(),
            task => input.task,
            estimate => input.estimate,
            inherited => input.inherited,
            blocks => input.blocks,
        })?;
        Ok(tidy(&rendered))
    }

    /// Fix prompt for `attempt` (1-based) seeded with the previous failure.
    pub fn render_fix(
        &self,
        original: &str,
        attempt: u32,
        max_attempts: u32,
        failure: &str,
    ) -> Result<String> {
        let rendered = self.env.get_template("fix")?.render(context! {
            original,
            attempt,
            max_attempts,
            failure,
        })?;
        Ok(tidy(&rendered))
    }

    pub fn render_worker(
        &self,
        id: u32,
        branch: &str,
        workdir: &Path,
        task_prompt: &str,
    ) -> Result<String> {
        let rendered = self.env.get_template("worker")?.render(context! {
            id,
            branch,
            workdir => workdir.display().to_string(),
            task_prompt,
        })?;
        Ok(tidy(&rendered))
    }

    pub fn render_govern(&self, input: &GovernPrompt<'_>) -> Result<String> {
        let tree_json = serde_json::to_string_pretty(input.tree).context("serialize tree")?;
        let rendered = self.env.get_template("govern")?.render(context! {
            requirements => input.requirements.map(str::trim).filter(|text| !text.is_empty()),
            tree_json,
            total => input.progress.total(),
            done => input.progress.done,
            pending => input.progress.pending,
            in_progress => input.progress.in_progress,
            blocked => input.progress.blocked,
            target_tokens => input.target_tokens,
        })?;
        Ok(tidy(&rendered))
    }
}

/// Collapse runs of blank lines left by skipped template sections.
fn tidy(rendered: &str) -> String {
    let mut out = BLANK_RUNS.replace_all(rendered.trim(), "\n\n").into_owned();
    out.push('\n');
    out
}
