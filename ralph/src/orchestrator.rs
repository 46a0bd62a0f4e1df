//! Command surface composing the tree store, selector, worker pool, healing
//! loop and merge coordinator.
//!
//! The orchestrator is the only writer of `tree.json` and `workers.json`.
//! Worker threads spawned by [`Orchestrator::run_workers`] only touch their own
//! checkout; results are folded back into the pool after every thread joins.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::core::estimate::{Estimate, estimate};
use crate::core::path::{TaskPath, find, inherited_context, tasks};
use crate::core::progress::{Progress, progress};
use crate::core::selector::{eligible_tasks, next_task_excluding};
use crate::core::state_update::{add_child, prune, set_task_status};
use crate::core::types::{ValidationMode, ValidationReport};
use crate::error::OrchestratorError;
use crate::healing::{Failure, HealingLoop, HealingOutcome, HealingRun};
use crate::io::acceptance::AcceptanceRunner;
use crate::io::agent::AgentInvoker;
use crate::io::config::RalphConfig;
use crate::io::context::{CommandSource, ContextSource, RequirementsFile, gather};
use crate::io::init::RalphPaths;
use crate::io::prompt::{GovernPrompt, PromptEngine, TaskPrompt};
use crate::io::tree_store::{TreeStore, validate_schema};
use crate::io::vcs::Vcs;
use crate::io::workers::{load_pool, write_pool};
use crate::merge::{MergeCoordinator, MergeSummary};
use crate::pool::{MergeRecord, Worker, WorkerPool, WorkerStatus, branch_name};
use crate::runner::SubagentRunner;
use crate::tree::{Node, Status};
use crate::validate::Validator;

/// External collaborators the orchestrator drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub agent: &'a dyn AgentInvoker,
    pub acceptance: &'a dyn AcceptanceRunner,
    pub vcs: &'a dyn Vcs,
}

/// The next task with its rendered prompt.
#[derive(Debug, Clone)]
pub struct NextTask {
    pub path: TaskPath,
    pub estimate: Estimate,
    pub prompt: String,
}

#[derive(Debug, Clone)]
pub struct ExecuteReport {
    pub path: TaskPath,
    pub branch: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResult {
    Passed { attempts: u32 },
    Exhausted { attempts: u32, detail: String },
    Cancelled,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct WorkerRun {
    pub id: u32,
    pub path: TaskPath,
    pub branch: String,
    pub result: WorkerResult,
}

#[derive(Debug, Clone)]
pub struct DoneReport {
    pub path: TaskPath,
    /// `None` when validation was skipped with `--force`.
    pub report: Option<ValidationReport>,
}

#[derive(Debug, Clone, Default)]
pub struct DoneAllReport {
    pub shipped: Vec<(u32, TaskPath)>,
    /// Workers left in the pool, with why.
    pub left: Vec<(u32, TaskPath, String)>,
}

#[derive(Debug, Clone)]
pub enum ValidateTarget {
    /// The next selectable task.
    Next,
    Path(TaskPath),
    Slice(String),
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub tree: Node,
    pub progress: Progress,
    pub workers: WorkerPool,
}

struct Job {
    id: u32,
    path: TaskPath,
    branch: String,
    task: Node,
    prompt: String,
}

pub struct Orchestrator<'a> {
    paths: RalphPaths,
    config: RalphConfig,
    collab: Collaborators<'a>,
    store: TreeStore,
    sources: Vec<Box<dyn ContextSource>>,
    prompts: PromptEngine,
    cancel: Arc<AtomicBool>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(paths: RalphPaths, config: RalphConfig, collab: Collaborators<'a>) -> Result<Self> {
        let mut sources: Vec<Box<dyn ContextSource>> = Vec::new();
        if config.enrichment.requirements {
            sources.push(Box::new(RequirementsFile::new(&paths.requirements_path)));
        }
        if !config.enrichment.command.is_empty() {
            sources.push(Box::new(CommandSource::new(
                config.enrichment.command.clone(),
                &paths.root,
                std::time::Duration::from_secs(config.enrichment.timeout_secs),
            )));
        }
        Ok(Self {
            store: TreeStore::new(&paths.tree_path),
            paths,
            config,
            collab,
            sources,
            prompts: PromptEngine::new()?,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_sources(mut self, sources: Vec<Box<dyn ContextSource>>) -> Self {
        self.sources = sources;
        self
    }

    /// Raising this flag kills running agents; no status is changed.
    ///
    /// For library callers that embed the orchestrator (a host with its own
    /// signal handling, a supervising thread). The `ralph` binary installs no
    /// signal handler, so Ctrl-C there terminates the process group instead.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn set_max_attempts(&mut self, max_attempts: u32) {
        self.config.healing.max_attempts = max_attempts;
    }

    fn integration_branch(&self) -> Result<String> {
        match &self.config.git.integration_branch {
            Some(branch) => Ok(branch.clone()),
            None => self
                .collab
                .vcs
                .current_branch()
                .context("determine integration branch"),
        }
    }

    fn load_pool(&self) -> Result<WorkerPool> {
        load_pool(&self.paths.workers_path)
    }

    fn save_pool(&self, pool: &WorkerPool) -> Result<()> {
        write_pool(&self.paths.workers_path, pool)
    }

    fn validator(&self) -> Validator<'_> {
        Validator {
            runner: self.collab.acceptance,
            timeout: self.config.validation.timeout(),
            output_limit_bytes: self.config.validation.output_limit_bytes,
        }
    }

    fn healing(&self, base: String) -> HealingLoop<'_> {
        HealingLoop {
            runner: SubagentRunner {
                agent: self.collab.agent,
                vcs: self.collab.vcs,
                base,
                timeout: self.config.agent.timeout(),
                output_limit_bytes: self.config.agent.output_limit_bytes,
                cancel: self.cancel.as_ref(),
            },
            validator: self.validator(),
            prompts: &self.prompts,
            vcs: self.collab.vcs,
            runs_dir: &self.paths.runs_dir,
            max_attempts: self.config.healing.max_attempts,
        }
    }

    fn coordinator(&self, target: String) -> MergeCoordinator<'_> {
        MergeCoordinator {
            vcs: self.collab.vcs,
            validator: self.validator(),
            root: &self.paths.root,
            target,
        }
    }

    /// Vanilla prompt for the task at `path`.
    pub fn task_prompt(&self, tree: &Node, path: &TaskPath) -> Result<String> {
        let task = find(tree, path)?;
        let est = estimate(task, &self.config.estimate);
        self.prompts.render_task(&TaskPrompt {
            path,
            task,
            estimate: &est,
            inherited: inherited_context(tree, path)?,
            blocks: gather(&self.sources, path, task),
        })
    }

    /// Next selectable task not held by a worker.
    pub fn next(&self) -> Result<Option<NextTask>> {
        let tree = self.store.load()?.tree;
        let held = self.load_pool()?.held_paths();
        let Some(path) = next_task_excluding(&tree, &held) else {
            return Ok(None);
        };
        let task = find(&tree, &path)?;
        Ok(Some(NextTask {
            estimate: estimate(task, &self.config.estimate),
            prompt: self.task_prompt(&tree, &path)?,
            path,
        }))
    }

    /// Run the next task through the healing loop, merge it and mark it done.
    pub fn execute(&self) -> Result<Option<ExecuteReport>> {
        let tree = self.store.load()?.tree;
        let mut pool = self.load_pool()?;
        let Some(path) = next_task_excluding(&tree, &pool.held_paths()) else {
            return Ok(None);
        };
        let task = find(&tree, &path)?.clone();
        let prompt = self.task_prompt(&tree, &path)?;
        let base = self.integration_branch()?;
        let mut worker = self.allocate(&mut pool, &tree, &path, None, &base)?;
        set_worker_status(&mut pool, worker.id, WorkerStatus::InProgress);
        self.save_pool(&pool)?;

        info!(task = %path, branch = %worker.branch, "executing task");
        let run = match self.healing(base.clone()).run(&task, &worker.branch, &prompt) {
            Ok(run) => run,
            Err(err) => {
                self.park_worker(&mut pool, worker.id, WorkerStatus::Assigned, None, &err);
                return Err(err);
            }
        };

        let attempts = match run.outcome {
            HealingOutcome::Done { attempts, .. } => attempts,
            HealingOutcome::Exhausted {
                attempts,
                last_failure,
            } => {
                self.release_worker(&mut pool, worker.id)?;
                return Err(exhausted_error(&task.name, attempts, &last_failure).into());
            }
            HealingOutcome::Cancelled { .. } => {
                self.release_worker(&mut pool, worker.id)?;
                bail!("execution of '{}' cancelled", task.name);
            }
        };

        worker.status = WorkerStatus::Done;
        worker.attempts = Some(attempts);
        let merged = self
            .store
            .load()
            .and_then(|snapshot| self.coordinator(base).merge_one(&snapshot.tree, &worker));
        let record = match merged {
            Ok(record) => record,
            Err(err) => {
                self.park_worker(&mut pool, worker.id, WorkerStatus::Done, Some(attempts), &err);
                return Err(err);
            }
        };
        if !record.is_merged() {
            let err = merge_error(&worker, &record);
            if let Some(stored) = pool.get_mut(worker.id) {
                stored.status = WorkerStatus::Done;
                stored.attempts = Some(attempts);
                stored.merge = Some(record);
            }
            self.save_pool(&pool)?;
            return Err(err.into());
        }

        if let Err(err) = self
            .store
            .update(|tree| set_task_status(tree, &path, Status::Done).map(|_| ()))
        {
            // The branch is already integrated; `done-all` can still ship it.
            if let Some(stored) = pool.get_mut(worker.id) {
                stored.merge = Some(MergeRecord::Merged);
            }
            self.park_worker(&mut pool, worker.id, WorkerStatus::Done, Some(attempts), &err);
            return Err(err);
        }
        self.release_worker(&mut pool, worker.id)?;
        info!(task = %path, attempts, "task done");
        Ok(Some(ExecuteReport {
            path,
            branch: worker.branch,
            attempts,
        }))
    }

    /// `assign(n)` then run every assigned worker concurrently.
    pub fn execute_parallel(&self, n: usize) -> Result<Vec<WorkerRun>> {
        let workers = self.assign(n)?;
        let ids: Vec<u32> = workers.iter().map(|w| w.id).collect();
        self.run_workers(&ids)
    }

    /// Allocate up to `n` workers on distinct eligible tasks.
    pub fn assign(&self, n: usize) -> Result<Vec<Worker>> {
        let tree = self.store.load()?.tree;
        let mut pool = self.load_pool()?;
        let base = self.integration_branch()?;
        let mut assigned = Vec::new();
        while assigned.len() < n {
            let Some(path) = next_task_excluding(&tree, &pool.held_paths()) else {
                break;
            };
            assigned.push(self.allocate(&mut pool, &tree, &path, None, &base)?);
        }
        info!(requested = n, assigned = assigned.len(), "workers assigned");
        Ok(assigned)
    }

    /// Allocate one worker, optionally with a specific id.
    pub fn assign_one(&self, id: Option<u32>) -> Result<Option<Worker>> {
        let mut pool = self.load_pool()?;
        if let Some(id) = id
            && pool.contains(id)
        {
            return Err(OrchestratorError::WorkerConflict { id }.into());
        }
        let tree = self.store.load()?.tree;
        let Some(path) = next_task_excluding(&tree, &pool.held_paths()) else {
            return Ok(None);
        };
        let base = self.integration_branch()?;
        self.allocate(&mut pool, &tree, &path, id, &base).map(Some)
    }

    fn allocate(
        &self,
        pool: &mut WorkerPool,
        tree: &Node,
        path: &TaskPath,
        id: Option<u32>,
        base: &str,
    ) -> Result<Worker> {
        let task = find(tree, path)?;
        let id = id.unwrap_or_else(|| pool.next_id());
        let branch = {
            let taken = pool.branches();
            branch_name(&self.config.git.branch_prefix, &task.name, |candidate| {
                taken.contains(candidate)
                    || matches!(self.collab.vcs.branch_exists(candidate), Ok(true))
            })
        };
        let workdir = self.collab.vcs.create_branch(&branch, base)?;
        let worker = Worker {
            id,
            branch,
            task: task.name.clone(),
            path: path.clone(),
            workdir,
            status: WorkerStatus::Assigned,
            attempts: None,
            merge: None,
            note: None,
        };
        pool.workers.push(worker.clone());
        self.save_pool(pool)?;
        info!(worker = id, task = %path, branch = %worker.branch, "worker assigned");
        Ok(worker)
    }

    /// Manual prompt for a worker (printed by `assign`).
    pub fn worker_prompt(&self, worker: &Worker) -> Result<String> {
        let tree = self.store.load()?.tree;
        let task_prompt = self.task_prompt(&tree, &worker.path)?;
        self.prompts
            .render_worker(worker.id, &worker.branch, &worker.workdir, &task_prompt)
    }

    /// Run the healing loop for each listed worker on its own thread.
    pub fn run_workers(&self, ids: &[u32]) -> Result<Vec<WorkerRun>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let tree = self.store.load()?.tree;
        let mut pool = self.load_pool()?;
        let base = self.integration_branch()?;

        let mut jobs = Vec::with_capacity(ids.len());
        for &id in ids {
            let worker = pool.get(id).ok_or_else(|| OrchestratorError::NotFound {
                path: format!("worker {id}"),
            })?;
            jobs.push(Job {
                id,
                path: worker.path.clone(),
                branch: worker.branch.clone(),
                task: find(&tree, &worker.path)?.clone(),
                prompt: self.task_prompt(&tree, &worker.path)?,
            });
        }
        for &id in ids {
            set_worker_status(&mut pool, id, WorkerStatus::InProgress);
        }
        self.save_pool(&pool)?;

        info!(workers = jobs.len(), "starting parallel workers");
        let outcomes: Vec<(Job, Result<HealingRun>)> = thread::scope(|scope| {
            let handles: Vec<_> = jobs
                .into_iter()
                .map(|job| {
                    let base = base.clone();
                    scope.spawn(move || {
                        let run = self.healing(base).run(&job.task, &job.branch, &job.prompt);
                        (job, run)
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| match handle.join() {
                    Ok(outcome) => Some(outcome),
                    Err(_) => {
                        warn!("worker thread panicked");
                        None
                    }
                })
                .collect()
        });

        let mut runs = Vec::with_capacity(outcomes.len());
        for (job, run) in outcomes {
            let result = match run {
                Ok(run) => match run.outcome {
                    HealingOutcome::Done { attempts, .. } => WorkerResult::Passed { attempts },
                    HealingOutcome::Exhausted {
                        attempts,
                        last_failure,
                    } => WorkerResult::Exhausted {
                        attempts,
                        detail: last_failure.summary(),
                    },
                    HealingOutcome::Cancelled { .. } => WorkerResult::Cancelled,
                },
                Err(err) => WorkerResult::Error(format!("{err:#}")),
            };
            if let Some(worker) = pool.get_mut(job.id) {
                apply_result(worker, &result);
            }
            runs.push(WorkerRun {
                id: job.id,
                path: job.path,
                branch: job.branch,
                result,
            });
        }
        // Workers whose thread panicked go back to assigned.
        for &id in ids {
            if let Some(worker) = pool.get_mut(id)
                && worker.status == WorkerStatus::InProgress
            {
                worker.status = WorkerStatus::Assigned;
                worker.note = Some("worker thread panicked".to_string());
            }
        }
        self.save_pool(&pool)?;
        Ok(runs)
    }

    /// Merge every done worker in assignment order.
    pub fn merge(&self) -> Result<MergeSummary> {
        let mut pool = self.load_pool()?;
        if pool.is_empty() {
            return Ok(MergeSummary::default());
        }
        let tree = self.store.load()?.tree;
        let target = self.integration_branch()?;
        // Records of workers merged before a failure are kept either way.
        let summary = self.coordinator(target).merge_queue(&tree, &mut pool);
        self.save_pool(&pool)?;
        summary
    }

    /// Validate the task in the project root and mark it done.
    pub fn done(&self, path: Option<TaskPath>, force: bool) -> Result<Option<DoneReport>> {
        let tree = self.store.load()?.tree;
        let path = match path {
            Some(path) => path,
            None => {
                let held = self.load_pool()?.held_paths();
                let Some(path) = next_task_excluding(&tree, &held) else {
                    return Ok(None);
                };
                path
            }
        };
        let task = find(&tree, &path)?;
        let report = if force {
            None
        } else {
            let report = self
                .validator()
                .validate(task, &self.paths.root, ValidationMode::FailFast);
            if !report.success {
                return Err(OrchestratorError::ValidationFailure {
                    task: task.name.clone(),
                    summary: report.failure_summary(),
                }
                .into());
            }
            Some(report)
        };
        self.store
            .update(|tree| set_task_status(tree, &path, Status::Done).map(|_| ()))?;
        info!(task = %path, forced = force, "task marked done");
        Ok(Some(DoneReport { path, report }))
    }

    /// Ship every merged worker; leave the rest pending in the pool.
    pub fn done_all(&self) -> Result<DoneAllReport> {
        let mut pool = self.load_pool()?;
        let mut report = DoneAllReport::default();
        for worker in &pool.workers {
            if worker.is_merged() {
                report.shipped.push((worker.id, worker.path.clone()));
            } else {
                report
                    .left
                    .push((worker.id, worker.path.clone(), leftover_detail(worker)));
            }
        }
        if report.shipped.is_empty() {
            return Ok(report);
        }
        self.store.update(|tree| {
            for (_, path) in &report.shipped {
                set_task_status(tree, path, Status::Done)?;
            }
            Ok(())
        })?;
        for (id, _) in &report.shipped {
            self.release_worker(&mut pool, *id)?;
        }
        info!(
            shipped = report.shipped.len(),
            left = report.left.len(),
            "done-all finished"
        );
        Ok(report)
    }

    /// Merge one worker (if not merged yet) and ship it.
    pub fn done_one(&self, id: u32) -> Result<TaskPath> {
        let mut pool = self.load_pool()?;
        let worker = pool
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound {
                path: format!("worker {id}"),
            })?;

        if !worker.is_merged() {
            if worker.workdir.exists() {
                self.collab
                    .vcs
                    .commit(&worker.workdir, &format!("ralph: {}", worker.task))
                    .with_context(|| format!("commit worker {id} checkout"))?;
            }
            let tree = self.store.load()?.tree;
            let target = self.integration_branch()?;
            let record = match self.coordinator(target).merge_one(&tree, &worker) {
                Ok(record) => record,
                Err(err) => {
                    self.park_worker(&mut pool, id, worker.status, worker.attempts, &err);
                    return Err(err);
                }
            };
            let merged = record.is_merged();
            let err = (!merged).then(|| merge_error(&worker, &record));
            if let Some(stored) = pool.get_mut(id) {
                stored.status = WorkerStatus::Done;
                stored.merge = Some(record);
            }
            self.save_pool(&pool)?;
            if let Some(err) = err {
                return Err(err.into());
            }
        }

        self.store
            .update(|tree| set_task_status(tree, &worker.path, Status::Done).map(|_| ()))?;
        self.release_worker(&mut pool, id)?;
        info!(worker = id, task = %worker.path, "worker shipped");
        Ok(worker.path)
    }

    /// Run acceptance commands in the project root.
    ///
    /// Returns `None` when `Next` finds nothing to validate.
    pub fn validate(
        &self,
        target: &ValidateTarget,
        mode: ValidationMode,
    ) -> Result<Option<(String, ValidationReport)>> {
        let tree = self.store.load()?.tree;
        let (label, commands) = match target {
            ValidateTarget::Next => {
                let held = self.load_pool()?.held_paths();
                let Some(path) = next_task_excluding(&tree, &held) else {
                    return Ok(None);
                };
                let task = find(&tree, &path)?;
                (path.to_string(), task.acceptance.clone())
            }
            ValidateTarget::Path(path) => {
                let node = find(&tree, path)?;
                let mut commands = node.acceptance.clone();
                if node.slice {
                    commands.extend(node.validation.iter().cloned());
                }
                (path.to_string(), commands)
            }
            ValidateTarget::Slice(name) => {
                let node = find_slice(&tree, name).ok_or_else(|| OrchestratorError::NotFound {
                    path: format!("slice {name}"),
                })?;
                (format!("slice {name}"), node.validation.clone())
            }
        };
        let report = self
            .validator()
            .run_commands(&commands, &self.paths.root, mode);
        Ok(Some((label, report)))
    }

    pub fn status(&self) -> Result<StatusReport> {
        let tree = self.store.load()?.tree;
        Ok(StatusReport {
            progress: progress(&tree),
            workers: self.load_pool()?,
            tree,
        })
    }

    /// Estimates for every selectable task.
    pub fn estimate(&self) -> Result<Vec<(TaskPath, String, Estimate)>> {
        let tree = self.store.load()?.tree;
        let mut rows = Vec::new();
        for path in eligible_tasks(&tree, &HashSet::new()) {
            let task = find(&tree, &path)?;
            rows.push((
                path.clone(),
                task.name.clone(),
                estimate(task, &self.config.estimate),
            ));
        }
        Ok(rows)
    }

    /// Review prompt asking an agent to mark done, prune, split or add tasks.
    pub fn govern(&self) -> Result<String> {
        let tree = self.store.load()?.tree;
        let requirements_path = &self.paths.requirements_path;
        let requirements = if requirements_path.exists() {
            Some(
                std::fs::read_to_string(requirements_path).with_context(|| {
                    format!("read requirements {}", requirements_path.display())
                })?,
            )
        } else {
            None
        };
        self.prompts.render_govern(&GovernPrompt {
            tree: &tree,
            progress: &progress(&tree),
            requirements: requirements.as_deref(),
            target_tokens: self.config.estimate.target_tokens,
        })
    }

    /// Add a node (given as JSON) under `parent`.
    pub fn add(&self, parent: &TaskPath, node_json: &str) -> Result<TaskPath> {
        let value: serde_json::Value =
            serde_json::from_str(node_json).context("parse node JSON")?;
        validate_schema(&value)?;
        let node: Node = serde_json::from_value(value).map_err(|err| OrchestratorError::Schema {
            message: err.to_string(),
        })?;
        let path = self.store.update(|tree| add_child(tree, parent, node))?;
        info!(task = %path, "node added");
        Ok(path)
    }

    /// Remove the node at `path` and its subtree.
    pub fn prune(&self, path: &TaskPath) -> Result<Node> {
        let pool = self.load_pool()?;
        if let Some(worker) = pool
            .workers
            .iter()
            .find(|w| w.path.segments().starts_with(path.segments()))
        {
            return Err(OrchestratorError::WorkerConflict { id: worker.id })
                .with_context(|| format!("{path} is held by worker {}", worker.id));
        }
        let removed = self.store.update(|tree| prune(tree, path))?;
        info!(task = %path, tasks = tasks(&removed).len(), "node pruned");
        Ok(removed)
    }

    pub fn workers(&self) -> Result<WorkerPool> {
        self.load_pool()
    }

    /// Drop a worker and its checkout; its branch is kept.
    pub fn release(&self, id: u32) -> Result<Worker> {
        let mut pool = self.load_pool()?;
        let worker = pool
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound {
                path: format!("worker {id}"),
            })?;
        self.release_worker(&mut pool, id)?;
        Ok(worker)
    }

    /// Leave a worker in the pool after an error, with the error as its note.
    fn park_worker(
        &self,
        pool: &mut WorkerPool,
        id: u32,
        status: WorkerStatus,
        attempts: Option<u32>,
        err: &anyhow::Error,
    ) {
        if let Some(worker) = pool.get_mut(id) {
            worker.status = status;
            if attempts.is_some() {
                worker.attempts = attempts;
            }
            worker.note = Some(format!("{err:#}"));
        }
        if let Err(save_err) = self.save_pool(pool) {
            warn!(worker = id, err = %format!("{save_err:#}"), "failed to record worker state");
        }
    }

    fn release_worker(&self, pool: &mut WorkerPool, id: u32) -> Result<()> {
        if let Some(worker) = pool.remove(id)
            && let Err(err) = self.collab.vcs.remove_workspace(&worker.branch)
        {
            warn!(worker = id, err = %format!("{err:#}"), "failed to remove worker checkout");
        }
        self.save_pool(pool)
    }
}

fn set_worker_status(pool: &mut WorkerPool, id: u32, status: WorkerStatus) {
    if let Some(worker) = pool.get_mut(id) {
        worker.status = status;
    }
}

fn apply_result(worker: &mut Worker, result: &WorkerResult) {
    match result {
        WorkerResult::Passed { attempts } => {
            worker.status = WorkerStatus::Done;
            worker.attempts = Some(*attempts);
            worker.merge = None;
            worker.note = None;
        }
        WorkerResult::Exhausted { attempts, detail } => {
            worker.status = WorkerStatus::Assigned;
            worker.attempts = Some(*attempts);
            worker.note = Some(detail.clone());
        }
        WorkerResult::Cancelled => {
            worker.status = WorkerStatus::Assigned;
            worker.note = Some("cancelled".to_string());
        }
        WorkerResult::Error(detail) => {
            worker.status = WorkerStatus::Assigned;
            worker.note = Some(detail.clone());
        }
    }
}

fn exhausted_error(task: &str, attempts: u32, failure: &Failure) -> OrchestratorError {
    match failure {
        Failure::Validation(report) => OrchestratorError::RetryExhausted {
            task: task.to_string(),
            attempts,
            last_failure: report.failure_summary(),
        },
        Failure::Runner(result) => OrchestratorError::RunnerFailure {
            task: task.to_string(),
            detail: format!("after {attempts} fix attempts\n{}", result.failure_detail()),
        },
    }
}

fn merge_error(worker: &Worker, record: &MergeRecord) -> OrchestratorError {
    match record {
        MergeRecord::ValidationFailed { detail } => OrchestratorError::ValidationFailure {
            task: worker.task.clone(),
            summary: detail.clone(),
        },
        other => OrchestratorError::MergeConflict {
            branch: worker.branch.clone(),
            detail: other.describe(),
        },
    }
}

fn leftover_detail(worker: &Worker) -> String {
    if let Some(record) = &worker.merge {
        return record.describe();
    }
    if let Some(note) = &worker.note {
        return note.clone();
    }
    match worker.status {
        WorkerStatus::Done => "done, not merged yet".to_string(),
        status => format!("worker {status}"),
    }
}

fn find_slice<'t>(node: &'t Node, name: &str) -> Option<&'t Node> {
    if node.slice && node.name == name {
        return Some(node);
    }
    node.children.iter().find_map(|child| find_slice(child, name))
}
