//! Task-tree orchestration for autonomous coding agents.
//!
//! Plans live in `.ralph/tree.json`. `ralph` picks the next eligible task,
//! runs an agent on an isolated branch, validates the result with the task's
//! acceptance commands, retries with fix prompts, and merges passing work back.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use ralph::core::path::TaskPath;
use ralph::core::types::ValidationMode;
use ralph::error::exit_code_for;
use ralph::exit_codes;
use ralph::io::acceptance::ShellRunner;
use ralph::io::agent::CommandAgent;
use ralph::io::config::load_config;
use ralph::io::init::{InitOptions, RalphPaths, init_project};
use ralph::io::vcs::GitVcs;
use ralph::logging;
use ralph::orchestrator::{Collaborators, Orchestrator, ValidateTarget, WorkerResult, WorkerRun};
use ralph::pool::MergeRecord;
use ralph::report;

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Task-tree orchestration for autonomous coding agents"
)]
struct Cli {
    /// Project root containing `.ralph/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log progress to stderr (same as RALPH_LOG=info).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.ralph/` with a starter tree and config.
    Init {
        /// Overwrite existing ralph files.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the next task's prompt.
    Next,
    /// Run the next task to completion, merge it and mark it done.
    Execute {
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Assign N workers and run them concurrently.
    ExecuteParallel {
        n: usize,
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Assign up to N workers and print their prompts.
    Assign {
        n: usize,
        /// Also run the assigned workers.
        #[arg(long)]
        run: bool,
    },
    /// Assign a single worker, optionally with a chosen id.
    AssignOne {
        id: Option<u32>,
        #[arg(long)]
        run: bool,
    },
    /// Merge every finished worker in assignment order.
    Merge,
    /// Validate a task in the project root and mark it done.
    Done {
        /// Skip validation.
        #[arg(long)]
        force: bool,
        /// Task path (defaults to the next task), e.g. `Project/Auth/Login`.
        #[arg(long)]
        path: Option<TaskPath>,
    },
    /// Mark every merged worker's task done and release it.
    DoneAll,
    /// Merge one worker (if needed) and mark its task done.
    DoneOne { id: u32 },
    /// Run acceptance commands and print the report.
    Validate {
        /// Run every command instead of stopping at the first failure.
        #[arg(long)]
        all: bool,
        #[arg(long, conflicts_with = "slice")]
        path: Option<TaskPath>,
        #[arg(long)]
        slice: Option<String>,
    },
    /// Show progress, the tree and active workers.
    Status,
    /// Show token estimates for every eligible task.
    Estimate,
    /// Print a prompt asking an agent to review and restructure the tree.
    Govern,
    /// Add a node (JSON) under a parent path.
    Add { parent: TaskPath, node: String },
    /// Remove a node and its subtree.
    Prune { path: TaskPath },
    /// List workers.
    Workers,
    /// Drop a worker and its checkout (the branch is kept).
    Release { id: u32 },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    if let Command::Init { force } = cli.command {
        let paths = init_project(&cli.root, &InitOptions { force })?;
        println!("initialized {}", paths.ralph_dir.display());
        return Ok(exit_codes::OK);
    }

    let paths = RalphPaths::new(&cli.root);
    let config = load_config(&paths.config_path)?;
    let agent = CommandAgent::new(config.agent.command.clone());
    let acceptance = ShellRunner::new(config.validation.shell.clone());
    let vcs = GitVcs::new(&paths.root, &paths.worktrees_dir);
    let mut orch = Orchestrator::new(
        paths,
        config,
        Collaborators {
            agent: &agent,
            acceptance: &acceptance,
            vcs: &vcs,
        },
    )?;

    match cli.command {
        Command::Init { .. } => Ok(exit_codes::OK),
        Command::Next => match orch.next()? {
            Some(next) => {
                print!("{}", next.prompt);
                Ok(exit_codes::OK)
            }
            None => nothing_to_do("no eligible task"),
        },
        Command::Execute { max_attempts } => {
            if let Some(max) = max_attempts {
                orch.set_max_attempts(max);
            }
            match orch.execute()? {
                Some(done) => {
                    println!(
                        "done: {} ({} fix attempts, branch {})",
                        done.path, done.attempts, done.branch
                    );
                    Ok(exit_codes::OK)
                }
                None => nothing_to_do("no eligible task"),
            }
        }
        Command::ExecuteParallel { n, max_attempts } => {
            if let Some(max) = max_attempts {
                orch.set_max_attempts(max);
            }
            let runs = orch.execute_parallel(n)?;
            if runs.is_empty() {
                return nothing_to_do("no eligible task");
            }
            print!("{}", report::runs(&runs));
            Ok(runs_exit_code(&runs))
        }
        Command::Assign { n, run } => {
            let workers = orch.assign(n)?;
            if workers.is_empty() {
                return nothing_to_do("no eligible task");
            }
            if run {
                let ids: Vec<u32> = workers.iter().map(|w| w.id).collect();
                let runs = orch.run_workers(&ids)?;
                print!("{}", report::runs(&runs));
                return Ok(runs_exit_code(&runs));
            }
            for worker in &workers {
                println!("{}", orch.worker_prompt(worker)?);
            }
            Ok(exit_codes::OK)
        }
        Command::AssignOne { id, run } => {
            let Some(worker) = orch.assign_one(id)? else {
                return nothing_to_do("no eligible task");
            };
            if run {
                let runs = orch.run_workers(&[worker.id])?;
                print!("{}", report::runs(&runs));
                return Ok(runs_exit_code(&runs));
            }
            print!("{}", orch.worker_prompt(&worker)?);
            Ok(exit_codes::OK)
        }
        Command::Merge => {
            let summary = orch.merge()?;
            let pool = orch.workers()?;
            if summary == Default::default() {
                return nothing_to_do("no workers");
            }
            print!("{}", report::merge(&summary, &pool));
            let blocked = summary.blocked.and_then(|id| pool.get(id));
            Ok(match blocked.and_then(|w| w.merge.as_ref()) {
                Some(MergeRecord::ValidationFailed { .. }) => exit_codes::VALIDATION_FAILED,
                Some(_) => exit_codes::MERGE_CONFLICT,
                None => exit_codes::OK,
            })
        }
        Command::Done { force, path } => match orch.done(path, force)? {
            Some(done) => {
                if let Some(report) = &done.report {
                    print!("{}", report::validation(&done.path.to_string(), report));
                }
                println!("done: {}", done.path);
                Ok(exit_codes::OK)
            }
            None => nothing_to_do("no eligible task"),
        },
        Command::DoneAll => {
            let done = orch.done_all()?;
            if done.shipped.is_empty() && done.left.is_empty() {
                return nothing_to_do("no workers");
            }
            print!("{}", report::done_all(&done));
            Ok(exit_codes::OK)
        }
        Command::DoneOne { id } => {
            let path = orch.done_one(id)?;
            println!("done: {path}");
            Ok(exit_codes::OK)
        }
        Command::Validate { all, path, slice } => {
            let mode = if all {
                ValidationMode::CollectAll
            } else {
                ValidationMode::FailFast
            };
            let target = match (path, slice) {
                (Some(path), _) => ValidateTarget::Path(path),
                (None, Some(slice)) => ValidateTarget::Slice(slice),
                (None, None) => ValidateTarget::Next,
            };
            let Some((label, validation)) = orch.validate(&target, mode)? else {
                return nothing_to_do("no eligible task");
            };
            print!("{}", report::validation(&label, &validation));
            Ok(if validation.success {
                exit_codes::OK
            } else {
                exit_codes::VALIDATION_FAILED
            })
        }
        Command::Status => {
            print!("{}", report::status(&orch.status()?));
            Ok(exit_codes::OK)
        }
        Command::Estimate => {
            let rows = orch.estimate()?;
            if rows.is_empty() {
                return nothing_to_do("no eligible task");
            }
            print!("{}", report::estimates(&rows));
            Ok(exit_codes::OK)
        }
        Command::Govern => {
            print!("{}", orch.govern()?);
            Ok(exit_codes::OK)
        }
        Command::Add { parent, node } => {
            println!("added: {}", orch.add(&parent, &node)?);
            Ok(exit_codes::OK)
        }
        Command::Prune { path } => {
            orch.prune(&path)?;
            println!("pruned: {path}");
            Ok(exit_codes::OK)
        }
        Command::Workers => {
            print!("{}", report::workers(&orch.workers()?));
            Ok(exit_codes::OK)
        }
        Command::Release { id } => {
            let worker = orch.release(id)?;
            println!("released worker {id} (branch {} kept)", worker.branch);
            Ok(exit_codes::OK)
        }
    }
}

/// `OK` only when every worker passed.
fn runs_exit_code(runs: &[WorkerRun]) -> i32 {
    if runs
        .iter()
        .all(|run| matches!(run.result, WorkerResult::Passed { .. }))
    {
        exit_codes::OK
    } else {
        exit_codes::EXHAUSTED
    }
}

fn nothing_to_do(message: &str) -> Result<i32> {
    println!("{message}");
    Ok(exit_codes::COMPLETE)
}
