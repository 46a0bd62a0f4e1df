//! Bounded self-healing loop around the runner and validator.
//!
//! ```text
//! RUN -> VALIDATE -> PASS -> DONE
//!                 -> FAIL -> FIX (attempt < max) -> VALIDATE
//!                 -> FAIL -> EXHAUSTED
//! ```
//!
//! `attempt` is 0 for the vanilla run and increments on each FIX. A runner
//! failure consumes an attempt like a failed validation but carries no
//! report; the next fix prompt shows the raw failure instead.

use std::fmt;
use std::path::Path;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::types::{ValidationMode, ValidationReport};
use crate::io::attempt_log::AttemptPaths;
use crate::io::prompt::PromptEngine;
use crate::io::vcs::Vcs;
use crate::runner::{RunOutcome, RunResult, SubagentRunner};
use crate::tree::Node;
use crate::validate::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealingState {
    Run,
    Validate,
    Fix,
    Done,
    Exhausted,
}

impl fmt::Display for HealingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealingState::Run => "RUN",
            HealingState::Validate => "VALIDATE",
            HealingState::Fix => "FIX",
            HealingState::Done => "DONE",
            HealingState::Exhausted => "EXHAUSTED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub attempt: u32,
    pub from: HealingState,
    pub to: HealingState,
}

/// Why an attempt did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Validation(ValidationReport),
    Runner(RunResult),
}

impl Failure {
    /// Text seeded into the next fix prompt.
    pub fn summary(&self) -> String {
        match self {
            Failure::Validation(report) => report.failure_summary(),
            Failure::Runner(result) => result.failure_detail(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealingOutcome {
    /// `attempts` is the number of FIX invocations consumed.
    Done {
        attempts: u32,
        report: ValidationReport,
    },
    Exhausted {
        attempts: u32,
        last_failure: Failure,
    },
    Cancelled {
        attempts: u32,
    },
}

impl HealingOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            HealingOutcome::Done { attempts, .. }
            | HealingOutcome::Exhausted { attempts, .. }
            | HealingOutcome::Cancelled { attempts } => *attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealingRun {
    pub outcome: HealingOutcome,
    pub history: Vec<Transition>,
}

pub struct HealingLoop<'a> {
    pub runner: SubagentRunner<'a>,
    pub validator: Validator<'a>,
    pub prompts: &'a PromptEngine,
    pub vcs: &'a dyn Vcs,
    pub runs_dir: &'a Path,
    pub max_attempts: u32,
}

impl HealingLoop<'_> {
    /// Drive `task` on `branch` to DONE, EXHAUSTED or cancellation.
    ///
    /// Errors are reserved for problems outside the loop's control (prompt
    /// rendering, committing the finished work).
    #[instrument(skip_all, fields(task = %task.name, branch = %branch, max = self.max_attempts))]
    pub fn run(&self, task: &Node, branch: &str, prompt: &str) -> Result<HealingRun> {
        let mut history = Vec::new();
        let mut attempt = 0u32;
        let mut state = HealingState::Run;
        let mut current_prompt = prompt.to_string();

        loop {
            if self.runner.cancel.load(Ordering::SeqCst) {
                info!(attempt, "healing cancelled");
                return Ok(HealingRun {
                    outcome: HealingOutcome::Cancelled { attempts: attempt },
                    history,
                });
            }

            let log = AttemptPaths::new(self.runs_dir, branch, attempt);
            if let Err(err) = log.write_prompt(&current_prompt) {
                warn!(err = %format!("{err:#}"), "failed to write attempt prompt");
            }

            let result = self.runner.run(task, branch, &current_prompt, &log);
            let failure = match result.outcome {
                RunOutcome::Cancelled => {
                    info!(attempt, "healing cancelled during agent run");
                    return Ok(HealingRun {
                        outcome: HealingOutcome::Cancelled { attempts: attempt },
                        history,
                    });
                }
                RunOutcome::Success => {
                    history.push(Transition {
                        attempt,
                        from: state,
                        to: HealingState::Validate,
                    });
                    state = HealingState::Validate;
                    let workdir = self.vcs.workspace_path(branch);
                    let report = self
                        .validator
                        .validate(task, &workdir, ValidationMode::FailFast);
                    if let Err(err) = log.write_validation(&report) {
                        warn!(err = %format!("{err:#}"), "failed to write validation report");
                    }
                    if report.success {
                        history.push(Transition {
                            attempt,
                            from: state,
                            to: HealingState::Done,
                        });
                        self.vcs
                            .commit(&workdir, &format!("ralph: {}", task.name))
                            .with_context(|| format!("commit work for {}", task.name))?;
                        info!(attempts = attempt, "task passed validation");
                        return Ok(HealingRun {
                            outcome: HealingOutcome::Done {
                                attempts: attempt,
                                report,
                            },
                            history,
                        });
                    }
                    Failure::Validation(report)
                }
                RunOutcome::Failure(_) | RunOutcome::Timeout => Failure::Runner(result),
            };

            if attempt >= self.max_attempts {
                history.push(Transition {
                    attempt,
                    from: state,
                    to: HealingState::Exhausted,
                });
                warn!(attempts = attempt, "fix attempts exhausted");
                return Ok(HealingRun {
                    outcome: HealingOutcome::Exhausted {
                        attempts: attempt,
                        last_failure: failure,
                    },
                    history,
                });
            }

            attempt += 1;
            history.push(Transition {
                attempt,
                from: state,
                to: HealingState::Fix,
            });
            state = HealingState::Fix;
            info!(attempt, max = self.max_attempts, "starting fix attempt");
            current_prompt =
                self.prompts
                    .render_fix(prompt, attempt, self.max_attempts, &failure.summary())?;
        }
    }
}
