//! Sequential merge-back of worker branches into the integration branch.
//!
//! Every merge is gated: the task's acceptance commands and the `validation`
//! commands of each enclosing slice run against the merged state in the
//! project root. A conflict or failed gate halts the queue; a failed gate also
//! rolls the integration branch back to its pre-merge commit.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::path::{enclosing_slices, find};
use crate::core::types::{ValidationMode, ValidationReport};
use crate::io::vcs::{MergeOutcome, Vcs};
use crate::pool::{MergeRecord, Worker, WorkerPool, WorkerStatus};
use crate::tree::Node;
use crate::validate::Validator;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Workers whose branch is on the integration branch, in queue order.
    pub merged: Vec<u32>,
    /// The worker whose merge failed and halted the queue.
    pub blocked: Option<u32>,
    /// Done workers never attempted because the queue halted.
    pub unmerged: Vec<u32>,
    /// Workers still running or assigned.
    pub not_ready: Vec<u32>,
}

pub struct MergeCoordinator<'a> {
    pub vcs: &'a dyn Vcs,
    pub validator: Validator<'a>,
    /// Project root, where the integration branch is checked out.
    pub root: &'a Path,
    pub target: String,
}

impl MergeCoordinator<'_> {
    /// Commands gating a merge of the task at `worker.path`.
    pub fn gate_commands(tree: &Node, worker: &Worker) -> Result<Vec<String>> {
        let task = find(tree, &worker.path)?;
        let mut commands = task.acceptance.clone();
        for slice in enclosing_slices(tree, &worker.path)? {
            commands.extend(slice.validation.iter().cloned());
        }
        Ok(commands)
    }

    /// Merge one worker's branch and run the gate.
    #[instrument(skip_all, fields(worker = worker.id, branch = %worker.branch))]
    pub fn merge_one(&self, tree: &Node, worker: &Worker) -> Result<MergeRecord> {
        let commands = Self::gate_commands(tree, worker)?;
        let pre = self
            .vcs
            .head(&self.target)
            .with_context(|| format!("resolve {}", self.target))?;

        if let MergeOutcome::Conflict(conflict) = self.vcs.merge(&worker.branch, &self.target)? {
            warn!(detail = %conflict.describe(), "merge stopped");
            return Ok(MergeRecord::Conflict {
                detail: conflict.describe(),
            });
        }

        let report = self
            .validator
            .run_commands(&commands, self.root, ValidationMode::FailFast);
        if report.success {
            info!(commands = commands.len(), "merged and validated");
            return Ok(MergeRecord::Merged);
        }
        warn!("post-merge validation failed; rolling back");
        self.vcs
            .reset_to(&pre)
            .with_context(|| format!("roll {} back to {pre}", self.target))?;
        Ok(MergeRecord::ValidationFailed {
            detail: gate_failure(&report),
        })
    }

    /// Merge every done worker in assignment order, stopping at the first failure.
    ///
    /// Merge results are recorded on the workers; the caller persists the pool.
    pub fn merge_queue(&self, tree: &Node, pool: &mut WorkerPool) -> Result<MergeSummary> {
        let mut summary = MergeSummary::default();
        for worker in &mut pool.workers {
            if worker.status != WorkerStatus::Done {
                summary.not_ready.push(worker.id);
                continue;
            }
            if worker.is_merged() {
                summary.merged.push(worker.id);
                continue;
            }
            if let Some(by) = summary.blocked {
                worker.merge = Some(MergeRecord::Blocked { by });
                summary.unmerged.push(worker.id);
                continue;
            }
            let record = match self.merge_one(tree, worker) {
                Ok(record) => record,
                Err(err) => {
                    worker.note = Some(format!("merge failed: {err:#}"));
                    return Err(err);
                }
            };
            if record.is_merged() {
                summary.merged.push(worker.id);
            } else {
                summary.blocked = Some(worker.id);
            }
            worker.merge = Some(record);
        }
        info!(
            merged = summary.merged.len(),
            blocked = ?summary.blocked,
            unmerged = summary.unmerged.len(),
            "merge queue finished"
        );
        Ok(summary)
    }
}

fn gate_failure(report: &ValidationReport) -> String {
    let summary = report.failure_summary();
    if summary.is_empty() {
        "gate failed".to_string()
    } else {
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path::TaskPath;
    use crate::test_support::{FakeVcs, ScriptedAcceptance, branch, pending, slice};
    use std::path::PathBuf;
    use std::time::Duration;

    fn tree() -> Node {
        let mut a = pending("A");
        a.acceptance = vec!["check a".to_string()];
        let mut s = slice("Core", &[], vec![a, pending("B"), pending("C")]);
        s.validation = vec!["slice check".to_string()];
        branch("Project", vec![s])
    }

    fn worker(id: u32, name: &str, status: WorkerStatus) -> Worker {
        Worker {
            id,
            branch: format!("ralph/{}", name.to_lowercase()),
            task: name.to_string(),
            path: TaskPath::root("Project").child("Core").child(name),
            workdir: PathBuf::from("/unused"),
            status,
            attempts: Some(0),
            merge: None,
            note: None,
        }
    }

    fn coordinator<'a>(
        vcs: &'a FakeVcs,
        acceptance: &'a ScriptedAcceptance,
        root: &'a Path,
    ) -> MergeCoordinator<'a> {
        MergeCoordinator {
            vcs,
            validator: Validator {
                runner: acceptance,
                timeout: Duration::from_secs(5),
                output_limit_bytes: 10_000,
            },
            root,
            target: "main".to_string(),
        }
    }

    #[test]
    fn gate_includes_enclosing_slice_validation() {
        let commands =
            MergeCoordinator::gate_commands(&tree(), &worker(1, "A", WorkerStatus::Done))
                .expect("gate");
        assert_eq!(commands, vec!["check a", "slice check"]);
    }

    #[test]
    fn conflict_halts_queue_and_blocks_the_rest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::new(temp.path()).conflicting(&["ralph/b"]);
        let acceptance = ScriptedAcceptance::passing();
        let mut pool = WorkerPool {
            workers: vec![
                worker(1, "A", WorkerStatus::Done),
                worker(2, "B", WorkerStatus::Done),
                worker(3, "C", WorkerStatus::Done),
            ],
        };

        let summary = coordinator(&vcs, &acceptance, temp.path())
            .merge_queue(&tree(), &mut pool)
            .expect("merge");

        assert_eq!(summary.merged, vec![1]);
        assert_eq!(summary.blocked, Some(2));
        assert_eq!(summary.unmerged, vec![3]);
        assert_eq!(vcs.merges(), vec!["ralph/a", "ralph/b"]);
        assert!(matches!(pool.workers[1].merge, Some(MergeRecord::Conflict { .. })));
        assert_eq!(pool.workers[2].merge, Some(MergeRecord::Blocked { by: 2 }));
    }

    #[test]
    fn merge_error_stops_queue_and_notes_worker() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::new(temp.path()).broken_merges(&["ralph/b"]);
        let acceptance = ScriptedAcceptance::passing();
        let mut pool = WorkerPool {
            workers: vec![
                worker(1, "A", WorkerStatus::Done),
                worker(2, "B", WorkerStatus::Done),
                worker(3, "C", WorkerStatus::Done),
            ],
        };

        let err = coordinator(&vcs, &acceptance, temp.path())
            .merge_queue(&tree(), &mut pool)
            .unwrap_err();
        assert!(format!("{err:#}").contains("must be clean"));
        assert_eq!(pool.workers[0].merge, Some(MergeRecord::Merged));
        assert!(pool.workers[1].merge.is_none());
        assert!(pool.workers[1].note.is_some());
        assert!(pool.workers[2].merge.is_none());
        assert_eq!(vcs.merges(), vec!["ralph/a", "ralph/b"]);
    }

    #[test]
    fn failed_gate_rolls_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::new(temp.path());
        let acceptance = ScriptedAcceptance::failing("slice check", 1);
        let w = worker(1, "A", WorkerStatus::Done);

        let record = coordinator(&vcs, &acceptance, temp.path())
            .merge_one(&tree(), &w)
            .expect("merge");
        match record {
            MergeRecord::ValidationFailed { detail } => {
                assert!(detail.contains("COMMAND FAILED: slice check"));
            }
            other => panic!("unexpected record {other:?}"),
        }
        assert_eq!(vcs.resets().len(), 1);
    }

    #[test]
    fn unfinished_and_merged_workers_are_not_merged_again() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = FakeVcs::new(temp.path());
        let acceptance = ScriptedAcceptance::passing();
        let mut merged = worker(1, "A", WorkerStatus::Done);
        merged.merge = Some(MergeRecord::Merged);
        let mut pool = WorkerPool {
            workers: vec![merged, worker(2, "B", WorkerStatus::InProgress)],
        };

        let summary = coordinator(&vcs, &acceptance, temp.path())
            .merge_queue(&tree(), &mut pool)
            .expect("merge");
        assert_eq!(summary.merged, vec![1]);
        assert_eq!(summary.not_ready, vec![2]);
        assert!(vcs.merges().is_empty());
    }
}
