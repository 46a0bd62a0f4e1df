//! Worker pool: parallel task assignments persisted in `.ralph/workers.json`.
//!
//! The pool is an explicit value loaded from disk and passed by reference;
//! there is no process-wide registry. Workers keep assignment order, which
//! is also the merge order.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::path::{TaskPath, slugify};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerStatus {
    Assigned,
    InProgress,
    Done,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkerStatus::Assigned => "assigned",
            WorkerStatus::InProgress => "in-progress",
            WorkerStatus::Done => "done",
        })
    }
}

/// Result of the last attempt to integrate a worker's branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum MergeRecord {
    Merged,
    Conflict { detail: String },
    ValidationFailed { detail: String },
    /// Not attempted because an earlier worker in the queue failed.
    Blocked { by: u32 },
}

impl MergeRecord {
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeRecord::Merged)
    }

    pub fn describe(&self) -> String {
        match self {
            MergeRecord::Merged => "merged".to_string(),
            MergeRecord::Conflict { detail } => format!("conflict: {detail}"),
            MergeRecord::ValidationFailed { detail } => {
                format!("post-merge validation failed:\n{detail}")
            }
            MergeRecord::Blocked { by } => format!("not merged: queue halted at worker {by}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: u32,
    pub branch: String,
    /// Task name, for display.
    pub task: String,
    pub path: TaskPath,
    pub workdir: PathBuf,
    pub status: WorkerStatus,
    /// Fix attempts consumed by the last healing run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeRecord>,
    /// Last failure detail (exhausted healing run, runner failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Worker {
    pub fn is_merged(&self) -> bool {
        self.merge.as_ref().is_some_and(MergeRecord::is_merged)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPool {
    pub workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Smallest id above every id in use.
    pub fn next_id(&self) -> u32 {
        self.workers.iter().map(|w| w.id).max().unwrap_or(0) + 1
    }

    pub fn contains(&self, id: u32) -> bool {
        self.workers.iter().any(|w| w.id == id)
    }

    pub fn get(&self, id: u32) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Worker> {
        self.workers.iter_mut().find(|w| w.id == id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Worker> {
        let index = self.workers.iter().position(|w| w.id == id)?;
        Some(self.workers.remove(index))
    }

    /// Task paths currently owned by a worker.
    pub fn held_paths(&self) -> HashSet<TaskPath> {
        self.workers.iter().map(|w| w.path.clone()).collect()
    }

    pub fn branches(&self) -> HashSet<&str> {
        self.workers.iter().map(|w| w.branch.as_str()).collect()
    }
}

/// `<prefix><slug>`, suffixed `-2`, `-3`, ... until `taken` accepts it.
pub fn branch_name(prefix: &str, task_name: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    let base = format!("{prefix}{}", slugify(task_name));
    if !taken(&base) {
        return base;
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
