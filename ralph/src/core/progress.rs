//! Task progress counts derived from the tree.

use crate::core::path::tasks;
use crate::tree::{Node, Status};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub pending: usize,
    pub in_progress: usize,
    pub done: usize,
    pub blocked: usize,
}

impl Progress {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.done + self.blocked
    }

    pub fn count(&self, status: Status) -> usize {
        match status {
            Status::Pending => self.pending,
            Status::InProgress => self.in_progress,
            Status::Done => self.done,
            Status::Blocked => self.blocked,
        }
    }

    /// Whole-percent completion; an empty tree counts as complete.
    pub fn percent_done(&self) -> usize {
        match self.total() {
            0 => 100,
            total => self.done * 100 / total,
        }
    }
}

pub fn progress(root: &Node) -> Progress {
    let mut counts = Progress::default();
    for (_, task) in tasks(root) {
        match task.task_status() {
            Status::Pending => counts.pending += 1,
            Status::InProgress => counts.in_progress += 1,
            Status::Done => counts.done += 1,
            Status::Blocked => counts.blocked += 1,
        }
    }
    counts
}
