//! Task tree document model.
//!
//! A [`Node`] with no children is a *task*; everything else is a branch whose
//! status is derived from its descendant tasks and never persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of task statuses accepted in the persisted tree.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Done,
    Blocked,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::InProgress,
        Status::Done,
        Status::Blocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in-progress",
            Status::Done => "done",
            Status::Blocked => "blocked",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_first: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance: Vec<String>,
    /// Free text inherited by every descendant's prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub slice: bool,
    /// Display-only ordering hint for slices; selection always follows document order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    /// Slice names that must be fully done before this slice unlocks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Commands run against the integrated state for every task merged under this slice.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Node {
    pub fn is_task(&self) -> bool {
        self.children.is_empty()
    }

    /// Status of a task, defaulting to pending when absent.
    pub fn task_status(&self) -> Status {
        self.status.unwrap_or_default()
    }

    /// Status computed from descendant tasks.
    ///
    /// Tasks report their own status. A branch is `done` when every task
    /// below it is done, `in-progress` when any is in progress, `blocked` when
    /// every unfinished task is blocked, and `pending` otherwise.
    pub fn derived_status(&self) -> Status {
        if self.is_task() {
            return self.task_status();
        }
        let mut all_done = true;
        let mut any_in_progress = false;
        let mut unfinished_all_blocked = true;
        for child in &self.children {
            match child.derived_status() {
                Status::Done => {}
                Status::InProgress => {
                    all_done = false;
                    any_in_progress = true;
                    unfinished_all_blocked = false;
                }
                Status::Blocked => all_done = false,
                Status::Pending => {
                    all_done = false;
                    unfinished_all_blocked = false;
                }
            }
        }
        if all_done {
            Status::Done
        } else if any_in_progress {
            Status::InProgress
        } else if unfinished_all_blocked {
            Status::Blocked
        } else {
            Status::Pending
        }
    }

    /// Drop statuses stored on branch nodes; they are always derived.
    pub fn clear_branch_statuses(&mut self) {
        if self.is_task() {
            return;
        }
        self.status = None;
        for child in &mut self.children {
            child.clear_branch_statuses();
        }
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|child| child.name == name)
    }
}

/// Starter plan written by `ralph init`.
pub fn default_tree() -> Node {
    Node {
        name: "Project".to_string(),
        context: Some("Describe your project here".to_string()),
        children: vec![Node {
            name: "Feature 1".to_string(),
            context: Some("Context for this feature".to_string()),
            children: vec![Node {
                name: "First task description".to_string(),
                status: Some(Status::Pending),
                files: vec!["src/lib.rs".to_string()],
                acceptance: vec!["git diff --check".to_string()],
                ..Node::default()
            }],
            ..Node::default()
        }],
        ..Node::default()
    }
}
