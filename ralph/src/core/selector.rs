//! Deterministic selection logic for the task tree.
//!
//! Selection is a pre-order depth-first walk in document order. Subtrees rooted
//! at a *locked* slice (one whose dependency slices are not all done) are
//! skipped entirely.

use std::collections::{HashMap, HashSet};

use crate::core::path::TaskPath;
use crate::tree::{Node, Status};

/// Slice name to "fully done" lookup, built once per walk.
#[derive(Debug, Default)]
pub struct SliceIndex<'a> {
    done: HashMap<&'a str, bool>,
}

impl<'a> SliceIndex<'a> {
    pub fn build(root: &'a Node) -> Self {
        let mut index = Self::default();
        index.insert(root);
        index
    }

    fn insert(&mut self, node: &'a Node) {
        if node.slice {
            self.done
                .insert(node.name.as_str(), node.derived_status() == Status::Done);
        }
        for child in &node.children {
            self.insert(child);
        }
    }

    /// True if `node` is a slice with at least one dependency not yet done.
    pub fn is_locked(&self, node: &Node) -> bool {
        node.slice
            && node
                .dependencies
                .iter()
                .any(|dep| !self.done.get(dep.as_str()).copied().unwrap_or(false))
    }
}

/// First pending task outside locked slices, or `None`.
pub fn next_task(root: &Node) -> Option<TaskPath> {
    next_task_excluding(root, &HashSet::new())
}

/// Like [`next_task`], treating every path in `held` as already taken.
pub fn next_task_excluding(root: &Node, held: &HashSet<TaskPath>) -> Option<TaskPath> {
    let index = SliceIndex::build(root);
    let mut out = Vec::with_capacity(1);
    walk(root, TaskPath::root(&root.name), &index, held, &mut out, 1);
    out.pop()
}

/// All selectable tasks in selection order.
pub fn eligible_tasks(root: &Node, held: &HashSet<TaskPath>) -> Vec<TaskPath> {
    let index = SliceIndex::build(root);
    let mut out = Vec::new();
    walk(root, TaskPath::root(&root.name), &index, held, &mut out, usize::MAX);
    out
}

fn walk(
    node: &Node,
    path: TaskPath,
    index: &SliceIndex<'_>,
    held: &HashSet<TaskPath>,
    out: &mut Vec<TaskPath>,
    limit: usize,
) {
    if out.len() >= limit || index.is_locked(node) {
        return;
    }
    if node.is_task() {
        if node.task_status() == Status::Pending && !held.contains(&path) {
            out.push(path);
        }
        return;
    }
    for child in &node.children {
        walk(child, path.child(&child.name), index, held, out, limit);
        if out.len() >= limit {
            return;
        }
    }
}
