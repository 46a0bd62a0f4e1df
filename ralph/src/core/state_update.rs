//! Deterministic tree mutations: status transitions, additions and pruning.
//!
//! These operate on an in-memory tree; callers persist through the tree
//! store. Every mutation addresses nodes by [`TaskPath`].

use anyhow::{Result, anyhow};

use crate::core::path::{TaskPath, find_mut};
use crate::tree::{Node, Status};

/// Set the status of a task. Branch statuses are derived and cannot be set.
///
/// Returns the previous status.
pub fn set_task_status(root: &mut Node, path: &TaskPath, status: Status) -> Result<Status> {
    let node = find_mut(root, path)?;
    if !node.is_task() {
        return Err(anyhow!(
            "{path} has children; its status is derived from its tasks"
        ));
    }
    let previous = node.task_status();
    node.status = Some(status);
    Ok(previous)
}

/// Append `child` under `parent`, rejecting a duplicate sibling name.
pub fn add_child(root: &mut Node, parent: &TaskPath, mut child: Node) -> Result<TaskPath> {
    let node = find_mut(root, parent)?;
    if node.child(&child.name).is_some() {
        return Err(anyhow!("{parent} already has a child named '{}'", child.name));
    }
    if child.is_task() && child.status.is_none() {
        child.status = Some(Status::Pending);
    }
    // A task that gains children becomes a branch.
    node.status = None;
    let added = parent.child(&child.name);
    node.children.push(child);
    Ok(added)
}

/// Remove the node at `path` (and its subtree). The root cannot be pruned.
pub fn prune(root: &mut Node, path: &TaskPath) -> Result<Node> {
    let parent_path = path
        .parent()
        .ok_or_else(|| anyhow!("cannot prune the root node"))?;
    let parent = find_mut(root, &parent_path)?;
    let index = parent
        .children
        .iter()
        .position(|child| child.name == path.name())
        .ok_or_else(|| crate::error::OrchestratorError::NotFound {
            path: path.to_string(),
        })?;
    let removed = parent.children.remove(index);
    if parent.children.is_empty() {
        // The parent is a task again; start it from pending.
        parent.status = Some(Status::Pending);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestratorError;
    use crate::test_support::{branch, pending, task};

    fn path(raw: &str) -> TaskPath {
        raw.parse().expect("path")
    }

    #[test]
    fn set_status_updates_task_and_returns_previous() {
        let mut tree = branch("root", vec![pending("a")]);
        let previous = set_task_status(&mut tree, &path("root/a"), Status::Done).expect("set");
        assert_eq!(previous, Status::Pending);
        assert_eq!(tree.children[0].status, Some(Status::Done));
    }

    #[test]
    fn set_status_rejects_branch_nodes() {
        let mut tree = branch("root", vec![branch("b", vec![pending("b1")])]);
        let err = set_task_status(&mut tree, &path("root/b"), Status::Done).unwrap_err();
        assert!(err.to_string().contains("derived"));
    }

    #[test]
    fn set_status_reports_missing_path() {
        let mut tree = branch("root", vec![pending("a")]);
        let err = set_task_status(&mut tree, &path("root/zzz"), Status::Done).unwrap_err();
        assert!(matches!(
            OrchestratorError::find(&err),
            Some(OrchestratorError::NotFound { .. })
        ));
    }

    #[test]
    fn add_child_turns_task_into_branch() {
        let mut tree = branch("root", vec![task("a", Status::InProgress)]);
        let added = add_child(
            &mut tree,
            &path("root/a"),
            Node {
                name: "a1".to_string(),
                ..Node::default()
            },
        )
        .expect("add");
        assert_eq!(added.to_string(), "root/a/a1");
        assert_eq!(tree.children[0].status, None);
        assert_eq!(tree.children[0].children[0].status, Some(Status::Pending));
    }

    #[test]
    fn add_child_rejects_duplicates() {
        let mut tree = branch("root", vec![pending("a")]);
        let err = add_child(&mut tree, &path("root"), pending("a")).unwrap_err();
        assert!(err.to_string().contains("already has a child"));
    }

    #[test]
    fn prune_removes_subtree_and_refuses_root() {
        let mut tree = branch("root", vec![branch("b", vec![pending("b1")]), pending("c")]);
        let removed = prune(&mut tree, &path("root/b")).expect("prune");
        assert_eq!(removed.name, "b");
        assert_eq!(tree.children.len(), 1);
        assert!(prune(&mut tree, &path("root")).is_err());
    }
}
