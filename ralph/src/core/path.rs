//! Name paths addressing nodes in the task tree.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;
use crate::tree::Node;

/// Names from the root (inclusive) down to a node, rendered as `A/B/C`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TaskPath(Vec<String>);

impl TaskPath {
    pub fn root(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment (the node's own name).
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }
}

impl fmt::Display for TaskPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl FromStr for TaskPath {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let segments: Vec<String> = raw.split('/').map(str::to_string).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(anyhow!("invalid task path '{raw}': empty segment"));
        }
        Ok(Self(segments))
    }
}

impl From<TaskPath> for String {
    fn from(path: TaskPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for TaskPath {
    type Error = anyhow::Error;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

/// Resolve `path` against `root`, failing with `NotFound` on the first
/// segment that does not match a child at its level.
pub fn find<'a>(root: &'a Node, path: &TaskPath) -> Result<&'a Node> {
    let not_found = || OrchestratorError::NotFound {
        path: path.to_string(),
    };
    let (first, rest) = path.segments().split_first().ok_or_else(not_found)?;
    if first != &root.name {
        return Err(not_found().into());
    }
    let mut node = root;
    for segment in rest {
        node = node.child(segment).ok_or_else(not_found)?;
    }
    Ok(node)
}

pub fn find_mut<'a>(root: &'a mut Node, path: &TaskPath) -> Result<&'a mut Node> {
    let not_found = || OrchestratorError::NotFound {
        path: path.to_string(),
    };
    let (first, rest) = path.segments().split_first().ok_or_else(not_found)?;
    if first != &root.name {
        return Err(not_found().into());
    }
    let mut node = root;
    for segment in rest {
        node = node.child_mut(segment).ok_or_else(not_found)?;
    }
    Ok(node)
}

/// Nodes on the way from the root to `path`, both ends inclusive.
pub fn lineage<'a>(root: &'a Node, path: &TaskPath) -> Result<Vec<&'a Node>> {
    find(root, path)?;
    let mut chain = vec![root];
    let mut node = root;
    for segment in path.segments().iter().skip(1) {
        node = node.child(segment).ok_or_else(|| OrchestratorError::NotFound {
            path: path.to_string(),
        })?;
        chain.push(node);
    }
    Ok(chain)
}

/// `context` blocks from the root down to `path`, in that order.
pub fn inherited_context<'a>(root: &'a Node, path: &TaskPath) -> Result<Vec<&'a str>> {
    Ok(lineage(root, path)?
        .into_iter()
        .filter_map(|node| node.context.as_deref())
        .filter(|text| !text.trim().is_empty())
        .collect())
}

/// Slices containing `path`, outermost first. A slice task counts as its own.
pub fn enclosing_slices<'a>(root: &'a Node, path: &TaskPath) -> Result<Vec<&'a Node>> {
    Ok(lineage(root, path)?
        .into_iter()
        .filter(|node| node.slice)
        .collect())
}

/// Every task in document order with its path.
pub fn tasks(root: &Node) -> Vec<(TaskPath, &Node)> {
    let mut out = Vec::new();
    collect_tasks(root, TaskPath::root(&root.name), &mut out);
    out
}

fn collect_tasks<'a>(node: &'a Node, path: TaskPath, out: &mut Vec<(TaskPath, &'a Node)>) {
    if node.is_task() {
        out.push((path, node));
        return;
    }
    for child in &node.children {
        collect_tasks(child, path.child(&child.name), out);
    }
}

/// Branch-safe slug: lowercase alphanumerics joined by single dashes, at most
/// 40 characters.
pub fn slugify(name: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= 40 {
            break;
        }
    }
    slug.truncate(40);
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "task".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{branch, pending};

    fn sample() -> Node {
        branch(
            "Project",
            vec![
                branch("Auth", vec![pending("Login form"), pending("Logout")]),
                pending("Docs"),
            ],
        )
    }

    #[test]
    fn parses_and_renders_slash_paths() {
        let path: TaskPath = "Project/Auth/Login form".parse().expect("parse");
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.name(), "Login form");
        assert_eq!(path.to_string(), "Project/Auth/Login form");
        assert!("Project//Login".parse::<TaskPath>().is_err());
    }

    #[test]
    fn find_resolves_nested_task() {
        let tree = sample();
        let path: TaskPath = "Project/Auth/Logout".parse().expect("parse");
        assert_eq!(find(&tree, &path).expect("find").name, "Logout");
    }

    #[test]
    fn find_reports_not_found_for_bad_segment() {
        let tree = sample();
        let path: TaskPath = "Project/Billing/Invoices".parse().expect("parse");
        let err = find(&tree, &path).unwrap_err();
        assert!(matches!(
            OrchestratorError::find(&err),
            Some(OrchestratorError::NotFound { .. })
        ));
    }

    #[test]
    fn find_requires_matching_root() {
        let tree = sample();
        let path: TaskPath = "Auth/Logout".parse().expect("parse");
        assert!(find(&tree, &path).is_err());
    }

    #[test]
    fn lineage_runs_root_to_node() {
        let tree = sample();
        let path: TaskPath = "Project/Auth/Logout".parse().expect("parse");
        let names: Vec<&str> = lineage(&tree, &path)
            .expect("lineage")
            .iter()
            .map(|node| node.name.as_str())
            .collect();
        assert_eq!(names, vec!["Project", "Auth", "Logout"]);
    }

    #[test]
    fn inherited_context_and_slices_follow_lineage() {
        let mut tree = sample();
        tree.context = Some("Rust 2024 workspace".to_string());
        let auth = tree.child_mut("Auth").expect("auth");
        auth.slice = true;
        auth.context = Some("Use the session module".to_string());
        let path: TaskPath = "Project/Auth/Logout".parse().expect("parse");

        assert_eq!(
            inherited_context(&tree, &path).expect("context"),
            vec!["Rust 2024 workspace", "Use the session module"]
        );
        let slices = enclosing_slices(&tree, &path).expect("slices");
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].name, "Auth");
        let docs: TaskPath = "Project/Docs".parse().expect("parse");
        assert!(enclosing_slices(&tree, &docs).expect("slices").is_empty());
    }

    #[test]
    fn tasks_are_listed_in_document_order() {
        let tree = sample();
        let paths: Vec<String> = tasks(&tree)
            .into_iter()
            .map(|(path, _)| path.to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "Project/Auth/Login form",
                "Project/Auth/Logout",
                "Project/Docs"
            ]
        );
    }

    #[test]
    fn task_path_serializes_as_string() {
        let path: TaskPath = "Project/Docs".parse().expect("parse");
        let json = serde_json::to_string(&path).expect("serialize");
        assert_eq!(json, "\"Project/Docs\"");
    }

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("Add  user login (OAuth)!"), "add-user-login-oauth");
        assert_eq!(slugify("***"), "task");
        let long = slugify("a very long task name that keeps going well past forty chars");
        assert!(long.len() <= 40);
        assert!(!long.ends_with('-'));
    }
}
