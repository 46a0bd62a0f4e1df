//! Semantic invariants not expressible via JSON Schema.

use std::collections::{HashMap, HashSet};

use crate::tree::Node;

/// Check semantic invariants not expressible in JSON Schema:
/// - Names are non-empty and contain no `/`
/// - Sibling names are unique (paths are unambiguous)
/// - Slice names are unique across the tree
/// - `dependencies` only on slices, naming other existing slices
/// - The slice dependency graph is acyclic
pub fn validate_invariants(root: &Node) -> Vec<String> {
    let mut errors = Vec::new();
    let mut slices: HashMap<&str, &Node> = HashMap::new();
    validate_node(root, root.name.as_str(), &mut slices, &mut errors);
    validate_dependencies(&slices, &mut errors);
    errors
}

fn validate_node<'a>(
    node: &'a Node,
    path: &str,
    slices: &mut HashMap<&'a str, &'a Node>,
    errors: &mut Vec<String>,
) {
    if node.name.trim().is_empty() {
        errors.push(format!("{path}: name must not be empty"));
    }
    if node.name.contains('/') {
        errors.push(format!("{path}: name must not contain '/'"));
    }

    if node.slice {
        if slices.insert(node.name.as_str(), node).is_some() {
            errors.push(format!("{path}: duplicate slice name '{}'", node.name));
        }
    } else if !node.dependencies.is_empty() {
        errors.push(format!("{path}: dependencies are only allowed on slices"));
    }

    let mut seen = HashSet::new();
    for child in &node.children {
        if !seen.insert(child.name.as_str()) {
            errors.push(format!("{path}: duplicate child name '{}'", child.name));
        }
    }

    for child in &node.children {
        let child_path = format!("{path}/{}", child.name);
        validate_node(child, &child_path, slices, errors);
    }
}

fn validate_dependencies(slices: &HashMap<&str, &Node>, errors: &mut Vec<String>) {
    let mut names: Vec<&str> = slices.keys().copied().collect();
    names.sort_unstable();

    for name in &names {
        for dep in &slices[name].dependencies {
            if dep == name {
                errors.push(format!("slice '{name}' depends on itself"));
            } else if !slices.contains_key(dep.as_str()) {
                errors.push(format!("slice '{name}' depends on unknown slice '{dep}'"));
            }
        }
    }

    // Depth-first search with colors; only report each cycle entry once.
    let mut state: HashMap<&str, Visit> = HashMap::new();
    for name in &names {
        if let Some(cycle_at) = find_cycle(name, slices, &mut state) {
            errors.push(format!("slice dependency cycle through '{cycle_at}'"));
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Active,
    Finished,
}

fn find_cycle<'a>(
    name: &'a str,
    slices: &HashMap<&'a str, &'a Node>,
    state: &mut HashMap<&'a str, Visit>,
) -> Option<&'a str> {
    match state.get(name) {
        Some(Visit::Finished) => return None,
        Some(Visit::Active) => return Some(name),
        None => {}
    }
    state.insert(name, Visit::Active);
    let mut found = None;
    if let Some(node) = slices.get(name) {
        for dep in &node.dependencies {
            // Self-dependencies are reported separately.
            if dep == name || !slices.contains_key(dep.as_str()) {
                continue;
            }
            if let Some(at) = find_cycle(dep.as_str(), slices, state) {
                found = Some(at);
                break;
            }
        }
    }
    state.insert(name, Visit::Finished);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{branch, pending, slice};

    #[test]
    fn valid_tree_has_no_errors() {
        let tree = branch(
            "root",
            vec![
                slice("api", &[], vec![pending("a")]),
                slice("ui", &["api"], vec![pending("b")]),
            ],
        );
        assert!(validate_invariants(&tree).is_empty());
    }

    #[test]
    fn reports_duplicate_siblings_and_bad_names() {
        let tree = branch(
            "root",
            vec![pending("dup"), pending("dup"), pending("a/b"), pending(" ")],
        );
        let errors = validate_invariants(&tree);
        assert!(errors.iter().any(|err| err.contains("duplicate child name 'dup'")));
        assert!(errors.iter().any(|err| err.contains("must not contain '/'")));
        assert!(errors.iter().any(|err| err.contains("must not be empty")));
    }

    #[test]
    fn reports_bad_dependencies() {
        let mut plain = branch("plain", vec![pending("p")]);
        plain.dependencies = vec!["api".to_string()];
        let tree = branch(
            "root",
            vec![
                slice("api", &["api"], vec![pending("a")]),
                slice("ui", &["missing"], vec![pending("b")]),
                plain,
            ],
        );
        let errors = validate_invariants(&tree);
        assert!(errors.iter().any(|err| err.contains("depends on itself")));
        assert!(errors.iter().any(|err| err.contains("unknown slice 'missing'")));
        assert!(errors.iter().any(|err| err.contains("only allowed on slices")));
    }

    #[test]
    fn reports_dependency_cycles() {
        let tree = branch(
            "root",
            vec![
                slice("a", &["c"], vec![pending("t1")]),
                slice("b", &["a"], vec![pending("t2")]),
                slice("c", &["b"], vec![pending("t3")]),
            ],
        );
        let errors = validate_invariants(&tree);
        assert!(errors.iter().any(|err| err.contains("cycle")));
    }
}
