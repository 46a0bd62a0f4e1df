//! Tree load/save with schema + invariant validation and optimistic concurrency.
//!
//! Every load returns a [`Snapshot`] carrying the SHA-256 revision of the bytes
//! read. A save names the revision it was based on and is rejected with
//! `StaleTree` if the document changed on disk in between, so concurrent
//! `ralph` processes cannot silently overwrite each other.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::invariants::validate_invariants;
use crate::error::OrchestratorError;
use crate::tree::Node;

const TREE_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/tree.schema.json"
));

/// A tree as read from disk, tagged with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub tree: Node,
    pub revision: String,
}

#[derive(Debug, Clone)]
pub struct TreeStore {
    path: PathBuf,
}

impl TreeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the tree (schema, then typed parse, then invariants).
    pub fn load(&self) -> Result<Snapshot> {
        let contents = fs::read(&self.path)
            .with_context(|| format!("read tree {}", self.path.display()))?;
        let tree = parse_tree(&contents)
            .with_context(|| format!("load tree {}", self.path.display()))?;
        let revision = revision_of(&contents);
        debug!(path = %self.path.display(), %revision, "tree loaded");
        Ok(Snapshot { tree, revision })
    }

    /// Atomically replace the tree, provided the on-disk revision still equals `base_revision`.
    ///
    /// Returns the new revision.
    pub fn save(&self, tree: &Node, base_revision: &str) -> Result<String> {
        let current = self.current_revision()?;
        if current.as_deref() != Some(base_revision) {
            return Err(OrchestratorError::StaleTree {
                expected: base_revision.to_string(),
                found: current.unwrap_or_else(|| "<missing>".to_string()),
            }
            .into());
        }
        self.write(tree)
    }

    /// Write a fresh tree without a revision check (used by `ralph init`).
    pub fn create(&self, tree: &Node) -> Result<String> {
        self.write(tree)
    }

    /// Load, apply `mutate`, and save against the loaded revision.
    pub fn update<T>(&self, mutate: impl FnOnce(&mut Node) -> Result<T>) -> Result<T> {
        let mut snapshot = self.load()?;
        let value = mutate(&mut snapshot.tree)?;
        self.save(&snapshot.tree, &snapshot.revision)?;
        Ok(value)
    }

    fn current_revision(&self) -> Result<Option<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(revision_of(&bytes))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read tree {}", self.path.display())),
        }
    }

    fn write(&self, tree: &Node) -> Result<String> {
        let buf = render_tree(tree)?;
        crate::io::write_atomic(&self.path, &buf)?;
        let revision = revision_of(buf.as_bytes());
        debug!(path = %self.path.display(), %revision, "tree saved");
        Ok(revision)
    }
}

/// Parse tree JSON: schema conformance, typed parse, then semantic invariants.
pub fn parse_tree(contents: &[u8]) -> Result<Node> {
    let value: Value = serde_json::from_slice(contents).map_err(|err| OrchestratorError::Schema {
        message: format!("invalid JSON: {err}"),
    })?;
    validate_schema(&value)?;
    let tree: Node = serde_json::from_value(value).map_err(|err| OrchestratorError::Schema {
        message: err.to_string(),
    })?;
    ensure_invariants(&tree)?;
    Ok(tree)
}

/// Canonical text form: branch statuses dropped, pretty JSON, trailing newline.
///
/// Refuses to render a tree that violates the invariants.
pub fn render_tree(tree: &Node) -> Result<String> {
    ensure_invariants(tree)?;
    let mut cloned = tree.clone();
    cloned.clear_branch_statuses();
    let mut buf = serde_json::to_string_pretty(&cloned)?;
    buf.push('\n');
    Ok(buf)
}

/// Validate a single node (and its subtree) against the tree schema.
pub fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TREE_SCHEMA).context("parse embedded tree schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(OrchestratorError::Schema {
            message: messages.join("; "),
        }
        .into());
    }
    Ok(())
}

fn ensure_invariants(tree: &Node) -> Result<()> {
    let errors = validate_invariants(tree);
    if errors.is_empty() {
        return Ok(());
    }
    Err(OrchestratorError::Schema {
        message: format!("tree invariants failed: {}", errors.join("; ")),
    }
    .into())
}

fn revision_of(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{branch, pending, task};
    use crate::tree::{Status, default_tree};

    fn schema_error(err: &anyhow::Error) -> bool {
        matches!(
            OrchestratorError::find(err),
            Some(OrchestratorError::Schema { .. })
        )
    }

    /// Verifies write → load preserves the tree and reports a stable revision.
    #[test]
    fn create_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TreeStore::new(temp.path().join("tree.json"));
        let revision = store.create(&default_tree()).expect("create");

        let snapshot = store.load().expect("load");
        assert_eq!(snapshot.tree, default_tree());
        assert_eq!(snapshot.revision, revision);
    }

    #[test]
    fn unknown_status_is_a_schema_error() {
        let err = parse_tree(br#"{"name":"root","children":[{"name":"a","status":"finished"}]}"#)
            .unwrap_err();
        assert!(schema_error(&err));
    }

    #[test]
    fn structural_errors_are_schema_errors() {
        let docs: [&[u8]; 4] = [
            br#"{"children":[]}"#,
            br#"{"name":"root","children":{"name":"a"}}"#,
            br#"{"name":"root","priority":1}"#,
            b"not json",
        ];
        for doc in docs {
            let err = parse_tree(doc).unwrap_err();
            assert!(schema_error(&err), "expected schema error for {doc:?}: {err:#}");
        }
    }

    #[test]
    fn invariant_violations_are_schema_errors() {
        let err = parse_tree(br#"{"name":"root","children":[{"name":"a"},{"name":"a"}]}"#)
            .unwrap_err();
        assert!(schema_error(&err));
        assert!(err.to_string().contains("duplicate child name"));
    }

    #[test]
    fn save_rejects_stale_revision() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TreeStore::new(temp.path().join("tree.json"));
        store
            .create(&branch("root", vec![pending("a")]))
            .expect("create");

        let first = store.load().expect("load");
        let second = store.load().expect("load");

        let mut tree = first.tree.clone();
        tree.children[0].status = Some(Status::Done);
        store.save(&tree, &first.revision).expect("first save wins");

        let err = store.save(&second.tree, &second.revision).unwrap_err();
        assert!(matches!(
            OrchestratorError::find(&err),
            Some(OrchestratorError::StaleTree { .. })
        ));
        let on_disk = store.load().expect("load");
        assert_eq!(on_disk.tree.children[0].status, Some(Status::Done));
    }

    #[test]
    fn update_applies_mutation_atomically() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TreeStore::new(temp.path().join("tree.json"));
        store
            .create(&branch("root", vec![pending("a")]))
            .expect("create");

        store
            .update(|tree| {
                tree.children.push(task("b", Status::Blocked));
                Ok(())
            })
            .expect("update");

        let tree = store.load().expect("load").tree;
        assert_eq!(tree.children.len(), 2);
        assert!(!temp.path().join("tree.json.tmp").exists());
    }

    #[test]
    fn update_does_not_write_when_mutation_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TreeStore::new(temp.path().join("tree.json"));
        let revision = store
            .create(&branch("root", vec![pending("a")]))
            .expect("create");

        let result: Result<()> = store.update(|tree| {
            tree.children.clear();
            Err(anyhow!("nope"))
        });
        assert!(result.is_err());
        assert_eq!(store.load().expect("load").revision, revision);
    }

    #[test]
    fn render_drops_branch_status() {
        let mut tree = branch("root", vec![task("a", Status::Done)]);
        tree.status = Some(Status::Pending);
        let text = render_tree(&tree).expect("render");
        assert!(text.ends_with("}\n"));
        let value: Value = serde_json::from_str(&text).expect("json");
        assert!(value.get("status").is_none());
    }

    #[test]
    fn render_refuses_invalid_tree() {
        let tree = branch("root", vec![pending("a"), pending("a")]);
        assert!(render_tree(&tree).is_err());
    }
}
