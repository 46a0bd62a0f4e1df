//! Worker pool storage (`.ralph/workers.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::pool::WorkerPool;

/// Load the worker pool; a missing file is an empty pool.
pub fn load_pool(path: &Path) -> Result<WorkerPool> {
    if !path.exists() {
        debug!(path = %path.display(), "no workers file, empty pool");
        return Ok(WorkerPool::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read workers {}", path.display()))?;
    let pool: WorkerPool = serde_json::from_str(&contents)
        .with_context(|| format!("parse workers {}", path.display()))?;
    debug!(workers = pool.workers.len(), "worker pool loaded");
    Ok(pool)
}

/// Atomically write the worker pool (temp file + rename).
pub fn write_pool(path: &Path, pool: &WorkerPool) -> Result<()> {
    debug!(path = %path.display(), workers = pool.workers.len(), "writing worker pool");
    let mut buf = serde_json::to_string_pretty(pool)?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{MergeRecord, Worker, WorkerStatus};
    use std::path::PathBuf;

    #[test]
    fn missing_file_is_empty_pool() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pool = load_pool(&temp.path().join("workers.json")).expect("load");
        assert!(pool.is_empty());
    }

    /// Verifies write → read preserves all worker fields.
    #[test]
    fn pool_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("workers.json");
        let pool = WorkerPool {
            workers: vec![Worker {
                id: 1,
                branch: "ralph/login".to_string(),
                task: "Login".to_string(),
                path: "Project/Auth/Login".parse().expect("path"),
                workdir: PathBuf::from(".ralph/worktrees/ralph-login"),
                status: WorkerStatus::Done,
                attempts: Some(2),
                merge: Some(MergeRecord::Conflict {
                    detail: "README.md".to_string(),
                }),
                note: None,
            }],
        };

        write_pool(&path, &pool).expect("write");
        assert_eq!(load_pool(&path).expect("load"), pool);
        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"path\": \"Project/Auth/Login\""));
        assert!(raw.contains("\"status\": \"done\""));
    }
}
