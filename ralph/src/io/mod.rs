//! I/O helpers for ralph commands.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod acceptance;
pub mod agent;
pub mod attempt_log;
pub mod config;
pub mod context;
pub mod git;
pub mod init;
pub mod process;
pub mod prompt;
pub mod tree_store;
pub mod vcs;
pub mod workers;

/// Write `contents` to a sibling temp file, then rename over `path`.
///
/// Readers never observe a partially written file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
