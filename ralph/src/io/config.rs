//! Ralph configuration stored under `.ralph/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::estimate::EstimateConfig;

/// Ralph configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RalphConfig {
    pub agent: AgentConfig,
    pub healing: HealingConfig,
    pub validation: ValidationConfig,
    pub estimate: EstimateConfig,
    pub git: GitConfig,
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent command; the prompt is written to its stdin (e.g. `["claude","-p"]`).
    pub command: Vec<String>,
    /// Wall-clock budget for one agent invocation.
    pub timeout_secs: u64,
    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "-p".to_string()],
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealingConfig {
    /// Fix attempts allowed after the first run before giving up.
    pub max_attempts: u32,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Shell prefix used to run each acceptance command.
    pub shell: Vec<String>,
    /// Per-command timeout.
    pub timeout_secs: u64,
    /// Truncate captured command output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            shell: vec!["sh".to_string(), "-c".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl ValidationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    /// Branch workers start from and merge into; defaults to the checked-out branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_branch: Option<String>,
    /// Prefix for worker branch names.
    pub branch_prefix: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            integration_branch: None,
            branch_prefix: "ralph/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Include `.ralph/requirements.md` in task prompts.
    pub requirements: bool,
    /// Optional command receiving the task as JSON on stdin; its stdout becomes a prompt block.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            requirements: true,
            command: Vec::new(),
            timeout_secs: 30,
        }
    }
}

impl RalphConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.command.is_empty() || self.agent.command[0].trim().is_empty() {
            return Err(anyhow!("agent.command must be a non-empty array"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 {
            return Err(anyhow!("agent.output_limit_bytes must be > 0"));
        }
        if self.validation.shell.is_empty() || self.validation.shell[0].trim().is_empty() {
            return Err(anyhow!("validation.shell must be a non-empty array"));
        }
        if self.validation.timeout_secs == 0 {
            return Err(anyhow!("validation.timeout_secs must be > 0"));
        }
        if self.validation.output_limit_bytes == 0 {
            return Err(anyhow!("validation.output_limit_bytes must be > 0"));
        }
        if self.git.branch_prefix.contains(char::is_whitespace) {
            return Err(anyhow!("git.branch_prefix must not contain whitespace"));
        }
        if !self.enrichment.command.is_empty() && self.enrichment.timeout_secs == 0 {
            return Err(anyhow!("enrichment.timeout_secs must be > 0"));
        }
        self.estimate.validate()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RalphConfig::default()`.
pub fn load_config(path: &Path) -> Result<RalphConfig> {
    if !path.exists() {
        let cfg = RalphConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RalphConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RalphConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}
