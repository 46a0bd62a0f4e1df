//! Prompt sizing for a single task.
//!
//! `total = base_overhead + per_file_cost * files + per_tool_call_cost * tool_calls + buffer`
//! where `files` counts the union of `files` and `read_first`. Every term is
//! non-decreasing in the task's file and check counts, so adding a file never
//! lowers the estimate.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::tree::Node;

/// Estimator constants (the `[estimate]` config section).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EstimateConfig {
    pub base_overhead: u64,
    pub per_file_cost: u64,
    pub per_tool_call_cost: u64,
    pub buffer: u64,
    pub target_tokens: u64,
    pub base_tool_calls: u64,
    pub tool_calls_per_file: u64,
    pub tool_calls_per_check: u64,
    /// Below this share of `target_tokens` (percent) a task is low complexity.
    pub low_threshold_pct: u64,
    /// Above this share of `target_tokens` (percent) a task is high complexity.
    pub high_threshold_pct: u64,
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            base_overhead: 15_000,
            per_file_cost: 2_500,
            per_tool_call_cost: 500,
            buffer: 5_000,
            target_tokens: 100_000,
            base_tool_calls: 8,
            tool_calls_per_file: 2,
            tool_calls_per_check: 1,
            low_threshold_pct: 50,
            high_threshold_pct: 100,
        }
    }
}

impl EstimateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_tokens == 0 {
            return Err(anyhow!("estimate.target_tokens must be > 0"));
        }
        if self.low_threshold_pct > self.high_threshold_pct {
            return Err(anyhow!(
                "estimate.low_threshold_pct must not exceed estimate.high_threshold_pct"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Estimate {
    pub file_count: u64,
    pub tool_calls: u64,
    pub total: u64,
    pub target: u64,
    pub fits: bool,
    /// `total` as a whole percentage of `target`, rounded down.
    pub utilization: u64,
    pub complexity: Complexity,
}

/// Number of distinct entries across `files` and `read_first`.
pub fn file_count(task: &Node) -> u64 {
    let unique: BTreeSet<&str> = task
        .files
        .iter()
        .chain(&task.read_first)
        .map(String::as_str)
        .collect();
    unique.len() as u64
}

pub fn estimated_tool_calls(task: &Node, cfg: &EstimateConfig) -> u64 {
    cfg.base_tool_calls
        .saturating_add(cfg.tool_calls_per_file.saturating_mul(file_count(task)))
        .saturating_add(
            cfg.tool_calls_per_check
                .saturating_mul(task.acceptance.len() as u64),
        )
}

pub fn estimate(task: &Node, cfg: &EstimateConfig) -> Estimate {
    let files = file_count(task);
    let tool_calls = estimated_tool_calls(task, cfg);
    let total = cfg
        .base_overhead
        .saturating_add(cfg.per_file_cost.saturating_mul(files))
        .saturating_add(cfg.per_tool_call_cost.saturating_mul(tool_calls))
        .saturating_add(cfg.buffer);
    let target = cfg.target_tokens.max(1);
    Estimate {
        file_count: files,
        tool_calls,
        total,
        target,
        fits: total <= target,
        utilization: total.saturating_mul(100) / target,
        complexity: complexity_for(total, target, cfg),
    }
}

/// Bucket by ratio using cross-multiplication, so thresholds are exact.
fn complexity_for(total: u64, target: u64, cfg: &EstimateConfig) -> Complexity {
    let scaled = u128::from(total) * 100;
    let target = u128::from(target);
    if scaled < u128::from(cfg.low_threshold_pct) * target {
        Complexity::Low
    } else if scaled <= u128::from(cfg.high_threshold_pct) * target {
        Complexity::Medium
    } else {
        Complexity::High
    }
}
