//! Plain-text rendering of command results for stdout.

use std::fmt::Write;

use crate::core::estimate::Estimate;
use crate::core::path::TaskPath;
use crate::core::types::ValidationReport;
use crate::merge::MergeSummary;
use crate::orchestrator::{DoneAllReport, StatusReport, WorkerResult, WorkerRun};
use crate::pool::WorkerPool;
use crate::tree::Node;

pub fn status(report: &StatusReport) -> String {
    let mut out = String::new();
    let p = &report.progress;
    let _ = writeln!(
        out,
        "{}/{} tasks done ({}%), {} in progress, {} pending, {} blocked",
        p.done,
        p.total(),
        p.percent_done(),
        p.in_progress,
        p.pending,
        p.blocked
    );
    out.push('\n');
    tree_lines(&report.tree, 0, &mut out);
    if !report.workers.is_empty() {
        out.push('\n');
        out.push_str(&workers(&report.workers));
    }
    out
}

fn tree_lines(node: &Node, depth: usize, out: &mut String) {
    let mut tags = Vec::new();
    if node.slice {
        tags.push("slice".to_string());
    }
    if let Some(order) = node.order {
        tags.push(format!("order {order}"));
    }
    if !node.dependencies.is_empty() {
        tags.push(format!("after {}", node.dependencies.join(", ")));
    }
    let tags = if tags.is_empty() {
        String::new()
    } else {
        format!(" ({})", tags.join("; "))
    };
    let _ = writeln!(
        out,
        "{}{}{} [{}]",
        "  ".repeat(depth),
        node.name,
        tags,
        node.derived_status()
    );
    for child in &node.children {
        tree_lines(child, depth + 1, out);
    }
}

pub fn workers(pool: &WorkerPool) -> String {
    if pool.is_empty() {
        return "no workers\n".to_string();
    }
    let mut out = String::from("workers:\n");
    for worker in &pool.workers {
        let _ = write!(
            out,
            "  {:>3}  {:<12} {:<30} {}",
            worker.id,
            worker.status.to_string(),
            worker.branch,
            worker.path
        );
        if let Some(attempts) = worker.attempts {
            let _ = write!(out, "  attempts={attempts}");
        }
        if let Some(merge) = &worker.merge {
            let _ = write!(out, "  [{}]", first_line(&merge.describe()));
        }
        out.push('\n');
    }
    out
}

pub fn estimates(rows: &[(TaskPath, String, Estimate)]) -> String {
    let mut out = format!(
        "{:<40} {:>5} {:>5} {:>8} {:>5} {:<10} {}\n",
        "TASK", "FILES", "TOOLS", "TOKENS", "UTIL", "COMPLEXITY", "FITS"
    );
    for (_, name, est) in rows {
        let _ = writeln!(
            out,
            "{:<40} {:>5} {:>5} {:>8} {:>4}% {:<10} {}",
            truncate(name, 40),
            est.file_count,
            est.tool_calls,
            est.total,
            est.utilization,
            est.complexity.to_string(),
            if est.fits { "yes" } else { "no" }
        );
    }
    out
}

pub fn validation(label: &str, report: &ValidationReport) -> String {
    let mut out = format!(
        "validation {} for {label}\n",
        if report.success { "passed" } else { "failed" }
    );
    if report.results.is_empty() {
        out.push_str("  (no commands)\n");
    }
    for result in &report.results {
        let mark = if result.success { "ok  " } else { "FAIL" };
        let _ = writeln!(out, "  {mark} [{}] {}", result.return_code, result.command);
    }
    if !report.success {
        out.push('\n');
        out.push_str(&report.failure_summary());
        out.push('\n');
    }
    out
}

pub fn merge(summary: &MergeSummary, pool: &WorkerPool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "merged: {}", ids(&summary.merged));
    if let Some(id) = summary.blocked {
        let detail = pool
            .get(id)
            .and_then(|w| w.merge.as_ref())
            .map(|m| m.describe())
            .unwrap_or_default();
        let _ = writeln!(out, "blocked: worker {id}: {detail}");
    }
    if !summary.unmerged.is_empty() {
        let _ = writeln!(out, "unmerged: {}", ids(&summary.unmerged));
    }
    if !summary.not_ready.is_empty() {
        let _ = writeln!(out, "not ready: {}", ids(&summary.not_ready));
    }
    out
}

pub fn runs(runs: &[WorkerRun]) -> String {
    let mut out = String::new();
    for run in runs {
        let result = match &run.result {
            WorkerResult::Passed { attempts } => format!("done after {attempts} fix attempts"),
            WorkerResult::Exhausted { attempts, detail } => {
                format!("exhausted after {attempts} fix attempts: {}", first_line(detail))
            }
            WorkerResult::Cancelled => "cancelled".to_string(),
            WorkerResult::Error(detail) => format!("error: {}", first_line(detail)),
        };
        let _ = writeln!(out, "worker {} ({}) {}: {result}", run.id, run.branch, run.path);
    }
    out
}

pub fn done_all(report: &DoneAllReport) -> String {
    let mut out = String::new();
    for (id, path) in &report.shipped {
        let _ = writeln!(out, "shipped worker {id}: {path}");
    }
    for (id, path, detail) in &report.left {
        let _ = writeln!(out, "left pending worker {id}: {path} ({})", first_line(detail));
    }
    out
}

fn ids(ids: &[u32]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::progress;
    use crate::core::types::CommandResult;
    use crate::test_support::{branch, pending, slice, task};
    use crate::tree::Status;

    #[test]
    fn status_shows_counts_and_derived_statuses() {
        let tree = branch(
            "Project",
            vec![
                slice("Core", &[], vec![task("A", Status::Done), pending("B")]),
                task("Docs", Status::Done),
            ],
        );
        let text = status(&StatusReport {
            progress: progress(&tree),
            tree,
            workers: WorkerPool::default(),
        });
        assert!(text.starts_with("2/3 tasks done (66%)"));
        assert!(text.contains("\n  Core (slice) [pending]\n"));
        assert!(text.contains("\n    A [done]\n"));
        assert!(!text.contains("workers:"));
    }

    #[test]
    fn validation_lists_commands_and_failures() {
        let report = ValidationReport::from_results(vec![
            CommandResult::from_exit("true", 0, String::new(), String::new()),
            CommandResult::from_exit("cargo test", 101, String::new(), "boom".to_string()),
        ]);
        let text = validation("Project/A", &report);
        assert!(text.starts_with("validation failed for Project/A"));
        assert!(text.contains("ok   [0] true"));
        assert!(text.contains("FAIL [101] cargo test"));
        assert!(text.contains("STDERR:\nboom"));
    }

    #[test]
    fn merge_summary_names_blocked_worker() {
        let summary = MergeSummary {
            merged: vec![1],
            blocked: Some(2),
            unmerged: vec![3],
            not_ready: Vec::new(),
        };
        let text = merge(&summary, &WorkerPool::default());
        assert!(text.contains("merged: 1"));
        assert!(text.contains("blocked: worker 2"));
        assert!(text.contains("unmerged: 3"));
    }
}
