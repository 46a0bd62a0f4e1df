//! Task-tree orchestration engine for autonomous coding agents.
//!
//! A persistent plan (`.ralph/tree.json`) is worked through one task at a
//! time or by a pool of parallel workers. Each task runs in its own branch
//! checkout, is validated by its acceptance commands, retried with fix prompts
//! up to a bound, and merged back sequentially. The architecture enforces a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (paths, selection, estimates,
//!   invariants, state updates). No I/O.
//! - **[`io`]**: Side-effecting adapters (filesystem, git, processes, prompts).
//!   Collaborators sit behind traits so tests substitute doubles.
//!
//! Orchestration modules ([`runner`], [`validate`], [`healing`], [`merge`],
//! [`orchestrator`]) compose core logic with I/O to implement CLI commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod healing;
pub mod io;
pub mod logging;
pub mod merge;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod runner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tree;
pub mod validate;
