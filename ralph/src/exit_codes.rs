//! Stable exit codes for ralph CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid tree/config/arguments, or any unclassified error.
pub const INVALID: i32 = 1;
/// Nothing to do: no eligible task, or no worker ready.
pub const COMPLETE: i32 = 2;
/// Acceptance or slice validation failed.
pub const VALIDATION_FAILED: i32 = 3;
/// The healing loop ran out of fix attempts.
pub const EXHAUSTED: i32 = 4;
/// A merge conflicted or failed its post-merge validation.
pub const MERGE_CONFLICT: i32 = 5;
