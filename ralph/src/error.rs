//! Typed failure taxonomy for orchestration commands.
//!
//! Operations return `anyhow::Result`; these variants travel inside the
//! error chain so callers (and the CLI exit code mapping) can classify a
//! failure without string matching.

use thiserror::Error;

use crate::exit_codes;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("schema error: {message}")]
    Schema { message: String },

    #[error("validation failed for '{task}':\n{summary}")]
    ValidationFailure { task: String, summary: String },

    #[error("agent run failed for '{task}': {detail}")]
    RunnerFailure { task: String, detail: String },

    #[error("merge of '{branch}' halted: {detail}")]
    MergeConflict { branch: String, detail: String },

    #[error("'{task}' still failing after {attempts} fix attempts:\n{last_failure}")]
    RetryExhausted {
        task: String,
        attempts: u32,
        last_failure: String,
    },

    #[error("tree changed on disk since it was loaded (expected revision {expected}, found {found})")]
    StaleTree { expected: String, found: String },

    #[error("worker {id} is already assigned")]
    WorkerConflict { id: u32 },
}

impl OrchestratorError {
    /// Find the first typed error in an `anyhow` chain.
    pub fn find(err: &anyhow::Error) -> Option<&OrchestratorError> {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<OrchestratorError>())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            OrchestratorError::ValidationFailure { .. } => exit_codes::VALIDATION_FAILED,
            OrchestratorError::RetryExhausted { .. } | OrchestratorError::RunnerFailure { .. } => {
                exit_codes::EXHAUSTED
            }
            OrchestratorError::MergeConflict { .. } => exit_codes::MERGE_CONFLICT,
            OrchestratorError::NotFound { .. }
            | OrchestratorError::Schema { .. }
            | OrchestratorError::StaleTree { .. }
            | OrchestratorError::WorkerConflict { .. } => exit_codes::INVALID,
        }
    }
}

/// Exit code for any command error.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    OrchestratorError::find(err)
        .map(OrchestratorError::exit_code)
        .unwrap_or(exit_codes::INVALID)
}
