//! Executor error types.

use thiserror::Error;

/// Why a job did not produce a transcription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The backend ran and reported an error.
    #[error("{0}")]
    Failed(String),

    /// The execution unit died without reporting a result or an error.
    #[error("executor crashed: {0}")]
    Crashed(String),
}

impl ExecutionError {
    pub fn is_crash(&self) -> bool {
        matches!(self, ExecutionError::Crashed(_))
    }
}
