//! Scheduler error types.

use thiserror::Error;

/// Errors surfaced to scheduler callers.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("scheduler has stopped")]
    Stopped,

    #[error("status store error: {0}")]
    State(#[from] scribe_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
