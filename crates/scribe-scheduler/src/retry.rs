//! Bounded retry with immediate re-queue.

/// What to do with a job whose attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Back to pending, at the head of the queue.
    Requeue,
    /// Terminal failure.
    GiveUp,
}

/// Retry bound for one job. There is no delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl RetryPolicy {
    /// Allow up to `max_retries` failed attempts before giving up.
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Configured failure limit.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide after the retry counter has been incremented for this failure.
    pub fn decide(&self, retries: u32) -> RetryDecision {
        if retries < self.max_retries {
            RetryDecision::Requeue
        } else {
            RetryDecision::GiveUp
        }
    }
}
