//! scribe-scheduler — job queue and adaptive worker pool.
//!
//! Accepts transcription jobs, keeps them in a FIFO queue and hands them to
//! a pool of execution slots bound to an `InferenceExecutor`.
//!
//! - `JobStore` owns job records and the pending queue
//! - `RetryPolicy` re-queues failed attempts at the head, up to a bound
//! - `WaitTimeEstimator` turns recent processing times into an expected wait
//! - `WorkerPool` owns the slots and resizes without touching busy ones
//! - `Scheduler` serializes all of the above on one task
//! - `RetentionTask` prunes old records from memory and the status store
//!
//! # Job Lifecycle
//!
//! ```text
//! submit ─▶ pending ─dispatch─▶ processing ─┬─▶ completed ─▶ StatusStore
//!              ▲                            │
//!              └──── retry (queue head) ────┤
//!                                           └─▶ failed (retries exhausted)
//! ```

pub mod error;
pub mod estimator;
pub mod job_store;
pub mod pool;
pub mod retention;
pub mod retry;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use estimator::WaitTimeEstimator;
pub use job_store::{FailureOutcome, JobStore};
pub use pool::{ScaleOutcome, SlotId, WorkerEvent, WorkerPool};
pub use retention::{RetentionTask, SweepReport};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{QueueStats, Scheduler, SchedulerHandle};
