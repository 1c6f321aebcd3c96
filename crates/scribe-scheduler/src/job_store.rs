//! JobStore — in-memory job records and the FIFO pending queue.
//!
//! Every lifecycle edge goes through `Job::transition`, so a record can only
//! follow `pending → processing → {completed | pending | failed}`. Events for
//! a job that is no longer processing are ignored.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use scribe_core::{Job, JobId, JobStatus, TranscriptionRequest, TranscriptionResult};

use crate::retry::{RetryDecision, RetryPolicy};

/// Result of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back at the head of the queue.
    Requeued { retries: u32 },
    /// Terminal.
    Failed { retries: u32 },
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: HashMap<JobId, Job>,
    /// Ids of pending jobs in dispatch order.
    queue: VecDeque<JobId>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a pending job at the tail of the queue.
    pub fn submit(&mut self, job: Job) {
        debug_assert_eq!(job.status, JobStatus::Pending);
        let id = job.id.clone();
        if self.jobs.insert(id.clone(), job).is_some() {
            warn!(job_id = %id, "duplicate job id submitted, replacing record");
            self.queue.retain(|queued| queued != &id);
        }
        self.queue.push_back(id);
    }

    /// Pop the queue head, skipping ids that are no longer pending.
    pub fn pop_next(&mut self) -> Option<JobId> {
        while let Some(id) = self.queue.pop_front() {
            if self.get(&id).is_some_and(|j| j.status == JobStatus::Pending) {
                return Some(id);
            }
        }
        None
    }

    /// Move a popped job to processing and build its request.
    pub fn start(&mut self, id: &str, now: u64) -> Option<TranscriptionRequest> {
        let job = self.jobs.get_mut(id)?;
        if let Err(e) = job.transition(JobStatus::Processing) {
            warn!(error = %e, "refusing to start job");
            return None;
        }
        job.started_at = Some(now);
        debug!(job_id = %id, retries = job.retries, "job processing");
        Some(job.request())
    }

    /// Undo `start` for a job whose slot could not take it.
    ///
    /// The retry counter is untouched since no attempt ran.
    pub fn unassign(&mut self, id: &str) {
        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        if job.transition(JobStatus::Pending).is_ok() {
            job.started_at = None;
            self.queue.push_front(id.to_string());
        }
    }

    /// Record a successful attempt.
    pub fn complete(
        &mut self,
        id: &str,
        result: TranscriptionResult,
        processing_time: f64,
        now: u64,
    ) -> Option<&Job> {
        let job = self.jobs.get_mut(id)?;
        if let Err(e) = job.transition(JobStatus::Completed) {
            warn!(error = %e, "ignoring completion");
            return None;
        }
        job.result = Some(result);
        job.error = None;
        job.completed_at = Some(now);
        job.processing_time = Some(processing_time);
        Some(&*job)
    }

    /// Record a failed attempt, requeueing at the head while retries remain.
    pub fn fail(&mut self, id: &str, error: String, now: u64) -> Option<FailureOutcome> {
        let job = self.jobs.get_mut(id)?;
        if job.status != JobStatus::Processing {
            warn!(job_id = %id, status = %job.status, "ignoring failure for job not in flight");
            return None;
        }

        job.retries += 1;
        let retries = job.retries;
        match RetryPolicy::new(job.max_retries).decide(retries) {
            RetryDecision::Requeue => {
                job.transition(JobStatus::Pending).ok()?;
                job.started_at = None;
                self.queue.push_front(id.to_string());
                Some(FailureOutcome::Requeued { retries })
            }
            RetryDecision::GiveUp => {
                job.transition(JobStatus::Failed).ok()?;
                job.error = Some(error);
                job.completed_at = Some(now);
                Some(FailureOutcome::Failed { retries })
            }
        }
    }

    /// Look up a job still held in memory.
    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Jobs held in memory, in any status.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of queued ids awaiting dispatch.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Jobs currently in `status`.
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|j| j.status == status).count()
    }

    /// Drop terminal jobs that finished before `cutoff_ms`.
    pub fn evict_terminal(&mut self, cutoff_ms: u64) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.completed_at.is_some_and(|t| t < cutoff_ms))
        });
        before - self.jobs.len()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::TranscriptionOptions;

    fn job(id: &str, max_retries: u32) -> Job {
        Job::new(
            id.to_string(),
            format!("/audio/{id}.wav"),
            id,
            TranscriptionOptions::default(),
            max_retries,
            1_000,
        )
    }

    fn store_with(ids: &[&str]) -> JobStore {
        let mut store = JobStore::new();
        for id in ids {
            store.submit(job(id, 3));
        }
        store
    }

    #[test]
    fn dispatch_order_is_fifo() {
        let mut store = store_with(&["a", "b", "c"]);
        assert_eq!(store.pop_next().as_deref(), Some("a"));
        assert_eq!(store.pop_next().as_deref(), Some("b"));
        assert_eq!(store.pop_next().as_deref(), Some("c"));
        assert_eq!(store.pop_next(), None);
    }

    #[test]
    fn start_stamps_and_builds_request() {
        let mut store = store_with(&["a"]);
        let id = store.pop_next().unwrap();
        let request = store.start(&id, 2_000).unwrap();
        assert_eq!(request.input, "/audio/a.wav");

        let job = store.get("a").unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.started_at, Some(2_000));
        assert_eq!(store.count(JobStatus::Pending), 0);
    }

    #[test]
    fn failed_attempt_requeues_at_head() {
        let mut store = store_with(&["a", "b"]);
        let id = store.pop_next().unwrap();
        store.start(&id, 2_000);

        let outcome = store.fail(&id, "boom".to_string(), 3_000);
        assert_eq!(outcome, Some(FailureOutcome::Requeued { retries: 1 }));

        let job = store.get("a").unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.started_at, None);
        assert_eq!(job.error, None);
        assert_eq!(store.pop_next().as_deref(), Some("a"));
        assert_eq!(store.pop_next().as_deref(), Some("b"));
    }

    #[test]
    fn retries_never_exceed_bound() {
        let mut store = JobStore::new();
        store.submit(job("a", 3));

        let mut outcomes = Vec::new();
        while let Some(id) = store.pop_next() {
            store.start(&id, 2_000);
            outcomes.push(store.fail(&id, "still broken".to_string(), 3_000).unwrap());
        }

        assert_eq!(
            outcomes,
            vec![
                FailureOutcome::Requeued { retries: 1 },
                FailureOutcome::Requeued { retries: 2 },
                FailureOutcome::Failed { retries: 3 },
            ]
        );
        let job = store.get("a").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retries, 3);
        assert_eq!(job.error.as_deref(), Some("still broken"));
        assert_eq!(job.completed_at, Some(3_000));
    }

    #[test]
    fn terminal_jobs_ignore_further_events() {
        let mut store = store_with(&["a"]);
        let id = store.pop_next().unwrap();
        store.start(&id, 2_000);
        store
            .complete(&id, TranscriptionResult::from_text("hello"), 1.5, 3_000)
            .unwrap();

        assert!(store.fail(&id, "late".to_string(), 4_000).is_none());
        assert!(
            store
                .complete(&id, TranscriptionResult::from_text("again"), 9.0, 5_000)
                .is_none()
        );
        assert!(store.start(&id, 6_000).is_none());

        let job = store.get("a").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.as_ref().unwrap().text, "hello");
        assert_eq!(job.processing_time, Some(1.5));
        assert_eq!(job.completed_at, Some(3_000));
    }

    #[test]
    fn unassign_restores_pending_without_retry() {
        let mut store = store_with(&["a", "b"]);
        let id = store.pop_next().unwrap();
        store.start(&id, 2_000);
        store.unassign(&id);

        let job = store.get("a").unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retries, 0);
        assert_eq!(store.pop_next().as_deref(), Some("a"));
    }

    #[test]
    fn pending_count_matches_queue() {
        let mut store = store_with(&["a", "b", "c"]);
        let id = store.pop_next().unwrap();
        store.start(&id, 2_000);
        assert_eq!(store.count(JobStatus::Pending), store.queue_len());
        assert_eq!(store.count(JobStatus::Processing), 1);
    }

    #[test]
    fn eviction_only_drops_old_terminal_jobs() {
        let mut store = store_with(&["old", "new", "waiting"]);
        for (id, at) in [("old", 5_000), ("new", 50_000)] {
            let popped = store.pop_next().unwrap();
            assert_eq!(popped, id);
            store.start(id, at - 1);
            store.complete(id, TranscriptionResult::from_text(id), 1.0, at);
        }

        assert_eq!(store.evict_terminal(10_000), 1);
        assert!(store.get("old").is_none());
        assert!(store.get("new").is_some());
        assert!(store.get("waiting").is_some());
    }
}
