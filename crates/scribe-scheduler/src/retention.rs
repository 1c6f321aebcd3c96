//! Periodic cleanup of finished jobs.
//!
//! Durable records older than `max_age` are pruned from the status store;
//! terminal jobs older than `memory_ttl` are dropped from the scheduler's
//! memory (completed ones stay reachable through the store).

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::scheduler::SchedulerHandle;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub pruned: u32,
    pub evicted: usize,
}

pub struct RetentionTask {
    scheduler: SchedulerHandle,
    max_age: Duration,
    memory_ttl: Duration,
}

impl RetentionTask {
    pub fn new(scheduler: SchedulerHandle, max_age: Duration, memory_ttl: Duration) -> Self {
        Self {
            scheduler,
            max_age,
            memory_ttl,
        }
    }

    /// Run one pass. Failures are logged and leave that half of the sweep at zero.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        match self.scheduler.store().prune(self.max_age) {
            Ok(pruned) => report.pruned = pruned,
            Err(e) => warn!(error = %e, "status store prune failed"),
        }
        match self.scheduler.evict_terminal(self.memory_ttl).await {
            Ok(evicted) => report.evicted = evicted,
            Err(e) => warn!(error = %e, "in-memory eviction failed"),
        }

        if report.pruned > 0 || report.evicted > 0 {
            info!(pruned = report.pruned, evicted = report.evicted, "retention sweep");
        } else {
            debug!("retention sweep found nothing to remove");
        }
        report
    }

    /// Sweep every `interval` until shutdown.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            max_age_secs = self.max_age.as_secs(),
            memory_ttl_secs = self.memory_ttl.as_secs(),
            "retention loop started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.sweep().await;
                }
                _ = shutdown.changed() => {
                    info!("retention loop shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use scribe_core::config::SchedulerConfig;
    use scribe_core::{JobStatus, TranscriptionOptions, TranscriptionRequest, TranscriptionResult, epoch_millis};
    use scribe_executor::{BoxFuture, ExecutionOutput, ExecutionResult, InferenceExecutor};
    use scribe_state::{CompletedJobRecord, StatusStore};

    use crate::scheduler::Scheduler;

    struct EchoExecutor;

    impl InferenceExecutor for EchoExecutor {
        fn name(&self) -> &str {
            "echo"
        }

        fn transcribe<'a>(
            &'a self,
            request: &'a TranscriptionRequest,
        ) -> BoxFuture<'a, ExecutionResult> {
            Box::pin(async move {
                Ok(ExecutionOutput {
                    result: TranscriptionResult::from_text(request.input.clone()),
                    processing_time: 0.1,
                })
            })
        }
    }

    fn old_record(id: &str, age: Duration) -> CompletedJobRecord {
        let completed_at = epoch_millis() - age.as_millis() as u64;
        CompletedJobRecord {
            id: id.to_string(),
            name: id.to_string(),
            input: format!("/audio/{id}.wav"),
            status: JobStatus::Completed,
            result: Some(TranscriptionResult::from_text(id)),
            error: None,
            created_at: completed_at - 1_000,
            started_at: Some(completed_at - 500),
            completed_at,
            retries: 0,
            processing_time: Some(0.5),
        }
    }

    #[tokio::test]
    async fn sweep_prunes_store_and_evicts_memory() {
        let store = StatusStore::open_in_memory().unwrap();
        store
            .append(&old_record("ancient", Duration::from_secs(30 * 24 * 3600)))
            .unwrap();
        store
            .append(&old_record("recent", Duration::from_secs(60)))
            .unwrap();

        let (handle, _task) =
            Scheduler::spawn(&SchedulerConfig::default(), Arc::new(EchoExecutor), store, 1);
        let id = handle
            .submit("/audio/live.wav", "live", TranscriptionOptions::default())
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.status(&id).await.unwrap().status != JobStatus::Completed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let task = RetentionTask::new(handle.clone(), Duration::from_secs(7 * 24 * 3600), Duration::ZERO);
        let report = task.sweep().await;
        assert_eq!(report, SweepReport { pruned: 1, evicted: 1 });

        let remaining: Vec<String> = handle
            .completed_jobs()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&"recent".to_string()));
        assert!(remaining.contains(&id));

        // Evicted from memory, still answered from the store.
        assert_eq!(handle.status(&id).await.unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let store = StatusStore::open_in_memory().unwrap();
        let (handle, _task) =
            Scheduler::spawn(&SchedulerConfig::default(), Arc::new(EchoExecutor), store, 1);
        let (tx, rx) = watch::channel(false);

        let task = RetentionTask::new(handle, Duration::from_secs(3600), Duration::from_secs(3600));
        let join = tokio::spawn(task.run(Duration::from_millis(10), rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), join)
            .await
            .unwrap()
            .unwrap();
    }
}
