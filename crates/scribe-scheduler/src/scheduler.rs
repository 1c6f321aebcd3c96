//! Scheduler — the single loop that owns jobs and worker slots.
//!
//! Every mutation happens on one task, in response to one of two channels:
//! commands from `SchedulerHandle`s and `WorkerEvent`s from slot tasks.
//! After each message the loop runs `dispatch`, which pairs queue heads with
//! idle slots until one side runs out.
//!
//! ```text
//! SchedulerHandle ──Command──┐
//!                            ▼
//!                  Scheduler::run ──dispatch──▶ WorkerPool slots
//!                            ▲                        │
//!                            └────── WorkerEvent ─────┘
//!                            │
//!                            └──append──▶ StatusStore (completed jobs)
//! ```

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scribe_core::config::SchedulerConfig;
use scribe_core::{
    Job, JobId, JobStatus, JobStatusReport, TranscriptionOptions, epoch_millis, new_job_id,
};
use scribe_executor::InferenceExecutor;
use scribe_state::{CompletedJobRecord, StatusStore};

use crate::error::{SchedulerError, SchedulerResult};
use crate::estimator::WaitTimeEstimator;
use crate::job_store::{FailureOutcome, JobStore};
use crate::pool::{WorkerEvent, WorkerPool};

/// Queue depth, pool occupancy and expected wait.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStats {
    pub pending_jobs: usize,
    pub active_jobs: usize,
    pub total_workers: u32,
    pub available_workers: u32,
    /// Seconds.
    pub average_processing_time: f64,
    /// Seconds.
    pub estimated_wait_time: f64,
}

enum Command {
    Submit(Job),
    Status {
        id: JobId,
        reply: oneshot::Sender<Option<JobStatusReport>>,
    },
    QueueStats {
        reply: oneshot::Sender<QueueStats>,
    },
    ScaleTo(u32),
    Evict {
        cutoff_ms: u64,
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable entry point to a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    store: StatusStore,
    max_retries: u32,
}

impl SchedulerHandle {
    fn send(&self, command: Command) -> SchedulerResult<()> {
        self.commands
            .send(command)
            .map_err(|_| SchedulerError::Stopped)
    }

    /// Queue a job and return its id without waiting for dispatch.
    pub fn submit(
        &self,
        input: impl Into<String>,
        name: impl Into<String>,
        options: TranscriptionOptions,
    ) -> SchedulerResult<JobId> {
        let id = new_job_id();
        let job = Job::new(
            id.clone(),
            input,
            name,
            options,
            self.max_retries,
            epoch_millis(),
        );
        self.send(Command::Submit(job))?;
        debug!(job_id = %id, "job submitted");
        Ok(id)
    }

    /// In-memory status, falling back to the status store.
    pub async fn status(&self, id: &str) -> SchedulerResult<JobStatusReport> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status {
            id: id.to_string(),
            reply,
        })?;
        if let Some(report) = rx.await.map_err(|_| SchedulerError::Stopped)? {
            return Ok(report);
        }

        match self.store.lookup(id) {
            Ok(Some(record)) => Ok(record.report()),
            Ok(None) => Err(SchedulerError::JobNotFound(id.to_string())),
            Err(e) => {
                warn!(job_id = %id, error = %e, "status store lookup failed");
                Err(SchedulerError::JobNotFound(id.to_string()))
            }
        }
    }

    pub async fn queue_stats(&self) -> SchedulerResult<QueueStats> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::QueueStats { reply })?;
        rx.await.map_err(|_| SchedulerError::Stopped)
    }

    /// Set the target pool size. Busy slots above the target are removed
    /// once their jobs finish.
    pub fn scale_to(&self, target: u32) -> SchedulerResult<()> {
        self.send(Command::ScaleTo(target))
    }

    /// Drop completed and failed jobs older than `max_age` from memory.
    pub async fn evict_terminal(&self, max_age: Duration) -> SchedulerResult<usize> {
        let cutoff_ms = epoch_millis().saturating_sub(max_age.as_millis() as u64);
        let (reply, rx) = oneshot::channel();
        self.send(Command::Evict { cutoff_ms, reply })?;
        rx.await.map_err(|_| SchedulerError::Stopped)
    }

    /// Completed jobs from the status store.
    pub fn completed_jobs(&self) -> SchedulerResult<Vec<CompletedJobRecord>> {
        Ok(self.store.list_completed()?)
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Terminate all slots and drop in-memory state.
    pub async fn shutdown(&self) -> SchedulerResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        rx.await.map_err(|_| SchedulerError::Stopped)
    }
}

/// Owns the job store, the worker pool and the wait estimator.
pub struct Scheduler {
    jobs: JobStore,
    pool: WorkerPool,
    estimator: WaitTimeEstimator,
    store: StatusStore,
    target_workers: u32,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl Scheduler {
    /// Start the scheduler loop with `initial_workers` idle slots.
    pub fn spawn(
        config: &SchedulerConfig,
        executor: Arc<dyn InferenceExecutor>,
        store: StatusStore,
        initial_workers: u32,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut pool = WorkerPool::new(executor, event_tx);
        pool.scale_to(initial_workers);

        let scheduler = Self {
            jobs: JobStore::new(),
            pool,
            estimator: WaitTimeEstimator::new(
                config.estimator_window,
                config.default_processing_time_secs,
            ),
            store: store.clone(),
            target_workers: initial_workers,
            commands: command_rx,
            events: event_rx,
        };
        let handle = SchedulerHandle {
            commands: command_tx,
            store,
            max_retries: config.max_retries,
        };
        (handle, tokio::spawn(scheduler.run()))
    }

    async fn run(mut self) {
        info!(workers = self.pool.total(), "scheduler started");
        loop {
            let flow = tokio::select! {
                biased;
                Some(event) = self.events.recv() => {
                    self.on_worker_event(event);
                    ControlFlow::Continue(())
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        self.shutdown();
                        ControlFlow::Break(())
                    }
                },
            };
            if flow.is_break() {
                break;
            }
            self.dispatch();
        }
        info!("scheduler stopped");
    }

    fn on_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Submit(job) => self.jobs.submit(job),
            Command::Status { id, reply } => {
                let _ = reply.send(self.jobs.get(&id).map(Job::report));
            }
            Command::QueueStats { reply } => {
                let _ = reply.send(self.queue_stats());
            }
            Command::ScaleTo(target) => {
                if target != self.target_workers {
                    debug!(from = self.target_workers, to = target, "worker target changed");
                }
                self.target_workers = target;
                self.pool.scale_to(target);
            }
            Command::Evict { cutoff_ms, reply } => {
                let evicted = self.jobs.evict_terminal(cutoff_ms);
                if evicted > 0 {
                    info!(evicted, remaining = self.jobs.len(), "terminal jobs evicted");
                }
                let _ = reply.send(evicted);
            }
            Command::Shutdown { reply } => {
                self.commands.close();
                self.shutdown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn on_worker_event(&mut self, event: WorkerEvent) {
        let now = epoch_millis();
        match event {
            WorkerEvent::Complete {
                slot,
                job_id,
                output,
            } => {
                self.pool.release(slot, &job_id);
                let processing_time = output.processing_time;
                if let Some(job) = self.jobs.complete(&job_id, output.result, processing_time, now)
                {
                    info!(%job_id, slot, processing_time, retries = job.retries, "job completed");
                    let record = CompletedJobRecord::from_job(job, now);
                    self.estimator.record(processing_time);
                    self.persist(&record);
                }
            }
            WorkerEvent::Failure {
                slot,
                job_id,
                error,
            } => {
                self.pool.release(slot, &job_id);
                self.record_failure(&job_id, error, now);
            }
            WorkerEvent::Crash {
                slot,
                job_id,
                reason,
            } => {
                warn!(slot, %job_id, %reason, "worker crashed");
                self.pool.respawn(slot);
                self.record_failure(&job_id, format!("worker crashed: {reason}"), now);
            }
        }

        // Surplus slots kept busy by an earlier scale-down can go now.
        if self.pool.total() > self.target_workers {
            self.pool.scale_to(self.target_workers);
        }
    }

    fn record_failure(&mut self, job_id: &str, error: String, now: u64) {
        match self.jobs.fail(job_id, error.clone(), now) {
            Some(FailureOutcome::Requeued { retries }) => {
                warn!(%job_id, retries, %error, "job attempt failed, requeued at head");
            }
            Some(FailureOutcome::Failed { retries }) => {
                warn!(%job_id, retries, %error, "job failed terminally");
            }
            None => {}
        }
    }

    fn persist(&self, record: &CompletedJobRecord) {
        match self.store.append(record) {
            Ok(_) => debug!(job_id = %record.id, "completed job persisted"),
            Err(e) => warn!(job_id = %record.id, error = %e, "failed to persist completed job"),
        }
    }

    fn dispatch(&mut self) {
        let now = epoch_millis();
        while let Some(slot) = self.pool.idle_slot() {
            let Some(job_id) = self.jobs.pop_next() else {
                break;
            };
            let Some(request) = self.jobs.start(&job_id, now) else {
                continue;
            };
            match self.pool.assign(slot, request) {
                Ok(()) => debug!(%job_id, slot, "job dispatched"),
                Err(_) => {
                    warn!(%job_id, slot, "slot refused job, respawning");
                    self.jobs.unassign(&job_id);
                    self.pool.respawn(slot);
                }
            }
        }
    }

    fn queue_stats(&self) -> QueueStats {
        QueueStats {
            pending_jobs: self.jobs.count(JobStatus::Pending),
            active_jobs: self.jobs.count(JobStatus::Processing),
            total_workers: self.pool.total(),
            available_workers: self.pool.available(),
            average_processing_time: self.estimator.average(),
            estimated_wait_time: self
                .estimator
                .estimate(self.jobs.queue_len(), self.pool.total()),
        }
    }

    fn shutdown(&mut self) {
        self.pool.shutdown();
        let dropped = self.jobs.len();
        self.jobs.clear();
        info!(dropped_jobs = dropped, "scheduler shut down");
    }
}
