//! WorkerPool — execution slots bound to an inference executor.
//!
//! Each slot is a tokio task holding one `InferenceExecutor` call at a time.
//! The pool is owned by the scheduler loop, so slot bookkeeping is only ever
//! touched from one place. A slot's `busy` field is the single source of
//! truth for assignment and scale-down.
//!
//! ```text
//! scheduler ──assign──▶ slot task ──spawn──▶ executor.transcribe()
//!     ▲                    │
//!     └──── WorkerEvent ───┘  Complete | Failure | Crash
//! ```
//!
//! A crash (executor reported `Crashed`, or the call panicked) ends the slot
//! task. The scheduler then calls `respawn`, which starts a fresh task under
//! the same slot id.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use scribe_core::{JobId, TranscriptionRequest};
use scribe_executor::{ExecutionError, ExecutionOutput, InferenceExecutor};

pub type SlotId = u64;

/// Message from a slot task back to the scheduler.
#[derive(Debug)]
pub enum WorkerEvent {
    Complete {
        slot: SlotId,
        job_id: JobId,
        output: ExecutionOutput,
    },
    Failure {
        slot: SlotId,
        job_id: JobId,
        error: String,
    },
    /// The slot task has exited; the slot must be respawned.
    Crash {
        slot: SlotId,
        job_id: JobId,
        reason: String,
    },
}

struct WorkerSlot {
    /// Job in flight, if any.
    busy: Option<JobId>,
    tx: mpsc::Sender<TranscriptionRequest>,
    handle: JoinHandle<()>,
}

/// Result of a `scale_to` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaleOutcome {
    /// New idle slots started.
    pub created: u32,
    /// Idle slots stopped.
    pub removed: u32,
    /// Slots above target that stayed because they are busy.
    pub deferred: u32,
}

pub struct WorkerPool {
    executor: Arc<dyn InferenceExecutor>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    slots: BTreeMap<SlotId, WorkerSlot>,
    next_id: SlotId,
}

impl WorkerPool {
    /// Create an empty pool. Must be called inside a tokio runtime.
    pub fn new(
        executor: Arc<dyn InferenceExecutor>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        Self {
            executor,
            events,
            slots: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Add one idle slot.
    pub fn create_slot(&mut self) -> SlotId {
        let id = self.next_id;
        self.next_id += 1;
        let slot = self.start_slot(id);
        self.slots.insert(id, slot);
        debug!(slot = id, backend = self.executor.name(), "worker slot created");
        id
    }

    fn start_slot(&self, id: SlotId) -> WorkerSlot {
        // Capacity 1: a slot never holds more than one job.
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(slot_loop(
            id,
            Arc::clone(&self.executor),
            rx,
            self.events.clone(),
        ));
        WorkerSlot {
            busy: None,
            tx,
            handle,
        }
    }

    /// Grow with idle slots or shrink by removing idle slots only.
    pub fn scale_to(&mut self, target: u32) -> ScaleOutcome {
        let current = self.total();
        let mut outcome = ScaleOutcome::default();

        if target > current {
            for _ in current..target {
                self.create_slot();
                outcome.created += 1;
            }
        } else if target < current {
            let surplus = current - target;
            let idle: Vec<SlotId> = self
                .slots
                .iter()
                .rev()
                .filter(|(_, s)| s.busy.is_none())
                .map(|(id, _)| *id)
                .take(surplus as usize)
                .collect();
            for id in idle {
                if let Some(slot) = self.slots.remove(&id) {
                    slot.handle.abort();
                    outcome.removed += 1;
                }
            }
            outcome.deferred = surplus - outcome.removed;
        }

        if outcome.created > 0 || outcome.removed > 0 {
            info!(
                from = current,
                to = self.total(),
                target,
                deferred = outcome.deferred,
                "worker pool scaled"
            );
        }
        outcome
    }

    /// Lowest-numbered idle slot.
    pub fn idle_slot(&self) -> Option<SlotId> {
        self.slots
            .iter()
            .find(|(_, s)| s.busy.is_none())
            .map(|(id, _)| *id)
    }

    /// Hand a request to an idle slot.
    ///
    /// Returns the request back if the slot is unknown, busy, or its task
    /// is gone.
    pub fn assign(
        &mut self,
        slot_id: SlotId,
        request: TranscriptionRequest,
    ) -> Result<(), TranscriptionRequest> {
        let Some(slot) = self.slots.get_mut(&slot_id) else {
            return Err(request);
        };
        if slot.busy.is_some() {
            return Err(request);
        }
        let job_id = request.job_id.clone();
        match slot.tx.try_send(request) {
            Ok(()) => {
                slot.busy = Some(job_id);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(request))
            | Err(mpsc::error::TrySendError::Closed(request)) => Err(request),
        }
    }

    /// Mark a slot idle after its job reported back.
    pub fn release(&mut self, slot_id: SlotId, job_id: &str) -> bool {
        match self.slots.get_mut(&slot_id) {
            Some(slot) if slot.busy.as_deref() == Some(job_id) => {
                slot.busy = None;
                true
            }
            Some(_) => {
                warn!(slot = slot_id, %job_id, "release for a job the slot is not running");
                false
            }
            None => false,
        }
    }

    /// Replace a slot's task with a fresh idle one.
    ///
    /// Returns the job that was in flight. Unknown slots (already scaled
    /// away) are left alone.
    pub fn respawn(&mut self, slot_id: SlotId) -> Option<JobId> {
        if !self.slots.contains_key(&slot_id) {
            return None;
        }
        let fresh = self.start_slot(slot_id);
        let old = self.slots.get_mut(&slot_id)?;
        old.handle.abort();
        let in_flight = std::mem::replace(old, fresh).busy;
        info!(slot = slot_id, job_id = ?in_flight, "worker slot respawned");
        in_flight
    }

    pub fn is_busy(&self, slot_id: SlotId) -> bool {
        self.slots
            .get(&slot_id)
            .is_some_and(|s| s.busy.is_some())
    }

    /// Live slots, busy or idle.
    pub fn total(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Slots with no job in flight.
    pub fn available(&self) -> u32 {
        self.slots.values().filter(|s| s.busy.is_none()).count() as u32
    }

    /// Slots running a job.
    pub fn busy(&self) -> u32 {
        self.total() - self.available()
    }

    /// Abort every slot task, cancelling any job still running.
    pub fn shutdown(&mut self) {
        let count = self.slots.len();
        for (_, slot) in std::mem::take(&mut self.slots) {
            slot.handle.abort();
        }
        info!(slots = count, "worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for slot in self.slots.values() {
            slot.handle.abort();
        }
    }
}

async fn slot_loop(
    slot: SlotId,
    executor: Arc<dyn InferenceExecutor>,
    mut rx: mpsc::Receiver<TranscriptionRequest>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    // Owned by this task: aborting the slot drops the set, which aborts the
    // in-flight call and with it any bridge process.
    let mut in_flight = JoinSet::new();
    while let Some(request) = rx.recv().await {
        let job_id = request.job_id.clone();
        let executor = Arc::clone(&executor);
        // The inner task isolates executor panics from the slot bookkeeping.
        in_flight.spawn(async move { executor.transcribe(&request).await });
        let Some(outcome) = in_flight.join_next().await else {
            continue;
        };

        let (event, exit) = match outcome {
            Ok(Ok(output)) => (WorkerEvent::Complete { slot, job_id, output }, false),
            Ok(Err(ExecutionError::Failed(error))) => {
                (WorkerEvent::Failure { slot, job_id, error }, false)
            }
            Ok(Err(ExecutionError::Crashed(reason))) => {
                (WorkerEvent::Crash { slot, job_id, reason }, true)
            }
            Err(e) => {
                let reason = if e.is_panic() {
                    "executor panicked".to_string()
                } else {
                    e.to_string()
                };
                (WorkerEvent::Crash { slot, job_id, reason }, true)
            }
        };

        if events.send(event).is_err() || exit {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::{TranscriptionOptions, TranscriptionResult};
    use scribe_executor::{BoxFuture, ExecutionResult};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Holds every call until a permit is released.
    struct GatedExecutor {
        gate: Arc<Semaphore>,
    }

    impl InferenceExecutor for GatedExecutor {
        fn name(&self) -> &str {
            "gated"
        }

        fn transcribe<'a>(
            &'a self,
            request: &'a TranscriptionRequest,
        ) -> BoxFuture<'a, ExecutionResult> {
            Box::pin(async move {
                let permit = self.gate.acquire().await;
                drop(permit);
                match request.input.as_str() {
                    "fail" => Err(ExecutionError::Failed("bad audio".to_string())),
                    "crash" => Err(ExecutionError::Crashed("killed".to_string())),
                    "panic" => panic!("backend bug"),
                    _ => Ok(ExecutionOutput {
                        result: TranscriptionResult::from_text(request.input.clone()),
                        processing_time: 0.5,
                    }),
                }
            })
        }
    }

    fn pool() -> (WorkerPool, mpsc::UnboundedReceiver<WorkerEvent>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = Arc::new(GatedExecutor { gate: gate.clone() });
        (WorkerPool::new(executor, tx), rx, gate)
    }

    fn request(job_id: &str, input: &str) -> TranscriptionRequest {
        TranscriptionRequest {
            job_id: job_id.to_string(),
            input: input.to_string(),
            options: TranscriptionOptions::default(),
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> WorkerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("worker event timed out")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn scale_up_creates_idle_slots() {
        let (mut pool, _rx, _gate) = pool();
        let outcome = pool.scale_to(3);
        assert_eq!(outcome.created, 3);
        assert_eq!(pool.total(), 3);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.idle_slot(), Some(0));
    }

    #[tokio::test]
    async fn busy_slot_rejects_second_job() {
        let (mut pool, _rx, _gate) = pool();
        pool.scale_to(1);
        let slot = pool.idle_slot().unwrap();

        assert!(pool.assign(slot, request("a", "ok")).is_ok());
        assert!(pool.is_busy(slot));
        assert_eq!(pool.idle_slot(), None);

        let rejected = pool.assign(slot, request("b", "ok")).unwrap_err();
        assert_eq!(rejected.job_id, "b");
    }

    #[tokio::test]
    async fn scale_down_never_removes_busy_slots() {
        let (mut pool, mut rx, gate) = pool();
        pool.scale_to(3);
        pool.assign(0, request("a", "ok")).unwrap();
        pool.assign(1, request("b", "ok")).unwrap();

        let outcome = pool.scale_to(0);
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.deferred, 2);
        assert_eq!(pool.total(), 2);
        assert!(pool.is_busy(0) && pool.is_busy(1));

        gate.add_permits(2);
        for _ in 0..2 {
            match next_event(&mut rx).await {
                WorkerEvent::Complete { slot, job_id, .. } => {
                    assert!(pool.release(slot, &job_id));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        let outcome = pool.scale_to(0);
        assert_eq!(outcome.removed, 2);
        assert_eq!(pool.total(), 0);
    }

    #[tokio::test]
    async fn reported_failure_keeps_slot_alive() {
        let (mut pool, mut rx, gate) = pool();
        pool.scale_to(1);
        gate.add_permits(10);

        pool.assign(0, request("a", "fail")).unwrap();
        match next_event(&mut rx).await {
            WorkerEvent::Failure { slot, job_id, error } => {
                assert_eq!((slot, job_id.as_str(), error.as_str()), (0, "a", "bad audio"));
                pool.release(slot, &job_id);
            }
            other => panic!("unexpected event {other:?}"),
        }

        pool.assign(0, request("b", "ok")).unwrap();
        assert!(matches!(next_event(&mut rx).await, WorkerEvent::Complete { .. }));
    }

    #[tokio::test]
    async fn crash_and_panic_are_reported_and_respawned() {
        let (mut pool, mut rx, gate) = pool();
        pool.scale_to(1);
        gate.add_permits(10);

        for input in ["crash", "panic"] {
            pool.assign(0, request(input, input)).unwrap();
            match next_event(&mut rx).await {
                WorkerEvent::Crash { slot, job_id, .. } => {
                    assert_eq!(job_id, input);
                    assert_eq!(pool.respawn(slot), Some(job_id));
                }
                other => panic!("unexpected event {other:?}"),
            }
            assert_eq!(pool.total(), 1);
            assert!(!pool.is_busy(0));
        }

        pool.assign(0, request("c", "ok")).unwrap();
        assert!(matches!(next_event(&mut rx).await, WorkerEvent::Complete { .. }));
    }

    #[tokio::test]
    async fn release_ignores_mismatched_job() {
        let (mut pool, _rx, _gate) = pool();
        pool.scale_to(1);
        pool.assign(0, request("a", "ok")).unwrap();
        assert!(!pool.release(0, "other"));
        assert!(pool.is_busy(0));
        assert!(pool.release(0, "a"));
    }

    #[tokio::test]
    async fn shutdown_clears_slots() {
        let (mut pool, _rx, _gate) = pool();
        pool.scale_to(2);
        pool.shutdown();
        assert_eq!(pool.total(), 0);
        assert_eq!(pool.idle_slot(), None);
    }
}
