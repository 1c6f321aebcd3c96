//! Durable record types.

use serde::{Deserialize, Serialize};

use scribe_core::{Job, JobId, JobStatus, JobStatusReport, TranscriptionResult};

/// The durable subset of a completed `Job`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedJobRecord {
    pub id: JobId,
    pub name: String,
    pub input: String,
    pub status: JobStatus,
    pub result: Option<TranscriptionResult>,
    pub error: Option<String>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: u64,
    pub retries: u32,
    pub processing_time: Option<f64>,
}

impl CompletedJobRecord {
    /// Snapshot a finished job. `completed_at` falls back to `now`.
    pub fn from_job(job: &Job, now: u64) -> Self {
        Self {
            id: job.id.clone(),
            name: job.name.clone(),
            input: job.input.clone(),
            status: job.status,
            result: job.result.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at.unwrap_or(now),
            retries: job.retries,
            processing_time: job.processing_time,
        }
    }

    pub fn report(&self) -> JobStatusReport {
        JobStatusReport {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: Some(self.completed_at),
            retries: self.retries,
            processing_time: self.processing_time,
        }
    }
}
