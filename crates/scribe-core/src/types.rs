//! Job model and transcription payloads.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque unique job identifier.
pub type JobId = String;

/// Generate a fresh job id.
pub fn new_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Status ─────────────────────────────────────────────────────────

/// Lifecycle state of a job.
///
/// ```text
/// pending → processing → completed   (terminal)
///                      → pending     (retry)
///                      → failed      (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self → next` is an edge of the job state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Pending)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state-machine edge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition for job {job_id}: {from} -> {to}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

// ── Transcription payloads ─────────────────────────────────────────

/// Per-job options forwarded to the inference backend.
///
/// Known keys override backend defaults; anything else is carried
/// through untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionOptions {
    /// Language code (`"en"`, `"pt"`), or `"auto"` / absent for detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Translate to English instead of transcribing.
    #[serde(default)]
    pub translate: bool,
    /// Model name or path overriding the backend default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TranscriptionOptions {
    /// Language to pass to the backend, `None` meaning auto-detect.
    pub fn language_hint(&self) -> Option<&str> {
        match self.language.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(lang) if lang.eq_ignore_ascii_case("auto") => None,
            Some(lang) => Some(lang),
        }
    }
}

/// Word-level timing emitted by the backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub probability: f64,
}

/// Transcription output of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_probability: Option<f64>,
    /// Audio duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default)]
    pub words: Vec<WordTiming>,
    /// Raw chunk list (insanely-fast-whisper only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<serde_json::Value>,
}

impl TranscriptionResult {
    /// Result carrying only text (handy for synthetic executors).
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
            language_probability: None,
            duration: None,
            words: Vec::new(),
            chunks: None,
        }
    }
}

/// What a worker slot hands to its executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub job_id: JobId,
    /// Path of the audio file to transcribe.
    pub input: String,
    pub options: TranscriptionOptions,
}

// ── Job ────────────────────────────────────────────────────────────

/// A submitted transcription job tracked through its lifecycle.
///
/// Timestamps are Unix epoch milliseconds; `processing_time` is seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub input: String,
    pub name: String,
    pub status: JobStatus,
    pub options: TranscriptionOptions,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub retries: u32,
    pub max_retries: u32,
    pub result: Option<TranscriptionResult>,
    pub error: Option<String>,
    pub processing_time: Option<f64>,
}

impl Job {
    /// Build a pending job.
    pub fn new(
        id: JobId,
        input: impl Into<String>,
        name: impl Into<String>,
        options: TranscriptionOptions,
        max_retries: u32,
        now: u64,
    ) -> Self {
        Self {
            id,
            input: input.into(),
            name: name.into(),
            status: JobStatus::Pending,
            options,
            created_at: now,
            started_at: None,
            completed_at: None,
            retries: 0,
            max_retries,
            result: None,
            error: None,
            processing_time: None,
        }
    }

    /// Move to `next`, refusing edges outside the state machine.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                job_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn request(&self) -> TranscriptionRequest {
        TranscriptionRequest {
            job_id: self.id.clone(),
            input: self.input.clone(),
            options: self.options.clone(),
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
            completed_at: self.completed_at,
            retries: self.retries,
            processing_time: self.processing_time,
        }
    }
}

/// Caller-facing view of a job, from memory or from the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TranscriptionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_job() -> Job {
        Job::new(
            "job-1".to_string(),
            "/tmp/a.wav",
            "a.wav",
            TranscriptionOptions::default(),
            3,
            1000,
        )
    }

    #[test]
    fn new_job_is_pending() {
        let job = pending_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retries, 0);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn allowed_transitions() {
        let mut job = pending_job();
        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::Pending).unwrap();
        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::Completed).unwrap();
        assert!(job.status.is_terminal());
    }

    #[test]
    fn terminal_states_are_immutable() {
        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            for next in [
                JobStatus::Pending,
                JobStatus::Processing,
                JobStatus::Completed,
                JobStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn pending_cannot_skip_processing() {
        let mut job = pending_job();
        let err = job.transition(JobStatus::Completed).unwrap_err();
        assert_eq!(err.from, JobStatus::Pending);
        assert_eq!(err.to, JobStatus::Completed);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn language_hint_treats_auto_as_detection() {
        let mut opts = TranscriptionOptions::default();
        assert_eq!(opts.language_hint(), None);
        opts.language = Some("auto".to_string());
        assert_eq!(opts.language_hint(), None);
        opts.language = Some("pt".to_string());
        assert_eq!(opts.language_hint(), Some("pt"));
    }

    #[test]
    fn options_keep_unknown_keys() {
        let json = r#"{"language":"en","diarize":true,"speakers":2}"#;
        let opts: TranscriptionOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.language.as_deref(), Some("en"));
        assert!(!opts.translate);
        assert_eq!(opts.extra.get("diarize"), Some(&serde_json::json!(true)));
        assert_eq!(opts.extra.get("speakers"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn bridge_output_parses_into_result() {
        let json = r#"{
            "text": "ola mundo",
            "language": "pt",
            "language_probability": 0.98,
            "duration": 2.5,
            "words": [{"word": "ola", "start": 0.0, "end": 0.4, "probability": 0.9}]
        }"#;
        let result: TranscriptionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.text, "ola mundo");
        assert_eq!(result.words.len(), 1);
        assert!(result.chunks.is_none());
    }

    #[test]
    fn report_mirrors_job() {
        let job = pending_job();
        let report = job.report();
        assert_eq!(report.id, "job-1");
        assert_eq!(report.status, JobStatus::Pending);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(new_job_id(), new_job_id());
    }
}
