//! The `InferenceExecutor` trait and backend selection.

use std::sync::Arc;

use scribe_core::config::{BackendConfig, BackendKind};
use scribe_core::{TranscriptionRequest, TranscriptionResult};
use tracing::info;

use crate::error::ExecutionError;
use crate::faster_whisper::FasterWhisperExecutor;
use crate::insanely_fast::InsanelyFastWhisperExecutor;

pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Successful transcription plus the wall time it took.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    pub result: TranscriptionResult,
    /// Seconds spent in the backend.
    pub processing_time: f64,
}

pub type ExecutionResult = Result<ExecutionOutput, ExecutionError>;

/// A backend that turns one audio file into one transcription.
///
/// Implementations must be safe to call from several worker slots at once;
/// each call is independent.
pub trait InferenceExecutor: Send + Sync + 'static {
    /// Backend name for logs and reports.
    fn name(&self) -> &str;

    fn transcribe<'a>(&'a self, request: &'a TranscriptionRequest) -> BoxFuture<'a, ExecutionResult>;
}

/// Build the executor selected by `[backend] kind`.
pub fn build_executor(config: &BackendConfig) -> Arc<dyn InferenceExecutor> {
    let executor: Arc<dyn InferenceExecutor> = match config.kind {
        BackendKind::FasterWhisper => Arc::new(FasterWhisperExecutor::from_config(config)),
        BackendKind::InsanelyFastWhisper => {
            Arc::new(InsanelyFastWhisperExecutor::from_config(config))
        }
    };
    info!(backend = executor.name(), model = %config.model, "inference executor selected");
    executor
}
