//! faster-whisper (CTranslate2) backend.

use std::ffi::OsString;
use std::path::PathBuf;

use scribe_core::TranscriptionRequest;
use scribe_core::config::BackendConfig;

use crate::bridge::{push_arg, run_bridge};
use crate::executor::{BoxFuture, ExecutionResult, InferenceExecutor};

pub const SCRIPT_NAME: &str = "faster_whisper_bridge.py";

#[derive(Debug, Clone)]
pub struct FasterWhisperExecutor {
    python: PathBuf,
    script: PathBuf,
    model: String,
    device: String,
    compute_type: String,
}

impl FasterWhisperExecutor {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            python: config.python.clone(),
            script: config.script_dir.join(SCRIPT_NAME),
            model: config.model.clone(),
            device: config.device.clone().unwrap_or_else(|| "cpu".to_string()),
            compute_type: config.compute_type.clone(),
        }
    }

    fn args(&self, request: &TranscriptionRequest) -> Vec<OsString> {
        let opts = &request.options;
        let mut args = Vec::new();
        push_arg(&mut args, "--model", opts.model.as_deref().unwrap_or(&self.model));
        push_arg(&mut args, "--audio", request.input.as_str());
        push_arg(&mut args, "--device", self.device.as_str());
        push_arg(&mut args, "--compute_type", self.compute_type.as_str());
        if let Some(lang) = opts.language_hint() {
            push_arg(&mut args, "--language", lang);
        }
        if opts.translate {
            args.push("--translate".into());
        }
        args
    }
}

impl InferenceExecutor for FasterWhisperExecutor {
    fn name(&self) -> &str {
        "faster-whisper"
    }

    fn transcribe<'a>(&'a self, request: &'a TranscriptionRequest) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            run_bridge(&self.python, &self.script, self.args(request), &request.input).await
        })
    }
}
