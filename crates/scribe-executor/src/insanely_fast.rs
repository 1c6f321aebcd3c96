//! insanely-fast-whisper (transformers pipeline) backend.

use std::ffi::OsString;
use std::path::PathBuf;

use scribe_core::TranscriptionRequest;
use scribe_core::config::BackendConfig;

use crate::bridge::{push_arg, run_bridge};
use crate::executor::{BoxFuture, ExecutionResult, InferenceExecutor};

pub const SCRIPT_NAME: &str = "insanely_fast_whisper_bridge.py";

#[derive(Debug, Clone)]
pub struct InsanelyFastWhisperExecutor {
    python: PathBuf,
    script: PathBuf,
    model: String,
    device: String,
    torch_dtype: String,
    batch_size: u32,
    chunk_length_s: u32,
}

impl InsanelyFastWhisperExecutor {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            python: config.python.clone(),
            script: config.script_dir.join(SCRIPT_NAME),
            model: config.model.clone(),
            device: config.device.clone().unwrap_or_else(|| "auto".to_string()),
            torch_dtype: config.torch_dtype.clone(),
            batch_size: config.batch_size,
            chunk_length_s: config.chunk_length_s,
        }
    }

    fn args(&self, request: &TranscriptionRequest) -> Vec<OsString> {
        let opts = &request.options;
        let mut args = Vec::new();
        push_arg(&mut args, "--model", opts.model.as_deref().unwrap_or(&self.model));
        push_arg(&mut args, "--audio", request.input.as_str());
        push_arg(&mut args, "--device", self.device.as_str());
        push_arg(&mut args, "--torch_dtype", self.torch_dtype.as_str());
        push_arg(&mut args, "--batch_size", self.batch_size.to_string());
        push_arg(&mut args, "--chunk_length_s", self.chunk_length_s.to_string());
        if let Some(lang) = opts.language_hint() {
            push_arg(&mut args, "--language", lang);
        }
        if opts.translate {
            args.push("--translate".into());
        }
        args
    }
}

impl InferenceExecutor for InsanelyFastWhisperExecutor {
    fn name(&self) -> &str {
        "insanely-fast-whisper"
    }

    fn transcribe<'a>(&'a self, request: &'a TranscriptionRequest) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            run_bridge(&self.python, &self.script, self.args(request), &request.input).await
        })
    }
}
