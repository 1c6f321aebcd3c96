//! Python bridge process plumbing shared by the whisper backends.
//!
//! A bridge is invoked as `<python> <script> --model .. --audio .. [flags]`
//! and prints exactly one JSON object on stdout.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use scribe_core::TranscriptionResult;

use crate::error::ExecutionError;
use crate::executor::{ExecutionOutput, ExecutionResult};

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BridgeOutput {
    Error { error: String },
    Success(TranscriptionResult),
}

/// Run one bridge invocation for `audio` and time it.
pub async fn run_bridge(
    python: &Path,
    script: &Path,
    args: Vec<OsString>,
    audio: &str,
) -> ExecutionResult {
    if !tokio::fs::try_exists(audio).await.unwrap_or(false) {
        return Err(ExecutionError::Failed(format!("Audio file not found: {audio}")));
    }

    debug!(script = %script.display(), %audio, "starting bridge");
    let started = Instant::now();
    let output = Command::new(python)
        .arg(script)
        .args(&args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            ExecutionError::Failed(format!(
                "failed to start bridge {}: {e}",
                script.display()
            ))
        })?;
    let processing_time = started.elapsed().as_secs_f64();

    let result = classify_output(&output.stdout, output.status.code(), &output.stderr)?;
    debug!(script = %script.display(), processing_time, "bridge finished");
    Ok(ExecutionOutput {
        result,
        processing_time,
    })
}

/// Map raw process output onto the executor outcome.
///
/// `exit_code` is `None` when the process was killed by a signal.
pub fn classify_output(
    stdout: &[u8],
    exit_code: Option<i32>,
    stderr: &[u8],
) -> Result<TranscriptionResult, ExecutionError> {
    match parse_stdout(stdout) {
        Some(BridgeOutput::Success(result)) => Ok(result),
        Some(BridgeOutput::Error { error }) => Err(ExecutionError::Failed(error)),
        None => {
            let tail = stderr_tail(stderr);
            let cause = match exit_code {
                None => "terminated by signal".to_string(),
                Some(0) => "exited without output".to_string(),
                Some(code) => format!("exit code {code}"),
            };
            if tail.is_empty() {
                Err(ExecutionError::Crashed(cause))
            } else {
                Err(ExecutionError::Crashed(format!("{cause}: {tail}")))
            }
        }
    }
}

/// Parse the bridge's JSON object, tolerating log noise printed before it.
fn parse_stdout(stdout: &[u8]) -> Option<BridgeOutput> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if let Ok(parsed) = serde_json::from_str(text) {
        return Some(parsed);
    }
    let start = text.find('{')?;
    serde_json::from_str(&text[start..]).ok()
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let mut lines: Vec<&str> = text
        .lines()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .take(STDERR_TAIL_LINES)
        .collect();
    lines.reverse();
    lines.join(" | ")
}

/// Push `--flag value`.
pub(crate) fn push_arg(args: &mut Vec<OsString>, flag: &str, value: impl Into<OsString>) {
    args.push(flag.into());
    args.push(value.into());
}
