//! scribe-executor — inference backends behind one trait.
//!
//! The scheduler only sees `InferenceExecutor`. Each backend is a variant
//! that runs a Python bridge process per job and parses the single JSON
//! object it prints on stdout.
//!
//! # Outcomes
//!
//! ```text
//! {"text": ...}        → Ok(ExecutionOutput)
//! {"error": "..."}     → Err(ExecutionError::Failed)   reported failure
//! signal / no JSON     → Err(ExecutionError::Crashed)  unit died silently
//! ```
//!
//! The backend is chosen once at startup from `[backend] kind` via
//! [`build_executor`].

pub mod bridge;
pub mod error;
pub mod executor;
pub mod faster_whisper;
pub mod insanely_fast;

pub use error::ExecutionError;
pub use executor::{
    BoxFuture, ExecutionOutput, ExecutionResult, InferenceExecutor, build_executor,
};
pub use faster_whisper::FasterWhisperExecutor;
pub use insanely_fast::InsanelyFastWhisperExecutor;
