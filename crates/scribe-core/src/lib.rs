//! scribe-core — shared types for the scribe transcription scheduler.
//!
//! Holds the job model (`Job`, `JobStatus`, `JobStatusReport`), the
//! transcription request/result payloads exchanged with inference
//! backends, and the `scribe.toml` configuration parser.

pub mod config;
pub mod types;

pub use config::{ConfigError, ScribeConfig};
pub use types::*;
