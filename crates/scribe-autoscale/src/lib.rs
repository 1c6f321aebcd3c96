//! scribe-autoscale — telemetry-driven worker pool sizing.
//!
//! Samples the host (CPU count, memory, load average, GPUs) and turns the
//! snapshot into a recommended worker count. The recommendation is cached
//! for a TTL so bursts of callers do not each pay for a telemetry read.
//!
//! # Sizing Heuristic
//!
//! ```text
//! base           = floor(cpus * 0.8)
//! memory_cap     = floor(total_memory_gb / 2)
//! memory_used%   > threshold        → base *= 0.6
//!                > 0.75 * threshold → base *= 0.8
//! load_per_core  > cpu_threshold        → base *= 0.7
//!                > 0.75 * cpu_threshold → base *= 0.9
//! gpus > 0                              → base += gpus * 2
//! memory_limited = floor(free_memory / memory_per_worker)
//! recommended    = clamp(min(base, memory_cap, memory_limited), min, max)
//! ```
//!
//! Telemetry never fails the caller: a read that errors or panics yields a
//! degraded snapshot whose recommendation is `min_workers`.

pub mod scaler;
pub mod telemetry;

pub use scaler::{
    AutoScaler, ScaleCallback, ScalingFactors, ScalingPolicy, ScalingRecommendation,
    SystemReport, recommend,
};
pub use telemetry::{SysinfoTelemetry, SystemSnapshot, TelemetrySource};
