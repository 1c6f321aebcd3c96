//! Best-effort host telemetry.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::process::Command;

use serde::Serialize;
use sysinfo::System;
use tracing::{debug, warn};

use scribe_core::epoch_millis;

const NVIDIA_PROC_DIR: &str = "/proc/driver/nvidia/gpus";

/// One telemetry reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSnapshot {
    pub cpu_count: u32,
    /// Bytes.
    pub memory_total: u64,
    /// Bytes available to new processes.
    pub memory_free: u64,
    /// 0–100.
    pub memory_used_percent: f64,
    /// One-minute load average.
    pub load_average: f64,
    pub gpu_count: u32,
    /// Some reading failed and a safe default was substituted.
    pub degraded: bool,
    pub sampled_at: u64,
}

impl SystemSnapshot {
    /// Snapshot used when telemetry is unavailable altogether.
    ///
    /// Zero memory makes every memory bound collapse, so the scaler falls
    /// back to `min_workers`.
    pub fn unavailable() -> Self {
        Self {
            cpu_count: 1,
            memory_total: 0,
            memory_free: 0,
            memory_used_percent: 0.0,
            load_average: 0.0,
            gpu_count: 0,
            degraded: true,
            sampled_at: epoch_millis(),
        }
    }
}

/// A synchronous, possibly unreliable telemetry reader.
pub trait TelemetrySource: Send + Sync + 'static {
    /// Read the host. Must not panic; implementations degrade instead.
    fn sample(&self) -> SystemSnapshot;
}

/// Telemetry from `sysinfo`, plus an NVIDIA GPU probe.
#[derive(Debug, Clone)]
pub struct SysinfoTelemetry {
    /// Fall back to `nvidia-smi -L` when the driver proc dir is absent.
    probe_nvidia_smi: bool,
}

impl Default for SysinfoTelemetry {
    fn default() -> Self {
        Self {
            probe_nvidia_smi: true,
        }
    }
}

impl SysinfoTelemetry {
    pub fn new(probe_nvidia_smi: bool) -> Self {
        Self { probe_nvidia_smi }
    }

    fn read(&self) -> SystemSnapshot {
        let mut degraded = false;
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();

        let cpu_count = match sys.cpus().len() {
            0 => {
                degraded = true;
                std::thread::available_parallelism()
                    .map(|n| n.get() as u32)
                    .unwrap_or(1)
            }
            n => n as u32,
        };

        let memory_total = sys.total_memory();
        let available = sys.available_memory();
        let used = if available == 0 {
            sys.used_memory().min(memory_total)
        } else {
            memory_total.saturating_sub(available)
        };
        let memory_free = memory_total.saturating_sub(used);
        let memory_used_percent = if memory_total > 0 {
            used as f64 / memory_total as f64 * 100.0
        } else {
            degraded = true;
            0.0
        };

        let load = System::load_average().one;
        let load_average = if load.is_finite() && load >= 0.0 {
            load
        } else {
            degraded = true;
            0.0
        };

        SystemSnapshot {
            cpu_count,
            memory_total,
            memory_free,
            memory_used_percent,
            load_average,
            gpu_count: self.gpu_count(),
            degraded,
            sampled_at: epoch_millis(),
        }
    }

    fn gpu_count(&self) -> u32 {
        if let Some(n) = count_dir_entries(Path::new(NVIDIA_PROC_DIR)) {
            return n;
        }
        if !self.probe_nvidia_smi {
            return 0;
        }
        match Command::new("nvidia-smi").arg("-L").output() {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
                .lines()
                .filter(|l| l.starts_with("GPU "))
                .count() as u32,
            Ok(_) | Err(_) => 0,
        }
    }
}

impl TelemetrySource for SysinfoTelemetry {
    fn sample(&self) -> SystemSnapshot {
        match catch_unwind(AssertUnwindSafe(|| self.read())) {
            Ok(snapshot) => {
                debug!(
                    cpus = snapshot.cpu_count,
                    memory_used_percent = snapshot.memory_used_percent,
                    load = snapshot.load_average,
                    gpus = snapshot.gpu_count,
                    degraded = snapshot.degraded,
                    "system sampled"
                );
                snapshot
            }
            Err(_) => {
                warn!("telemetry read panicked, using degraded snapshot");
                SystemSnapshot::unavailable()
            }
        }
    }
}

fn count_dir_entries(dir: &Path) -> Option<u32> {
    let entries = std::fs::read_dir(dir).ok()?;
    Some(entries.filter_map(Result::ok).count() as u32)
}
