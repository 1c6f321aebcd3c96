//! Prometheus text exposition format.
//!
//! Renders queue statistics and the autoscaler's view of the host as
//! unlabelled gauges.

use std::fmt::Write;

use scribe_autoscale::SystemReport;
use scribe_scheduler::QueueStats;

fn gauge(out: &mut String, name: &str, help: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}

/// Render queue stats and the latest system report.
pub fn render_prometheus(stats: &QueueStats, report: &SystemReport) -> String {
    let mut out = String::new();

    gauge(&mut out, "scribe_jobs_pending", "Jobs waiting for a worker.", stats.pending_jobs);
    gauge(&mut out, "scribe_jobs_active", "Jobs currently being transcribed.", stats.active_jobs);
    gauge(&mut out, "scribe_workers_total", "Worker slots in the pool.", stats.total_workers);
    gauge(
        &mut out,
        "scribe_workers_available",
        "Idle worker slots.",
        stats.available_workers,
    );
    gauge(
        &mut out,
        "scribe_processing_time_avg_seconds",
        "Mean processing time over the recent window.",
        format!("{:.3}", stats.average_processing_time),
    );
    gauge(
        &mut out,
        "scribe_estimated_wait_seconds",
        "Expected wait for a newly submitted job.",
        format!("{:.3}", stats.estimated_wait_time),
    );

    let rec = &report.recommendation;
    gauge(
        &mut out,
        "scribe_workers_recommended",
        "Worker count recommended by the autoscaler.",
        rec.recommended,
    );

    let snap = &report.snapshot;
    gauge(
        &mut out,
        "scribe_system_memory_used_percent",
        "Host memory in use (0-100).",
        format!("{:.2}", snap.memory_used_percent),
    );
    gauge(
        &mut out,
        "scribe_system_load_average",
        "One-minute load average.",
        format!("{:.2}", snap.load_average),
    );
    gauge(&mut out, "scribe_system_gpus", "Detected GPUs.", snap.gpu_count);
    gauge(
        &mut out,
        "scribe_telemetry_degraded",
        "1 when the last telemetry read fell back to defaults.",
        u8::from(snap.degraded),
    );

    out
}
