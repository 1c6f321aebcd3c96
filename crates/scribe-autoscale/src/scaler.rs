//! AutoScaler — turns telemetry into a recommended worker count.
//!
//! `recommend` is a pure function of a snapshot and a policy. `AutoScaler`
//! wraps it with a telemetry source and a TTL cache, and drives the
//! periodic loop that pushes the recommendation to the worker pool through
//! a callback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use scribe_core::config::AutoscaleConfig;
use scribe_core::epoch_millis;

use crate::telemetry::{SystemSnapshot, TelemetrySource};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB: u64 = 1024 * 1024;

/// Callback used to apply a recommendation.
///
/// The autoscaler calls this with the target worker count.
pub type ScaleCallback = Box<dyn Fn(u32) -> anyhow::Result<()> + Send + Sync>;

/// Bounds and thresholds for `recommend`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingPolicy {
    /// Floor for every recommendation.
    pub min_workers: u32,
    /// Ceiling for every recommendation.
    pub max_workers: u32,
    /// Memory usage (%) above which the recommendation is cut.
    pub memory_threshold_percent: f64,
    /// Load per core, as a percentage, above which the recommendation is cut.
    pub cpu_threshold_percent: f64,
    /// Memory one worker is expected to need.
    pub memory_per_worker_bytes: u64,
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self::from(&AutoscaleConfig::default())
    }
}

impl From<&AutoscaleConfig> for ScalingPolicy {
    fn from(config: &AutoscaleConfig) -> Self {
        Self {
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            memory_threshold_percent: config.memory_threshold_percent,
            cpu_threshold_percent: config.cpu_threshold_percent,
            memory_per_worker_bytes: config.memory_per_worker_mb * MIB,
        }
    }
}

/// Intermediate values of one `recommend` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingFactors {
    /// `floor(cpus * 0.8)`.
    pub cpu_base: u32,
    pub memory_cap: u32,
    pub memory_multiplier: f64,
    pub load_per_core: f64,
    pub load_multiplier: f64,
    pub gpu_bonus: u32,
    /// Base after multipliers and GPU bonus.
    pub adjusted_base: f64,
    pub memory_limited: u32,
    /// `min(adjusted_base, memory_cap, memory_limited)` before clamping.
    pub unclamped: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingRecommendation {
    pub recommended: u32,
    pub min_workers: u32,
    pub max_workers: u32,
    pub factors: ScalingFactors,
    pub computed_at: u64,
}

/// Recommendation together with the snapshot it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemReport {
    pub recommendation: ScalingRecommendation,
    pub snapshot: SystemSnapshot,
}

/// Compute the recommended worker count for a snapshot.
///
/// The result is always within `[min_workers, max(min_workers, max_workers)]`,
/// whatever the snapshot holds.
pub fn recommend(snapshot: &SystemSnapshot, policy: &ScalingPolicy) -> ScalingRecommendation {
    let cpus = snapshot.cpu_count.max(1) as f64;
    let cpu_base = (cpus * 0.8).floor();

    let total_gb = snapshot.memory_total as f64 / GIB;
    let memory_cap = (total_gb / 2.0).floor();

    // Unreadable usage is treated as saturated.
    let memory_used = if snapshot.memory_used_percent.is_finite() {
        snapshot.memory_used_percent
    } else {
        100.0
    };
    let mem_threshold = policy.memory_threshold_percent;
    let memory_multiplier = if memory_used > mem_threshold {
        0.6
    } else if memory_used > mem_threshold * 0.75 {
        0.8
    } else {
        1.0
    };

    let load_per_core = if snapshot.load_average.is_finite() && snapshot.load_average > 0.0 {
        snapshot.load_average / cpus
    } else {
        0.0
    };
    let cpu_threshold = policy.cpu_threshold_percent / 100.0;
    let load_multiplier = if load_per_core > cpu_threshold {
        0.7
    } else if load_per_core > cpu_threshold * 0.75 {
        0.9
    } else {
        1.0
    };

    let gpu_bonus = snapshot.gpu_count.saturating_mul(2);
    let adjusted_base = cpu_base * memory_multiplier * load_multiplier + gpu_bonus as f64;

    let per_worker = policy.memory_per_worker_bytes.max(1);
    let memory_limited = snapshot.memory_free / per_worker;

    let unclamped = adjusted_base
        .floor()
        .min(memory_cap)
        .min(memory_limited as f64)
        .max(0.0) as u32;

    let min = policy.min_workers;
    let max = policy.max_workers.max(min);
    let recommended = unclamped.clamp(min, max);

    ScalingRecommendation {
        recommended,
        min_workers: min,
        max_workers: max,
        factors: ScalingFactors {
            cpu_base: cpu_base as u32,
            memory_cap: memory_cap.min(u32::MAX as f64) as u32,
            memory_multiplier,
            load_per_core,
            load_multiplier,
            gpu_bonus,
            adjusted_base,
            memory_limited: memory_limited.min(u32::MAX as u64) as u32,
            unclamped,
        },
        computed_at: epoch_millis(),
    }
}

struct CachedReport {
    report: SystemReport,
    at: Instant,
}

/// Samples telemetry and caches the resulting recommendation for a TTL.
pub struct AutoScaler {
    telemetry: Arc<dyn TelemetrySource>,
    policy: ScalingPolicy,
    ttl: Duration,
    cache: Mutex<Option<CachedReport>>,
}

impl AutoScaler {
    pub fn new(telemetry: Arc<dyn TelemetrySource>, policy: ScalingPolicy, ttl: Duration) -> Self {
        Self {
            telemetry,
            policy,
            ttl,
            cache: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// Read telemetry off the async runtime. Never fails.
    pub async fn sample_system(&self) -> SystemSnapshot {
        let telemetry = Arc::clone(&self.telemetry);
        match tokio::task::spawn_blocking(move || telemetry.sample()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "telemetry sampling failed, using degraded snapshot");
                SystemSnapshot::unavailable()
            }
        }
    }

    /// Recommendation plus snapshot, reusing the cached one while it is
    /// younger than the TTL unless `force` is set.
    pub async fn system_report(&self, force: bool) -> SystemReport {
        let mut cache = self.cache.lock().await;
        if !force {
            if let Some(cached) = cache.as_ref().filter(|c| c.at.elapsed() < self.ttl) {
                return cached.report.clone();
            }
        }

        let snapshot = self.sample_system().await;
        let recommendation = recommend(&snapshot, &self.policy);
        debug!(
            recommended = recommendation.recommended,
            unclamped = recommendation.factors.unclamped,
            degraded = snapshot.degraded,
            "worker recommendation computed"
        );
        let report = SystemReport {
            recommendation,
            snapshot,
        };
        *cache = Some(CachedReport {
            report: report.clone(),
            at: Instant::now(),
        });
        report
    }

    pub async fn optimal_worker_count(&self, force: bool) -> u32 {
        self.system_report(force).await.recommendation.recommended
    }

    /// Run the autoscaler loop, applying each recommendation via `scale_fn`.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        scale_fn: ScaleCallback,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "autoscaler started");
        let mut last: Option<u32> = None;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let target = self.optimal_worker_count(false).await;
                    if last != Some(target) {
                        info!(from = ?last, to = target, "worker recommendation changed");
                        last = Some(target);
                    }
                    if let Err(e) = scale_fn(target) {
                        warn!(target, error = %e, "scaling action failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }
    }
}
