//! scribe.toml configuration parser.
//!
//! Every section and field has a default, so an empty file (or no file)
//! yields a runnable configuration. Durations are written the same way
//! everywhere: `"500ms"`, `"30s"`, `"5m"`, `"24h"`, or a bare number of
//! seconds.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScribeConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub scheduler: SchedulerConfig,
    pub autoscale: AutoscaleConfig,
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory holding `status.redb`.
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Which inference engine the worker slots drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    FasterWhisper,
    InsanelyFastWhisper,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::FasterWhisper => "faster-whisper",
            BackendKind::InsanelyFastWhisper => "insanely-fast-whisper",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "faster-whisper" => Ok(BackendKind::FasterWhisper),
            "insanely-fast-whisper" => Ok(BackendKind::InsanelyFastWhisper),
            other => Err(format!(
                "unknown backend '{other}' (expected faster-whisper or insanely-fast-whisper)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Python interpreter used to run the bridge scripts.
    pub python: PathBuf,
    /// Directory containing `faster_whisper_bridge.py` and
    /// `insanely_fast_whisper_bridge.py`.
    pub script_dir: PathBuf,
    /// Model name or path, e.g. `large-v3` or `openai/whisper-large-v3-turbo`.
    pub model: String,
    /// Device override; each backend has its own default.
    pub device: Option<String>,
    /// faster-whisper only.
    pub compute_type: String,
    /// insanely-fast-whisper only.
    pub torch_dtype: String,
    /// insanely-fast-whisper only.
    pub batch_size: u32,
    /// insanely-fast-whisper only.
    pub chunk_length_s: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            python: PathBuf::from("python3"),
            script_dir: PathBuf::from("scripts"),
            model: "large-v3".to_string(),
            device: None,
            compute_type: "int8".to_string(),
            torch_dtype: "auto".to_string(),
            batch_size: 24,
            chunk_length_s: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Failed attempts after which a job fails terminally.
    pub max_retries: u32,
    /// Number of recent processing times averaged by the wait estimator.
    pub estimator_window: usize,
    /// Average processing time (seconds) assumed before any job completes.
    pub default_processing_time_secs: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            estimator_window: 100,
            default_processing_time_secs: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscaleConfig {
    pub enabled: bool,
    pub min_workers: u32,
    pub max_workers: u32,
    /// Memory usage (percent) above which the pool is throttled hardest.
    pub memory_threshold_percent: f64,
    /// Load per core (percent of one core) above which the pool is throttled hardest.
    pub cpu_threshold_percent: f64,
    /// Free memory reserved for each worker.
    pub memory_per_worker_mb: u64,
    /// How long a recommendation is reused before resampling.
    pub cache_ttl: String,
    /// Autoscale loop period.
    pub interval: String,
}

impl Default for AutoscaleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_workers: 1,
            max_workers: 4,
            memory_threshold_percent: 80.0,
            cpu_threshold_percent: 80.0,
            memory_per_worker_mb: 512,
            cache_ttl: "30s".to_string(),
            interval: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Completed records older than this are pruned from the durable store.
    pub max_age: String,
    /// Terminal jobs older than this are evicted from memory.
    pub memory_ttl: String,
    /// Retention loop period.
    pub interval: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age: "168h".to_string(),
            memory_ttl: "1h".to_string(),
            interval: "10m".to_string(),
        }
    }
}

impl ScribeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScribeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.autoscale;
        if a.min_workers == 0 {
            return Err(ConfigError::Invalid(
                "autoscale.min_workers must be at least 1".to_string(),
            ));
        }
        if a.min_workers > a.max_workers {
            return Err(ConfigError::Invalid(format!(
                "autoscale.min_workers ({}) exceeds max_workers ({})",
                a.min_workers, a.max_workers
            )));
        }
        for (name, value) in [
            ("memory_threshold_percent", a.memory_threshold_percent),
            ("cpu_threshold_percent", a.cpu_threshold_percent),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(ConfigError::Invalid(format!(
                    "autoscale.{name} must be in (0, 100], got {value}"
                )));
            }
        }
        if a.memory_per_worker_mb == 0 {
            return Err(ConfigError::Invalid(
                "autoscale.memory_per_worker_mb must be positive".to_string(),
            ));
        }
        if self.scheduler.estimator_window == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.estimator_window must be positive".to_string(),
            ));
        }
        if !(self.scheduler.default_processing_time_secs >= 0.0) {
            return Err(ConfigError::Invalid(
                "scheduler.default_processing_time_secs must be non-negative".to_string(),
            ));
        }
        // (name, value, must be non-zero): the loop intervals drive `sleep`.
        for (name, value, nonzero) in [
            ("autoscale.cache_ttl", &a.cache_ttl, false),
            ("autoscale.interval", &a.interval, true),
            ("retention.max_age", &self.retention.max_age, false),
            ("retention.memory_ttl", &self.retention.memory_ttl, false),
            ("retention.interval", &self.retention.interval, true),
        ] {
            match parse_duration(value) {
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "{name}: cannot parse duration '{value}'"
                    )));
                }
                Some(d) if nonzero && d.is_zero() => {
                    return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl AutoscaleConfig {
    pub fn cache_ttl(&self) -> Duration {
        parse_duration(&self.cache_ttl).unwrap_or(Duration::from_secs(30))
    }

    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(30))
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        parse_duration(&self.max_age).unwrap_or(Duration::from_secs(168 * 3600))
    }

    pub fn memory_ttl(&self) -> Duration {
        parse_duration(&self.memory_ttl).unwrap_or(Duration::from_secs(3600))
    }

    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(600))
    }
}

/// Parse a duration string like "500ms", "5s", "2m", "24h".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
