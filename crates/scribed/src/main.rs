//! scribed — the scribe transcription daemon.
//!
//! Single binary that assembles all scribe subsystems:
//! - Status store (redb)
//! - Inference executor (faster-whisper or insanely-fast-whisper bridge)
//! - Autoscaler + telemetry
//! - Scheduler + worker pool
//! - Retention sweeps
//! - REST API + Prometheus metrics
//!
//! # Usage
//!
//! ```text
//! scribed serve --config scribe.toml --port 8080 --data-dir /var/lib/scribe
//! scribed config --config scribe.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scribe_autoscale::{AutoScaler, ScalingPolicy, SysinfoTelemetry};
use scribe_core::ScribeConfig;
use scribe_core::config::BackendKind;
use scribe_scheduler::{RetentionTask, Scheduler};
use scribe_state::StatusStore;

const DEFAULT_CONFIG: &str = "scribe.toml";
const DEFAULT_FILTER: &str = "info,scribed=debug,scribe=debug";

#[derive(Parser)]
#[command(name = "scribed", about = "scribe transcription daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler, autoscaler and API server.
    Serve {
        /// Config file (defaults to ./scribe.toml when present).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the status store.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Inference backend (faster-whisper | insanely-fast-whisper).
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
struct Overrides {
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    backend: Option<BackendKind>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
            backend,
            log_json,
        } => {
            init_tracing(log_json);
            let overrides = Overrides {
                port,
                data_dir,
                backend,
            };
            let config = resolve_config(config.as_deref(), &overrides)?;
            run_serve(config).await
        }
        Command::Config { config } => {
            let config = resolve_config(config.as_deref(), &Overrides::default())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load the config file (explicit path, else `./scribe.toml`, else
/// defaults) and apply command-line overrides.
fn resolve_config(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<ScribeConfig> {
    let mut config = match path {
        Some(path) => ScribeConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            ScribeConfig::from_file(Path::new(DEFAULT_CONFIG))?
        }
        None => ScribeConfig::default(),
    };

    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(dir) = &overrides.data_dir {
        config.server.data_dir = dir.clone();
    }
    if let Some(kind) = overrides.backend {
        config.backend.kind = kind;
    }
    config.validate()?;
    Ok(config)
}

async fn run_serve(config: ScribeConfig) -> anyhow::Result<()> {
    info!(backend = %config.backend.kind, "scribe daemon starting");

    // Ensure data directory exists.
    let data_dir = &config.server.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db_path = data_dir.join("status.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // Status store.
    let store = StatusStore::open(&db_path)?;
    info!(path = ?db_path, records = store.len()?, "status store opened");

    // Inference backend.
    let executor = scribe_executor::build_executor(&config.backend);

    // Autoscaler.
    let autoscaler = Arc::new(AutoScaler::new(
        Arc::new(SysinfoTelemetry::default()),
        ScalingPolicy::from(&config.autoscale),
        config.autoscale.cache_ttl(),
    ));
    let initial_workers = autoscaler.optimal_worker_count(true).await;
    info!(workers = initial_workers, "initial pool size");

    // Scheduler.
    let (scheduler, scheduler_task) =
        Scheduler::spawn(&config.scheduler, executor, store, initial_workers);
    info!("scheduler initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    // Autoscaler loop.
    let autoscale_handle = if config.autoscale.enabled {
        let scale_target = scheduler.clone();
        let loop_scaler = Arc::clone(&autoscaler);
        let interval = config.autoscale.interval();
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            loop_scaler
                .run(
                    interval,
                    Box::new(move |target: u32| -> anyhow::Result<()> {
                        scale_target.scale_to(target)?;
                        Ok(())
                    }),
                    shutdown,
                )
                .await;
        }))
    } else {
        info!(workers = initial_workers, "autoscaling disabled, pool size fixed");
        None
    };

    // Retention loop.
    let retention = RetentionTask::new(
        scheduler.clone(),
        config.retention.max_age(),
        config.retention.memory_ttl(),
    );
    let retention_handle = tokio::spawn(retention.run(config.retention.interval(), shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = scribe_api::build_router(scheduler.clone(), autoscaler);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C, shutting down");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    if let Some(handle) = autoscale_handle {
        let _ = handle.await;
    }
    let _ = retention_handle.await;

    if let Err(e) = scheduler.shutdown().await {
        warn!(error = %e, "scheduler already stopped");
    }
    let _ = scheduler_task.await;

    info!("scribe daemon stopped");
    Ok(())
}
